//! Background tasks: per-room deadline enforcement and the inactive-room
//! sweeper.

use crate::state::AppState;
use crate::types::RoundPhase;
use crate::ws::handlers;
use chrono::Utc;
use std::sync::Arc;

/// Spawn a task that ticks over every room and fires whichever deadline has
/// passed: answer/countdown deadlines close the round, the voting deadline
/// finalizes it. Clients that beat the timer make these calls first; phase
/// gating keeps the late firing harmless.
pub fn spawn_deadline_watcher(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.deadline_tick);
        loop {
            interval.tick().await;
            let now = Utc::now();

            for (code, room) in state.all_rooms() {
                let due = {
                    let room = room.read().await;
                    match &room.current_game {
                        Some(game) => match game.phase {
                            RoundPhase::Answering => game
                                .answer_deadline
                                .is_some_and(|d| d <= now)
                                .then_some(Due::RoundEnd),
                            RoundPhase::Countdown => game
                                .countdown_end_time
                                .is_some_and(|d| d <= now)
                                .then_some(Due::RoundEnd),
                            RoundPhase::Voting => game
                                .voting_deadline
                                .is_some_and(|d| d <= now)
                                .then_some(Due::Finalize),
                            _ => None,
                        },
                        None => None,
                    }
                };

                match due {
                    Some(Due::RoundEnd) => {
                        if let Err(e) = handlers::end_round_and_notify(&state, &code).await {
                            tracing::debug!(code = %code, error = %e, "deadline round end skipped");
                        }
                    }
                    Some(Due::Finalize) => {
                        if let Err(e) = handlers::finalize_and_notify(&state, &code).await {
                            tracing::debug!(code = %code, error = %e, "deadline finalize skipped");
                        }
                    }
                    None => {}
                }
            }
        }
    });
}

enum Due {
    RoundEnd,
    Finalize,
}

/// Spawn the sweeper that evicts rooms nobody is using: empty past the
/// empty-room threshold, or untouched past the stale threshold.
pub fn spawn_room_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.sweep_interval);
        loop {
            interval.tick().await;
            let swept = state
                .sweep_inactive(
                    state.config.empty_room_threshold,
                    state.config.stale_room_threshold,
                )
                .await;
            if swept > 0 {
                tracing::info!(swept, remaining = state.room_count(), "swept inactive rooms");
            }
        }
    });
}
