//! Focus-loss reporting and the progressive penalty ladder.

use super::AppState;
use crate::error::GameError;
use crate::types::{Violation, ViolationType};
use chrono::Utc;

/// Lookaways shorter than this are forgiven outright
const GRACE_SECONDS: f64 = 2.0;

/// Penalty for the next violation given the offender's record this game.
/// First offense is a warning; repeats cost 10, then 20, then 30 per.
fn calculate_penalty(prior: &[Violation], duration_seconds: f64) -> i32 {
    if duration_seconds < GRACE_SECONDS {
        return 0;
    }
    match prior.len() {
        0 => 0,
        1 => 10,
        2 => 20,
        _ => 30,
    }
}

impl AppState {
    /// Record a client-reported violation and apply its penalty to the
    /// offender's total score. Returns the points deducted (0 for a
    /// warning or a sub-grace blip).
    pub async fn report_violation(
        &self,
        code: &str,
        connection_id: &str,
        violation_type: ViolationType,
        duration_seconds: f64,
    ) -> Result<i32, GameError> {
        let arc = self.room(code).ok_or(GameError::RoomNotFound)?;
        let mut room = arc.write().await;

        let round_number = room
            .current_game
            .as_ref()
            .map(|g| g.current_round)
            .ok_or(GameError::GameNotActive)?;

        let idx = room
            .players
            .iter()
            .position(|p| p.connection_id == connection_id)
            .ok_or(GameError::PlayerNotFound)?;

        let player = &mut room.players[idx];
        let penalty = calculate_penalty(&player.violations, duration_seconds);
        player.violations.push(Violation {
            kind: violation_type,
            duration_seconds,
            round_number,
            occurred_at: Utc::now(),
            penalty,
        });
        player.total_score -= penalty;

        tracing::debug!(
            code,
            connection_id,
            ?violation_type,
            duration_seconds,
            penalty,
            "violation recorded"
        );
        room.last_activity_at = Utc::now();
        Ok(penalty)
    }
}

#[cfg(test)]
mod tests {
    use super::super::game::tests::two_player_room;
    use super::super::tests::test_state;
    use super::*;

    #[tokio::test]
    async fn test_penalty_ladder_escalates() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state.start_game("c1").await.unwrap();

        let p = |s| state.report_violation(&code, "c2", ViolationType::TabSwitch, s);
        assert_eq!(p(5.0).await.unwrap(), 0);
        assert_eq!(p(5.0).await.unwrap(), 10);
        assert_eq!(p(5.0).await.unwrap(), 20);
        assert_eq!(p(5.0).await.unwrap(), 30);
        assert_eq!(p(5.0).await.unwrap(), 30);

        let arc = state.room(&code).unwrap();
        let room = arc.read().await;
        let player = room.player("c2").unwrap();
        assert_eq!(player.total_score, -90);
        assert_eq!(player.violations.len(), 5);
    }

    #[tokio::test]
    async fn test_short_blips_are_forgiven_but_still_recorded() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state.start_game("c1").await.unwrap();

        let first = state
            .report_violation(&code, "c2", ViolationType::FocusLost, 1.2)
            .await
            .unwrap();
        assert_eq!(first, 0);

        // a blip still counts toward the ladder
        let second = state
            .report_violation(&code, "c2", ViolationType::FocusLost, 4.0)
            .await
            .unwrap();
        assert_eq!(second, 10);

        let arc = state.room(&code).unwrap();
        let room = arc.read().await;
        assert_eq!(room.player("c2").unwrap().total_score, -10);
    }

    #[tokio::test]
    async fn test_violation_outside_game_rejected() {
        let state = test_state();
        let code = two_player_room(&state).await;

        let err = state
            .report_violation(&code, "c2", ViolationType::ConnectionUnstable, 3.0)
            .await
            .unwrap_err();
        assert_eq!(err, GameError::GameNotActive);
    }
}
