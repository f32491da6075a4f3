//! Round lifecycle: starting games and rounds, the STOP race, answer
//! submission, and round advancement.

use super::AppState;
use crate::error::GameError;
use crate::types::*;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::collections::HashMap;

/// Largest countdown extension a single `add_time` call may request
const MAX_TIME_EXTENSION_SECS: u64 = 60;

fn pick_letter(used: &mut Vec<char>) -> char {
    let available: Vec<char> = ROUND_LETTERS
        .iter()
        .copied()
        .filter(|l| !used.contains(l))
        .collect();

    // Drawn without replacement; once the pool is exhausted it resets so
    // the game never stalls
    let pool = if available.is_empty() {
        used.clear();
        ROUND_LETTERS.to_vec()
    } else {
        available
    };

    let mut rng = rand::rng();
    pool[rng.random_range(0..pool.len())]
}

pub(crate) fn normalize_submitted(answers: &HashMap<String, String>) -> HashMap<String, String> {
    answers
        .iter()
        .map(|(category, answer)| (category.clone(), super::normalize_answer(answer)))
        .collect()
}

impl AppState {
    /// Start a game: snapshot settings into a fresh `GameState` at the
    /// waiting phase. Scores and violations from any previous game in this
    /// room are wiped first; round 1 is started by a separate call so the
    /// caller can sequence its notifications.
    pub async fn start_game(&self, host_connection_id: &str) -> Result<RoomCode, GameError> {
        let arc = self
            .room_by_connection(host_connection_id)
            .ok_or(GameError::NotInRoom)?;
        let mut room = arc.write().await;

        if !room.is_host(host_connection_id) {
            return Err(GameError::NotHost);
        }
        if room.players.len() < 2 {
            return Err(GameError::TooFewPlayers);
        }
        if !room.players.iter().all(|p| p.is_ready) {
            return Err(GameError::NotAllReady);
        }

        for player in &mut room.players {
            player.total_score = 0;
            player.round_score = 0;
            player.violations.clear();
        }

        room.current_game = Some(GameState::new(
            room.settings.round_count,
            room.settings.selected_categories.clone(),
        ));
        room.last_activity_at = Utc::now();

        tracing::info!(code = %room.code, rounds = room.settings.round_count, "game started");
        Ok(room.code.clone())
    }

    /// Discard the game and return the room to lobby state. Ready flags are
    /// deliberately left alone so still-ready players can start the next
    /// game without re-readying.
    pub async fn reset_game_for_lobby(&self, code: &str) -> Result<(), GameError> {
        let arc = self.room(code).ok_or(GameError::RoomNotFound)?;
        let mut room = arc.write().await;

        room.current_game = None;
        for player in &mut room.players {
            player.total_score = 0;
            player.round_score = 0;
            player.violations.clear();
        }
        room.last_activity_at = Utc::now();
        Ok(())
    }

    /// Begin the answering phase of the current round with a freshly drawn
    /// letter. Returns the letter, the round number, and the advisory
    /// answer deadline.
    pub async fn start_round(
        &self,
        code: &str,
    ) -> Result<(char, u32, DateTime<Utc>), GameError> {
        let arc = self.room(code).ok_or(GameError::RoomNotFound)?;
        let mut room = arc.write().await;
        let round_time = room.settings.round_time_seconds;

        for player in &mut room.players {
            player.round_score = 0;
        }

        let game = room.current_game.as_mut().ok_or(GameError::GameNotActive)?;
        if game.current_round > game.total_rounds {
            return Err(GameError::GameOver);
        }

        let letter = pick_letter(&mut game.used_letters);
        game.used_letters.push(letter);
        game.current_letter = Some(letter);
        game.phase = RoundPhase::Answering;
        game.stop_triggered_by = None;
        game.countdown_end_time = None;
        game.voting_deadline = None;
        game.round_answers.clear();
        game.answers_for_voting.clear();
        let deadline = Utc::now() + ChronoDuration::seconds(round_time as i64);
        game.answer_deadline = Some(deadline);

        let round = game.current_round;
        room.last_activity_at = Utc::now();

        tracing::info!(code = %room.code, letter = %letter, round, "round started");
        Ok((letter, round, deadline))
    }

    /// Press STOP. Exactly one press per round wins: the check-and-set runs
    /// under the room's write lock, so a racing press observes either the
    /// pre-commit state or the winner's commit, never in between.
    pub async fn trigger_stop(
        &self,
        code: &str,
        connection_id: &str,
    ) -> Result<DateTime<Utc>, GameError> {
        let arc = self.room(code).ok_or(GameError::GameNotActive)?;
        let mut room = arc.write().await;
        let countdown = room.settings.countdown_seconds;

        let game = room.current_game.as_mut().ok_or(GameError::GameNotActive)?;
        // a racing winner flips the phase in the same commit, so the stop
        // marker must be checked first or losers see the wrong error
        if game.stop_triggered_by.is_some() {
            return Err(GameError::StopAlreadyTriggered);
        }
        if game.phase != RoundPhase::Answering {
            return Err(GameError::WrongPhase);
        }

        game.stop_triggered_by = Some(connection_id.to_string());
        game.phase = RoundPhase::Countdown;
        let end_time = Utc::now() + ChronoDuration::seconds(countdown as i64);
        game.countdown_end_time = Some(end_time);
        room.last_activity_at = Utc::now();

        tracing::info!(code = %room.code, by = connection_id, "STOP triggered");
        Ok(end_time)
    }

    /// Extend the countdown. Only the player who pressed STOP may do this;
    /// the extension is additive to the existing deadline.
    pub async fn add_time(
        &self,
        code: &str,
        connection_id: &str,
        seconds: u64,
    ) -> Result<DateTime<Utc>, GameError> {
        // client-supplied; an unchecked value this large would overflow the
        // duration math
        if seconds == 0 || seconds > MAX_TIME_EXTENSION_SECS {
            return Err(GameError::InvalidTimeExtension);
        }
        let arc = self.room(code).ok_or(GameError::GameNotActive)?;
        let mut room = arc.write().await;

        let game = room.current_game.as_mut().ok_or(GameError::GameNotActive)?;
        if game.phase != RoundPhase::Countdown {
            return Err(GameError::WrongPhase);
        }
        if game.stop_triggered_by.as_deref() != Some(connection_id) {
            return Err(GameError::NotStopTrigger);
        }

        let current = game.countdown_end_time.ok_or(GameError::WrongPhase)?;
        let new_end = current + ChronoDuration::seconds(seconds as i64);
        game.countdown_end_time = Some(new_end);
        room.last_activity_at = Utc::now();
        Ok(new_end)
    }

    /// Store (or overwrite) a player's answers for the round. Idempotent,
    /// last write wins. Accepted during answering and during the countdown
    /// grace window, including from players whose STOP press lost the race.
    pub async fn submit_answers(
        &self,
        code: &str,
        connection_id: &str,
        answers: &HashMap<String, String>,
        auto_submitted: bool,
    ) -> Result<(), GameError> {
        let arc = self.room(code).ok_or(GameError::GameNotActive)?;
        let mut room = arc.write().await;

        let game = room.current_game.as_mut().ok_or(GameError::GameNotActive)?;
        if !matches!(game.phase, RoundPhase::Answering | RoundPhase::Countdown) {
            return Err(GameError::WrongPhase);
        }

        game.round_answers.insert(
            connection_id.to_string(),
            PlayerAnswers {
                connection_id: connection_id.to_string(),
                answers: normalize_submitted(answers),
                submitted_at: Utc::now(),
                auto_submitted,
            },
        );
        room.last_activity_at = Utc::now();
        Ok(())
    }

    /// True when every current player has answers stored for this round
    pub async fn all_players_submitted(&self, code: &str) -> bool {
        let Some(arc) = self.room(code) else {
            return false;
        };
        let room = arc.read().await;
        match &room.current_game {
            Some(game)
                if matches!(game.phase, RoundPhase::Answering | RoundPhase::Countdown) =>
            {
                room.players
                    .iter()
                    .all(|p| game.round_answers.contains_key(&p.connection_id))
            }
            _ => false,
        }
    }

    /// Advance the round counter. Returns `false` once the game is over
    /// (phase returns to waiting either way).
    pub async fn next_round_or_end_game(&self, code: &str) -> Result<bool, GameError> {
        let arc = self.room(code).ok_or(GameError::RoomNotFound)?;
        let mut room = arc.write().await;

        let game = room.current_game.as_mut().ok_or(GameError::GameNotActive)?;
        // only from the results screen; a retried click mid-round must not
        // abandon the round in flight
        if game.phase != RoundPhase::Results {
            return Err(GameError::WrongPhase);
        }
        game.current_round += 1;
        game.phase = RoundPhase::Waiting;
        let has_next = game.current_round <= game.total_rounds;
        room.last_activity_at = Utc::now();
        Ok(has_next)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::tests::test_state;
    use super::*;
    use crate::state::AppState;
    use std::sync::Arc;

    pub(crate) async fn two_player_room(state: &Arc<AppState>) -> RoomCode {
        let room = state.create_room("c1", "Ala", "s1").await;
        state.join_room(&room.code, "c2", "Ola", "s2").await.unwrap();
        state.set_ready("c2", true).await.unwrap();
        room.code
    }

    #[tokio::test]
    async fn test_start_game_preconditions() {
        let state = test_state();
        let room = state.create_room("c1", "Ala", "s1").await;

        assert_eq!(
            state.start_game("c1").await.unwrap_err(),
            GameError::TooFewPlayers
        );

        state.join_room(&room.code, "c2", "Ola", "s2").await.unwrap();
        assert_eq!(
            state.start_game("c1").await.unwrap_err(),
            GameError::NotAllReady
        );
        assert_eq!(state.start_game("c2").await.unwrap_err(), GameError::NotHost);

        state.set_ready("c2", true).await.unwrap();
        state.start_game("c1").await.unwrap();

        let arc = state.room(&room.code).unwrap();
        let room = arc.read().await;
        let game = room.current_game.as_ref().unwrap();
        assert_eq!(game.phase, RoundPhase::Waiting);
        assert_eq!(game.total_rounds, room.settings.round_count);
        assert_eq!(game.categories, room.settings.selected_categories);
    }

    #[tokio::test]
    async fn test_settings_snapshot_is_immune_to_later_edits() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state
            .update_settings(&code, "c1", &["Countries".into()], 3)
            .await
            .unwrap();
        state.start_game("c1").await.unwrap();

        // mid-game settings edit must not retroactively change the game
        state
            .update_settings(&code, "c1", &["Movies".into(), "Food".into()], 20)
            .await
            .unwrap();

        let arc = state.room(&code).unwrap();
        let room = arc.read().await;
        let game = room.current_game.as_ref().unwrap();
        assert_eq!(game.total_rounds, 3);
        assert_eq!(game.categories.len(), 1);
        assert_eq!(game.categories[0].name, "Countries");
    }

    #[tokio::test]
    async fn test_letters_unique_until_pool_resets() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state
            .update_settings(&code, "c1", &["Countries".into()], 20)
            .await
            .unwrap();
        state.start_game("c1").await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..ROUND_LETTERS.len() {
            let (letter, _, _) = state.start_round(&code).await.unwrap();
            assert!(!seen.contains(&letter), "letter {letter} repeated early");
            seen.push(letter);
        }

        // pool exhausted; next draw must still succeed
        let (letter, _, _) = state.start_round(&code).await.unwrap();
        assert!(ROUND_LETTERS.contains(&letter));
    }

    #[tokio::test]
    async fn test_trigger_stop_race_has_one_winner() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state.start_game("c1").await.unwrap();
        state.start_round(&code).await.unwrap();

        let mut handles = Vec::new();
        for i in 1..=8 {
            let state = state.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                state.trigger_stop(&code, &format!("c{i}")).await
            }));
        }

        let mut wins = 0;
        let mut losses = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(GameError::StopAlreadyTriggered) => losses += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(losses, 7);

        // losers can still submit answers during the countdown
        let answers = HashMap::from([("Countries".to_string(), "France".to_string())]);
        state.submit_answers(&code, "c1", &answers, false).await.unwrap();
        state.submit_answers(&code, "c2", &answers, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_stop_press_gets_already_triggered() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state.start_game("c1").await.unwrap();
        state.start_round(&code).await.unwrap();

        state.trigger_stop(&code, "c1").await.unwrap();

        // the loser must see the stop marker, not the phase flip
        assert_eq!(
            state.trigger_stop(&code, "c2").await.unwrap_err(),
            GameError::StopAlreadyTriggered
        );

        // and their fallback submission still lands
        let answers = HashMap::from([("Countries".to_string(), "France".to_string())]);
        state.submit_answers(&code, "c2", &answers, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_stop_wrong_phase() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state.start_game("c1").await.unwrap();

        assert_eq!(
            state.trigger_stop(&code, "c1").await.unwrap_err(),
            GameError::WrongPhase
        );
    }

    #[tokio::test]
    async fn test_add_time_only_for_stop_trigger() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state.start_game("c1").await.unwrap();
        state.start_round(&code).await.unwrap();

        let end = state.trigger_stop(&code, "c1").await.unwrap();

        assert_eq!(
            state.add_time(&code, "c2", 15).await.unwrap_err(),
            GameError::NotStopTrigger
        );

        let extended = state.add_time(&code, "c1", 15).await.unwrap();
        assert_eq!(extended, end + ChronoDuration::seconds(15));
    }

    #[tokio::test]
    async fn test_add_time_rejects_out_of_policy_values() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state.start_game("c1").await.unwrap();
        state.start_round(&code).await.unwrap();
        let end = state.trigger_stop(&code, "c1").await.unwrap();

        for seconds in [0, MAX_TIME_EXTENSION_SECS + 1, u64::MAX / 2, u64::MAX] {
            assert_eq!(
                state.add_time(&code, "c1", seconds).await.unwrap_err(),
                GameError::InvalidTimeExtension
            );
        }

        // rejected requests leave the deadline untouched
        let arc = state.room(&code).unwrap();
        let room = arc.read().await;
        let game = room.current_game.as_ref().unwrap();
        assert_eq!(game.countdown_end_time, Some(end));
    }

    #[tokio::test]
    async fn test_submit_answers_normalizes_and_overwrites() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state.start_game("c1").await.unwrap();
        state.start_round(&code).await.unwrap();

        let first = HashMap::from([("Countries".to_string(), "  France  ".to_string())]);
        state.submit_answers(&code, "c1", &first, false).await.unwrap();

        let second = HashMap::from([("Countries".to_string(), "Finland".to_string())]);
        state.submit_answers(&code, "c1", &second, false).await.unwrap();

        let arc = state.room(&code).unwrap();
        let room = arc.read().await;
        let game = room.current_game.as_ref().unwrap();
        assert_eq!(game.round_answers.len(), 1);
        assert_eq!(game.round_answers["c1"].answers["Countries"], "Finland");
    }

    async fn play_round_to_results(state: &Arc<AppState>, code: &str) {
        let answers = HashMap::from([("Countries".to_string(), "France".to_string())]);
        state.submit_answers(code, "c1", &answers, false).await.unwrap();
        state.submit_answers(code, "c2", &answers, false).await.unwrap();
        state.end_round_and_prepare_voting(code).await.unwrap();
        state
            .finalize_voting_and_calculate_scores(code)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_next_round_or_end_game() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state
            .update_settings(&code, "c1", &["Countries".into()], 2)
            .await
            .unwrap();
        state.start_game("c1").await.unwrap();

        state.start_round(&code).await.unwrap();
        play_round_to_results(&state, &code).await;
        assert!(state.next_round_or_end_game(&code).await.unwrap());

        state.start_round(&code).await.unwrap();
        play_round_to_results(&state, &code).await;
        assert!(!state.next_round_or_end_game(&code).await.unwrap());

        // game over: a further round cannot start
        assert_eq!(
            state.start_round(&code).await.unwrap_err(),
            GameError::GameOver
        );
    }

    #[tokio::test]
    async fn test_next_round_only_from_results() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state.start_game("c1").await.unwrap();
        state.start_round(&code).await.unwrap();

        // mid-round retry must not abandon the round
        assert_eq!(
            state.next_round_or_end_game(&code).await.unwrap_err(),
            GameError::WrongPhase
        );

        state.trigger_stop(&code, "c1").await.unwrap();
        assert_eq!(
            state.next_round_or_end_game(&code).await.unwrap_err(),
            GameError::WrongPhase
        );
        state.end_round_and_prepare_voting(&code).await.unwrap();
        assert_eq!(
            state.next_round_or_end_game(&code).await.unwrap_err(),
            GameError::WrongPhase
        );

        state
            .finalize_voting_and_calculate_scores(&code)
            .await
            .unwrap();
        assert!(state.next_round_or_end_game(&code).await.unwrap());

        let arc = state.room(&code).unwrap();
        let room = arc.read().await;
        assert_eq!(room.current_game.as_ref().unwrap().current_round, 2);
    }

    #[tokio::test]
    async fn test_reset_game_for_lobby_keeps_ready_flags() {
        let state = test_state();
        let code = two_player_room(&state).await;
        state.start_game("c1").await.unwrap();
        state.start_round(&code).await.unwrap();

        {
            let arc = state.room(&code).unwrap();
            let mut room = arc.write().await;
            room.player_mut("c2").unwrap().total_score = 40;
        }

        state.reset_game_for_lobby(&code).await.unwrap();

        let arc = state.room(&code).unwrap();
        let room = arc.read().await;
        assert!(room.current_game.is_none());
        let p2 = room.player("c2").unwrap();
        assert_eq!(p2.total_score, 0);
        assert!(p2.is_ready);
    }
}
