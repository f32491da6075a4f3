//! End-of-round voting: duplicate grouping, vote upsert, consensus
//! resolution, and the three-tier scoring scheme.

use super::AppState;
use crate::error::GameError;
use crate::types::*;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Points for a valid answer nobody else gave, when other valid answers
/// exist in the category
const POINTS_UNIQUE: i32 = 10;
/// Points when the answer is the only valid one in its category this round
const POINTS_SOLE: i32 = 15;
/// Points for a valid answer shared with other players
const POINTS_DUPLICATE: i32 = 5;

/// Trim surrounding whitespace; empty stays empty
pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_string()
}

/// Key used to fold differently-spelled answers into one voting group:
/// case-insensitive, diacritic-insensitive, whitespace-collapsed.
/// `Żółw`, `zolw` and ` ŻÓŁW ` all map to `zolw`.
pub fn normalize_for_duplicate_check(answer: &str) -> String {
    let folded: String = answer
        .trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            // letters with no canonical decomposition
            'ł' => 'l',
            'ø' => 'o',
            'đ' => 'd',
            _ => c,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn short_group_id() -> AnswerGroupId {
    ulid::Ulid::new().to_string()[18..].to_lowercase()
}

/// What `finalize_voting_and_calculate_scores` hands back for fan-out
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub answers: Vec<AnswerForVoting>,
    /// Nickname -> (round score, total score)
    pub scores: HashMap<String, (i32, i32)>,
    pub is_final_round: bool,
}

impl AppState {
    /// Close the answering phase and derive the voting groups.
    ///
    /// Players without a stored submission get an empty auto-submitted one
    /// first, so the round never waits on a vanished client. Calling this
    /// again while voting is already open returns the existing groups
    /// unchanged, which makes a late timer firing harmless.
    pub async fn end_round_and_prepare_voting(
        &self,
        code: &str,
    ) -> Result<(Vec<AnswerForVoting>, Option<DateTime<Utc>>), GameError> {
        let arc = self.room(code).ok_or(GameError::GameNotActive)?;
        let mut room = arc.write().await;

        let player_order: Vec<(ConnectionId, SessionId, String)> = room
            .players
            .iter()
            .map(|p| (p.connection_id.clone(), p.session_id.clone(), p.nickname.clone()))
            .collect();
        let voting_seconds = room.settings.voting_time_seconds;

        let game = room.current_game.as_mut().ok_or(GameError::GameNotActive)?;
        match game.phase {
            RoundPhase::Voting => {
                return Ok((game.answers_for_voting.clone(), game.voting_deadline));
            }
            RoundPhase::Answering | RoundPhase::Countdown => {}
            _ => return Err(GameError::WrongPhase),
        }

        let now = Utc::now();
        for (connection_id, _, _) in &player_order {
            game.round_answers
                .entry(connection_id.clone())
                .or_insert_with(|| PlayerAnswers {
                    connection_id: connection_id.clone(),
                    answers: HashMap::new(),
                    submitted_at: now,
                    auto_submitted: true,
                });
        }

        // Deterministic contributor order: players by join order first, then
        // answers left behind by departed connections (by submission time)
        let mut contributors: Vec<(&PlayerAnswers, SessionId, String)> = Vec::new();
        for (connection_id, session_id, nickname) in &player_order {
            if let Some(answers) = game.round_answers.get(connection_id) {
                contributors.push((answers, session_id.clone(), nickname.clone()));
            }
        }
        let mut orphans: Vec<&PlayerAnswers> = game
            .round_answers
            .values()
            .filter(|a| !player_order.iter().any(|(c, _, _)| c == &a.connection_id))
            .collect();
        orphans.sort_by_key(|a| a.submitted_at);
        contributors.extend(orphans.into_iter().map(|a| (a, String::new(), String::new())));

        let mut groups: Vec<AnswerForVoting> = Vec::new();
        for category in &game.categories {
            let mut by_key: HashMap<String, usize> = HashMap::new();

            for (answers, session_id, nickname) in &contributors {
                let Some(answer) = answers.answers.get(&category.name) else {
                    continue;
                };
                if answer.is_empty() {
                    continue;
                }

                let key = normalize_for_duplicate_check(answer);
                if let Some(&idx) = by_key.get(&key) {
                    let group = &mut groups[idx];
                    group.submitted_by.push(answers.connection_id.clone());
                    group.submitter_sessions.push(session_id.clone());
                    group.submitter_nicknames.push(nickname.clone());
                    if !group.variants.contains(answer) {
                        group.variants.push(answer.clone());
                    }
                } else {
                    by_key.insert(key, groups.len());
                    groups.push(AnswerForVoting {
                        id: short_group_id(),
                        category: category.name.clone(),
                        answer: answer.clone(),
                        submitted_by: vec![answers.connection_id.clone()],
                        submitter_sessions: vec![session_id.clone()],
                        submitter_nicknames: vec![nickname.clone()],
                        votes_valid: Vec::new(),
                        votes_invalid: Vec::new(),
                        status: AnswerStatus::Pending,
                        is_auto_detected_duplicate: false,
                        variants: vec![answer.clone()],
                    });
                }
            }
        }
        for group in &mut groups {
            group.is_auto_detected_duplicate = group.variants.len() > 1;
        }

        game.answers_for_voting = groups.clone();
        game.votes_submitted_by.clear();
        game.phase = RoundPhase::Voting;
        let deadline = now + ChronoDuration::seconds(voting_seconds as i64);
        game.voting_deadline = Some(deadline);
        room.last_activity_at = now;

        tracing::info!(code, groups = groups.len(), "round ended, voting open");
        Ok((groups, Some(deadline)))
    }

    /// Cast or change a vote on one answer group. A voter holds at most one
    /// vote per group: any prior vote is purged before the new one lands.
    /// Returns the updated (valid, invalid) tallies.
    pub async fn vote_answer(
        &self,
        code: &str,
        connection_id: &str,
        answer_id: &str,
        is_valid: bool,
    ) -> Result<(usize, usize), GameError> {
        let arc = self.room(code).ok_or(GameError::GameNotActive)?;
        let mut room = arc.write().await;

        let game = room.current_game.as_mut().ok_or(GameError::GameNotActive)?;
        if game.phase != RoundPhase::Voting {
            return Err(GameError::WrongPhase);
        }

        let answer = game
            .answers_for_voting
            .iter_mut()
            .find(|a| a.id == answer_id)
            .ok_or(GameError::AnswerNotFound)?;

        answer.votes_valid.retain(|v| v != connection_id);
        answer.votes_invalid.retain(|v| v != connection_id);
        if is_valid {
            answer.votes_valid.push(connection_id.to_string());
        } else {
            answer.votes_invalid.push(connection_id.to_string());
        }

        let tallies = (answer.votes_valid.len(), answer.votes_invalid.len());
        room.last_activity_at = Utc::now();
        Ok(tallies)
    }

    /// Mark a player's ballot as turned in; returns how many have done so
    pub async fn submit_votes(
        &self,
        code: &str,
        connection_id: &str,
    ) -> Result<usize, GameError> {
        let arc = self.room(code).ok_or(GameError::GameNotActive)?;
        let mut room = arc.write().await;

        let game = room.current_game.as_mut().ok_or(GameError::GameNotActive)?;
        if game.phase != RoundPhase::Voting {
            return Err(GameError::WrongPhase);
        }

        game.votes_submitted_by.insert(connection_id.to_string());
        let count = game.votes_submitted_by.len();
        room.last_activity_at = Utc::now();
        Ok(count)
    }

    /// True when every current player has turned in their ballot
    pub async fn all_votes_submitted(&self, code: &str) -> bool {
        let Some(arc) = self.room(code) else {
            return false;
        };
        let room = arc.read().await;
        match &room.current_game {
            Some(game) if game.phase == RoundPhase::Voting => room
                .players
                .iter()
                .all(|p| game.votes_submitted_by.contains(&p.connection_id)),
            _ => false,
        }
    }

    /// Resolve every answer by majority vote and award points.
    ///
    /// A nonzero tie is contested. Zero votes defaults to valid.
    /// A shared valid answer is worth 5 to each contributor. An unshared
    /// one is worth 10, or 15 when it is the only valid answer in its
    /// category this round. Contributors are matched by stable session id
    /// with nickname as fallback, since their connection may have been
    /// rebound since submission.
    ///
    /// The phase check guards re-entry: a second call without an
    /// intervening round start cannot double-award.
    pub async fn finalize_voting_and_calculate_scores(
        &self,
        code: &str,
    ) -> Result<FinalizeOutcome, GameError> {
        let arc = self.room(code).ok_or(GameError::GameNotActive)?;
        let mut room = arc.write().await;

        let game = room.current_game.as_mut().ok_or(GameError::GameNotActive)?;
        if game.phase != RoundPhase::Voting {
            return Err(GameError::WrongPhase);
        }

        for answer in &mut game.answers_for_voting {
            let valid = answer.votes_valid.len();
            let invalid = answer.votes_invalid.len();
            answer.status = if valid == 0 && invalid == 0 {
                AnswerStatus::Valid
            } else if valid > invalid {
                AnswerStatus::Valid
            } else if invalid > valid {
                AnswerStatus::Invalid
            } else {
                AnswerStatus::Contested
            };
        }

        let mut valid_groups_per_category: HashMap<&str, usize> = HashMap::new();
        for answer in &game.answers_for_voting {
            if answer.status == AnswerStatus::Valid {
                *valid_groups_per_category
                    .entry(answer.category.as_str())
                    .or_insert(0) += 1;
            }
        }

        // (session id, nickname, points) per contributor of a valid answer
        let mut awards: Vec<(SessionId, String, i32)> = Vec::new();
        for answer in &game.answers_for_voting {
            if answer.status != AnswerStatus::Valid {
                continue;
            }
            let points = if answer.is_duplicate() {
                POINTS_DUPLICATE
            } else if valid_groups_per_category[answer.category.as_str()] == 1 {
                POINTS_SOLE
            } else {
                POINTS_UNIQUE
            };
            for (i, session_id) in answer.submitter_sessions.iter().enumerate() {
                let nickname = answer
                    .submitter_nicknames
                    .get(i)
                    .cloned()
                    .unwrap_or_default();
                awards.push((session_id.clone(), nickname, points));
            }
        }

        game.phase = RoundPhase::Results;
        game.voting_deadline = None;
        let is_final_round = game.current_round >= game.total_rounds;
        let answers = game.answers_for_voting.clone();

        for (session_id, nickname, points) in awards {
            let idx = room
                .players
                .iter()
                .position(|p| !session_id.is_empty() && p.session_id == session_id)
                .or_else(|| {
                    room.players
                        .iter()
                        .position(|p| !nickname.is_empty() && p.nickname.eq_ignore_ascii_case(&nickname))
                });
            if let Some(idx) = idx {
                room.players[idx].round_score += points;
                room.players[idx].total_score += points;
            }
        }

        // After the last round the scoreboard is final; everyone except the
        // host must ready up again for a rematch
        if is_final_round {
            for player in &mut room.players {
                player.is_ready = player.is_host;
            }
        }

        let scores = room
            .players
            .iter()
            .map(|p| (p.nickname.clone(), (p.round_score, p.total_score)))
            .collect();
        room.last_activity_at = Utc::now();

        tracing::info!(code, is_final_round, "voting finalized, scores updated");
        Ok(FinalizeOutcome {
            answers,
            scores,
            is_final_round,
        })
    }
}
