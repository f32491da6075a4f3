//! WebSocket message dispatch
//!
//! Every client command lands here. Room-wide effects go out over the
//! room's broadcast channel; the returned reply (if any) goes only to the
//! caller. The socket pump applies the subscription change afterwards.

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::RoomCode;
use std::sync::Arc;

/// What the socket pump should do with its room subscription after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionChange {
    Keep,
    Join(RoomCode),
    Leave,
}

#[derive(Debug)]
pub struct CommandOutcome {
    pub reply: Option<ServerMessage>,
    pub subscription: SubscriptionChange,
}

impl CommandOutcome {
    fn none() -> Self {
        Self {
            reply: None,
            subscription: SubscriptionChange::Keep,
        }
    }

    fn reply(msg: ServerMessage) -> Self {
        Self {
            reply: Some(msg),
            subscription: SubscriptionChange::Keep,
        }
    }

    fn join(code: RoomCode, msg: ServerMessage) -> Self {
        Self {
            reply: Some(msg),
            subscription: SubscriptionChange::Join(code),
        }
    }

    fn leave() -> Self {
        Self {
            reply: None,
            subscription: SubscriptionChange::Leave,
        }
    }

    fn error(err: GameError) -> Self {
        Self::reply(ServerMessage::error(&err))
    }
}

/// Handle one client command
pub async fn handle_command(
    state: &Arc<AppState>,
    connection_id: &str,
    msg: ClientMessage,
) -> CommandOutcome {
    match msg {
        ClientMessage::CreateRoom {
            nickname,
            session_id,
        } => {
            let room = state.create_room(connection_id, &nickname, &session_id).await;
            let code = room.code.clone();
            CommandOutcome::join(
                code,
                ServerMessage::RoomJoined {
                    room,
                    connection_id: connection_id.to_string(),
                },
            )
        }

        ClientMessage::JoinRoom {
            room_code,
            nickname,
            session_id,
        } => match state
            .join_room(&room_code, connection_id, &nickname, &session_id)
            .await
        {
            Ok(room) => {
                let avatar_color = room
                    .player(connection_id)
                    .map(|p| p.avatar_color.clone())
                    .unwrap_or_default();
                state.broadcast_to_room(
                    &room.code,
                    ServerMessage::PlayerJoined {
                        nickname,
                        connection_id: connection_id.to_string(),
                        avatar_color,
                    },
                );
                let code = room.code.clone();
                CommandOutcome::join(
                    code,
                    ServerMessage::RoomJoined {
                        room,
                        connection_id: connection_id.to_string(),
                    },
                )
            }
            Err(e) => CommandOutcome::error(e),
        },

        ClientMessage::RejoinRoom {
            room_code,
            nickname,
            session_id,
        } => match state
            .rejoin_room(&room_code, connection_id, &nickname, &session_id)
            .await
        {
            Ok(room) => {
                let code = room.code.clone();
                CommandOutcome::join(
                    code,
                    ServerMessage::RoomJoined {
                        room,
                        connection_id: connection_id.to_string(),
                    },
                )
            }
            Err(e) => CommandOutcome::error(e),
        },

        ClientMessage::LeaveRoom { .. } => {
            run_leave_path(state, connection_id).await;
            CommandOutcome::leave()
        }

        ClientMessage::KickPlayer { target_id, .. } => {
            match state.kick_player(connection_id, &target_id).await {
                Ok(code) => {
                    // the kicked player's own pump sees this, tells them, and
                    // drops their subscription
                    state.broadcast_to_room(
                        &code,
                        ServerMessage::PlayerKicked {
                            connection_id: target_id,
                        },
                    );
                    CommandOutcome::none()
                }
                Err(e) => CommandOutcome::error(e),
            }
        }

        ClientMessage::SetReady { is_ready, .. } => {
            match state.set_ready(connection_id, is_ready).await {
                Ok(code) => {
                    state.broadcast_to_room(
                        &code,
                        ServerMessage::PlayerReadyChanged {
                            connection_id: connection_id.to_string(),
                            is_ready,
                        },
                    );
                    CommandOutcome::none()
                }
                Err(e) => CommandOutcome::error(e),
            }
        }

        ClientMessage::SetRoomPublic {
            room_code,
            is_public,
        } => match state.set_room_public(&room_code, connection_id, is_public).await {
            Ok(()) => {
                state.broadcast_to_room(&room_code, ServerMessage::RoomVisibilityChanged { is_public });
                CommandOutcome::none()
            }
            Err(e) => CommandOutcome::error(e),
        },

        ClientMessage::ListPublicRooms => CommandOutcome::reply(ServerMessage::PublicRooms {
            rooms: state.public_rooms().await,
        }),

        ClientMessage::UpdateSettings {
            room_code,
            category_names,
            round_count,
        } => match state
            .update_settings(&room_code, connection_id, &category_names, round_count)
            .await
        {
            Ok(()) => {
                state.broadcast_to_room(
                    &room_code,
                    ServerMessage::SettingsUpdated {
                        category_names,
                        round_count,
                    },
                );
                CommandOutcome::none()
            }
            Err(e) => CommandOutcome::error(e),
        },

        ClientMessage::StartGame { .. } => match state.start_game(connection_id).await {
            Ok(code) => {
                if let Some(arc) = state.room(&code) {
                    let room = arc.read().await;
                    if let Some(game) = &room.current_game {
                        state.broadcast_to_room(
                            &code,
                            ServerMessage::GameStarted {
                                category_names: game
                                    .categories
                                    .iter()
                                    .map(|c| c.name.clone())
                                    .collect(),
                                total_rounds: game.total_rounds,
                            },
                        );
                    }
                }
                match start_round_and_notify(state, &code).await {
                    Ok(()) => CommandOutcome::none(),
                    Err(e) => CommandOutcome::error(e),
                }
            }
            Err(e) => CommandOutcome::error(e),
        },

        ClientMessage::TriggerStop { room_code, answers } => {
            match state.trigger_stop(&room_code, connection_id).await {
                Ok(end_time) => {
                    state.broadcast_to_room(
                        &room_code,
                        ServerMessage::StopTriggered {
                            connection_id: connection_id.to_string(),
                            end_time,
                        },
                    );
                }
                // lost the race; the answers still count
                Err(GameError::StopAlreadyTriggered) => {}
                Err(e) => return CommandOutcome::error(e),
            }
            accept_answers(state, &room_code, connection_id, &answers).await
        }

        ClientMessage::AddTime { room_code, seconds } => {
            match state.add_time(&room_code, connection_id, seconds).await {
                Ok(new_end_time) => {
                    state.broadcast_to_room(&room_code, ServerMessage::TimeAdded { new_end_time });
                    CommandOutcome::none()
                }
                Err(e) => CommandOutcome::error(e),
            }
        }

        ClientMessage::SubmitAnswers { room_code, answers } => {
            accept_answers(state, &room_code, connection_id, &answers).await
        }

        ClientMessage::VoteAnswer {
            room_code,
            answer_id,
            is_valid,
        } => match state
            .vote_answer(&room_code, connection_id, &answer_id, is_valid)
            .await
        {
            Ok((valid_votes, invalid_votes)) => {
                state.broadcast_to_room(
                    &room_code,
                    ServerMessage::VoteCast {
                        answer_id,
                        valid_votes,
                        invalid_votes,
                    },
                );
                CommandOutcome::none()
            }
            Err(e) => CommandOutcome::error(e),
        },

        ClientMessage::SubmitVotes { room_code } => {
            match state.submit_votes(&room_code, connection_id).await {
                Ok(submitted_count) => {
                    state.broadcast_to_room(
                        &room_code,
                        ServerMessage::VotesSubmitted { submitted_count },
                    );
                    if state.all_votes_submitted(&room_code).await {
                        if let Err(e) = finalize_and_notify(state, &room_code).await {
                            return CommandOutcome::error(e);
                        }
                    }
                    CommandOutcome::none()
                }
                Err(e) => CommandOutcome::error(e),
            }
        }

        ClientMessage::StartNextRound { room_code } => {
            if let Some(outcome) = require_host(state, &room_code, connection_id).await {
                return outcome;
            }
            match state.next_round_or_end_game(&room_code).await {
                Ok(true) => match start_round_and_notify(state, &room_code).await {
                    Ok(()) => CommandOutcome::none(),
                    Err(e) => CommandOutcome::error(e),
                },
                Ok(false) => {
                    state.broadcast_to_room(&room_code, ServerMessage::GameEnded);
                    CommandOutcome::none()
                }
                Err(e) => CommandOutcome::error(e),
            }
        }

        ClientMessage::EndGame { room_code } => {
            if let Some(outcome) = require_host(state, &room_code, connection_id).await {
                return outcome;
            }
            // announce first: deleting the room drops its channel
            state.broadcast_to_room(&room_code, ServerMessage::GameEnded);
            match state.delete_room(&room_code).await {
                Ok(_) => CommandOutcome::leave(),
                Err(e) => CommandOutcome::error(e),
            }
        }

        ClientMessage::ReturnToLobby { room_code } => {
            if let Some(outcome) = require_host(state, &room_code, connection_id).await {
                return outcome;
            }
            match state.reset_game_for_lobby(&room_code).await {
                Ok(()) => {
                    state.broadcast_to_room(
                        &room_code,
                        ServerMessage::ReturnToLobby {
                            room_code: room_code.clone(),
                        },
                    );
                    CommandOutcome::none()
                }
                Err(e) => CommandOutcome::error(e),
            }
        }

        ClientMessage::ReportViolation {
            room_code,
            violation_type,
            duration_seconds,
        } => match state
            .report_violation(&room_code, connection_id, violation_type, duration_seconds)
            .await
        {
            Ok(penalty) => {
                state.broadcast_to_room(
                    &room_code,
                    ServerMessage::ViolationReported {
                        connection_id: connection_id.to_string(),
                        violation_type,
                        duration_seconds,
                        penalty,
                    },
                );
                CommandOutcome::none()
            }
            Err(e) => CommandOutcome::error(e),
        },

        ClientMessage::SendChat { room_code, text } => {
            match state.send_chat(&room_code, connection_id, &text).await {
                Ok(message) => {
                    state.broadcast_to_room(
                        &room_code,
                        ServerMessage::ChatMessage {
                            nickname: message.nickname,
                            text: message.text,
                            is_system: message.is_system,
                            sent_at: message.sent_at,
                        },
                    );
                    CommandOutcome::none()
                }
                Err(e) => CommandOutcome::error(e),
            }
        }
    }
}

/// Store a player's answers and close the round if everyone is in
async fn accept_answers(
    state: &Arc<AppState>,
    room_code: &str,
    connection_id: &str,
    answers: &std::collections::HashMap<String, String>,
) -> CommandOutcome {
    match state
        .submit_answers(room_code, connection_id, answers, false)
        .await
    {
        Ok(()) => {
            state.broadcast_to_room(
                room_code,
                ServerMessage::PlayerSubmitted {
                    connection_id: connection_id.to_string(),
                },
            );
            if state.all_players_submitted(room_code).await {
                if let Err(e) = end_round_and_notify(state, room_code).await {
                    return CommandOutcome::error(e);
                }
            }
            CommandOutcome::reply(ServerMessage::AnswersAccepted)
        }
        Err(e) => CommandOutcome::error(e),
    }
}

/// Returns an error outcome unless the caller hosts the room
async fn require_host(
    state: &Arc<AppState>,
    room_code: &str,
    connection_id: &str,
) -> Option<CommandOutcome> {
    let Some(arc) = state.room(room_code) else {
        return Some(CommandOutcome::error(GameError::RoomNotFound));
    };
    let room = arc.read().await;
    if room.is_host(connection_id) {
        None
    } else {
        Some(CommandOutcome::error(GameError::NotHost))
    }
}

/// Begin a round and announce the drawn letter
pub async fn start_round_and_notify(state: &Arc<AppState>, code: &str) -> Result<(), GameError> {
    let (letter, round_number, deadline) = state.start_round(code).await?;
    state.broadcast_to_room(
        code,
        ServerMessage::RoundStarted {
            letter,
            round_number,
            answer_deadline: Some(deadline),
        },
    );
    Ok(())
}

/// Close the answering phase and announce the voting groups. Shared with
/// the deadline watcher.
pub async fn end_round_and_notify(state: &Arc<AppState>, code: &str) -> Result<(), GameError> {
    let (answers, voting_deadline) = state.end_round_and_prepare_voting(code).await?;
    state.broadcast_to_room(
        code,
        ServerMessage::RoundEnded {
            answers,
            voting_deadline,
        },
    );
    Ok(())
}

/// Resolve votes, award points, and announce the results. Shared with the
/// deadline watcher.
pub async fn finalize_and_notify(state: &Arc<AppState>, code: &str) -> Result<(), GameError> {
    let outcome = state.finalize_voting_and_calculate_scores(code).await?;
    state.broadcast_to_room(
        code,
        ServerMessage::VotingEnded {
            answers: outcome.answers,
            scores: outcome.scores,
            is_final_round: outcome.is_final_round,
        },
    );
    Ok(())
}

/// Shared by the explicit leave command and socket disconnect
pub async fn run_leave_path(state: &Arc<AppState>, connection_id: &str) {
    let Some(outcome) = state.leave_room(connection_id).await else {
        return;
    };
    if outcome.was_room_deleted {
        return;
    }
    state.broadcast_to_room(
        &outcome.room_code,
        ServerMessage::PlayerLeft {
            connection_id: connection_id.to_string(),
        },
    );
    if let Some(new_host_id) = outcome.new_host_id {
        state.broadcast_to_room(
            &outcome.room_code,
            ServerMessage::NewHost {
                connection_id: new_host_id,
            },
        );
    }
    // a departure can be the last thing a phase was waiting on
    if state.all_players_submitted(&outcome.room_code).await {
        let _ = end_round_and_notify(state, &outcome.room_code).await;
    } else if state.all_votes_submitted(&outcome.room_code).await {
        let _ = finalize_and_notify(state, &outcome.room_code).await;
    }
}
