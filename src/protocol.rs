use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom {
        nickname: String,
        session_id: SessionId,
    },
    JoinRoom {
        room_code: RoomCode,
        nickname: String,
        session_id: SessionId,
    },
    /// Reconnect into an existing seat; rebinds the connection in place
    RejoinRoom {
        room_code: RoomCode,
        nickname: String,
        session_id: SessionId,
    },
    LeaveRoom {
        room_code: RoomCode,
    },
    KickPlayer {
        room_code: RoomCode,
        target_id: ConnectionId,
    },
    SetReady {
        room_code: RoomCode,
        is_ready: bool,
    },
    SetRoomPublic {
        room_code: RoomCode,
        is_public: bool,
    },
    ListPublicRooms,
    UpdateSettings {
        room_code: RoomCode,
        category_names: Vec<String>,
        round_count: u32,
    },
    StartGame {
        room_code: RoomCode,
    },
    /// Press STOP; carries the caller's answers so they are submitted
    /// whether or not the press wins the race
    TriggerStop {
        room_code: RoomCode,
        answers: HashMap<String, String>,
    },
    AddTime {
        room_code: RoomCode,
        seconds: u64,
    },
    SubmitAnswers {
        room_code: RoomCode,
        answers: HashMap<String, String>,
    },
    VoteAnswer {
        room_code: RoomCode,
        answer_id: AnswerGroupId,
        is_valid: bool,
    },
    SubmitVotes {
        room_code: RoomCode,
    },
    StartNextRound {
        room_code: RoomCode,
    },
    EndGame {
        room_code: RoomCode,
    },
    ReturnToLobby {
        room_code: RoomCode,
    },
    ReportViolation {
        room_code: RoomCode,
        violation_type: ViolationType,
        duration_seconds: f64,
    },
    SendChat {
        room_code: RoomCode,
        text: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection
    Welcome {
        protocol: String,
        connection_id: ConnectionId,
        server_now: DateTime<Utc>,
    },
    /// Sent to the caller after create, join, or rejoin
    RoomJoined {
        room: Room,
        connection_id: ConnectionId,
    },
    PlayerJoined {
        nickname: String,
        connection_id: ConnectionId,
        avatar_color: String,
    },
    PlayerLeft {
        connection_id: ConnectionId,
    },
    NewHost {
        connection_id: ConnectionId,
    },
    PlayerKicked {
        connection_id: ConnectionId,
    },
    /// Sent only to the kicked player
    Kicked,
    PlayerReadyChanged {
        connection_id: ConnectionId,
        is_ready: bool,
    },
    RoomVisibilityChanged {
        is_public: bool,
    },
    PublicRooms {
        rooms: Vec<PublicRoomInfo>,
    },
    SettingsUpdated {
        category_names: Vec<String>,
        round_count: u32,
    },
    GameStarted {
        category_names: Vec<String>,
        total_rounds: u32,
    },
    RoundStarted {
        letter: char,
        round_number: u32,
        answer_deadline: Option<DateTime<Utc>>,
    },
    StopTriggered {
        connection_id: ConnectionId,
        end_time: DateTime<Utc>,
    },
    TimeAdded {
        new_end_time: DateTime<Utc>,
    },
    /// Sent to the submitting caller only
    AnswersAccepted,
    PlayerSubmitted {
        connection_id: ConnectionId,
    },
    RoundEnded {
        answers: Vec<AnswerForVoting>,
        voting_deadline: Option<DateTime<Utc>>,
    },
    VoteCast {
        answer_id: AnswerGroupId,
        valid_votes: usize,
        invalid_votes: usize,
    },
    VotesSubmitted {
        submitted_count: usize,
    },
    VotingEnded {
        answers: Vec<AnswerForVoting>,
        /// Nickname -> (round score, total score)
        scores: HashMap<String, (i32, i32)>,
        is_final_round: bool,
    },
    GameEnded,
    ReturnToLobby {
        room_code: RoomCode,
    },
    ViolationReported {
        connection_id: ConnectionId,
        violation_type: ViolationType,
        duration_seconds: f64,
        penalty: i32,
    },
    ChatMessage {
        nickname: String,
        text: String,
        is_system: bool,
        sent_at: DateTime<Utc>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(err: &crate::error::GameError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}
