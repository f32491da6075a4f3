use thiserror::Error;

/// All the ways a room or game command can be rejected.
///
/// Everything here is recoverable and reported only to the caller; nothing
/// in this taxonomy crashes a room.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    // Not-found
    #[error("Room not found")]
    RoomNotFound,
    #[error("You are not in a room")]
    NotInRoom,
    #[error("Player not found")]
    PlayerNotFound,
    #[error("Answer not found")]
    AnswerNotFound,

    // Validation
    #[error("Room is full")]
    RoomFull,
    #[error("That nickname is already taken")]
    NicknameTaken,
    #[error("Select at least one category")]
    NoCategories,
    #[error("Round count must be between 1 and 20")]
    InvalidRoundCount,
    #[error("Chat message is empty")]
    EmptyMessage,
    #[error("Time extension must be between 1 and 60 seconds")]
    InvalidTimeExtension,

    // Authorization
    #[error("Only the host can do that")]
    NotHost,
    #[error("You cannot kick yourself")]
    CannotKickSelf,
    #[error("Only the player who pressed STOP can add time")]
    NotStopTrigger,

    // State conflicts
    #[error("The game has already started")]
    GameAlreadyStarted,
    #[error("The game is not active")]
    GameNotActive,
    #[error("The game is over")]
    GameOver,
    #[error("At least 2 players are needed")]
    TooFewPlayers,
    #[error("Not all players are ready")]
    NotAllReady,
    #[error("That action is not valid in the current phase")]
    WrongPhase,
    #[error("STOP has already been pressed")]
    StopAlreadyTriggered,
}

impl GameError {
    /// Stable machine-readable code sent alongside the human message
    pub fn code(&self) -> &'static str {
        match self {
            GameError::RoomNotFound => "ROOM_NOT_FOUND",
            GameError::NotInRoom => "NOT_IN_ROOM",
            GameError::PlayerNotFound => "PLAYER_NOT_FOUND",
            GameError::AnswerNotFound => "ANSWER_NOT_FOUND",
            GameError::RoomFull => "ROOM_FULL",
            GameError::NicknameTaken => "NICKNAME_TAKEN",
            GameError::NoCategories => "NO_CATEGORIES",
            GameError::InvalidRoundCount => "INVALID_ROUND_COUNT",
            GameError::EmptyMessage => "EMPTY_MESSAGE",
            GameError::InvalidTimeExtension => "INVALID_TIME_EXTENSION",
            GameError::NotHost => "NOT_HOST",
            GameError::CannotKickSelf => "CANNOT_KICK_SELF",
            GameError::NotStopTrigger => "NOT_STOP_TRIGGER",
            GameError::GameAlreadyStarted => "GAME_STARTED",
            GameError::GameNotActive => "GAME_NOT_ACTIVE",
            GameError::GameOver => "GAME_OVER",
            GameError::TooFewPlayers => "TOO_FEW_PLAYERS",
            GameError::NotAllReady => "NOT_ALL_READY",
            GameError::WrongPhase => "WRONG_PHASE",
            GameError::StopAlreadyTriggered => "STOP_ALREADY_TRIGGERED",
        }
    }
}
