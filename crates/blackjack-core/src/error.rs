use thiserror::Error;

/// The wire-level bucket an error should be reported as. Mirrors the kind taxonomy:
/// malformed input stays open as `error`, precondition violations may be softer `warning`s,
/// and storage/upstream failures collapse to an opaque `internal_error` for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    NotFound,
    Precondition,
    Upstream,
    Storage,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication_required")]
    AuthRequired,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("room not found")]
    RoomNotFound,

    #[error("player not in this room")]
    PlayerNotInRoom,

    #[error("not your turn")]
    NotYourTurn,

    #[error("game is not in progress")]
    GameNotInProgress,

    #[error("room is full")]
    RoomFull,

    #[error("already in room")]
    AlreadyInRoom,

    #[error("your bet ({supplied}) does not match the room bet ({room_bet})")]
    BetMismatch { supplied: i64, room_bet: i64 },

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("bet must be a positive amount")]
    InvalidBet,

    #[error("upstream collaborator failure: {0}")]
    Upstream(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        use CoreError::*;
        match self {
            Validation(_) => ErrorKind::Validation,
            AuthRequired | InvalidToken => ErrorKind::Auth,
            RoomNotFound | PlayerNotInRoom => ErrorKind::NotFound,
            NotYourTurn
            | GameNotInProgress
            | RoomFull
            | AlreadyInRoom
            | BetMismatch { .. }
            | InsufficientFunds
            | InvalidBet => ErrorKind::Precondition,
            Upstream(_) => ErrorKind::Upstream,
            Storage(_) => ErrorKind::Storage,
        }
    }

    /// A stable machine-readable tag for the `error_type` field of the outbound `error` frame.
    pub fn error_type(&self) -> &'static str {
        use CoreError::*;
        match self {
            Validation(_) => "validation_error",
            AuthRequired => "authentication_required",
            InvalidToken => "invalid_token",
            RoomNotFound => "room_not_found",
            PlayerNotInRoom => "player_not_in_room",
            NotYourTurn => "not_your_turn",
            GameNotInProgress => "game_not_in_progress",
            RoomFull => "room_full",
            AlreadyInRoom => "already_in_room",
            BetMismatch { .. } => "bet_mismatch",
            InsufficientFunds => "insufficient_funds",
            InvalidBet => "invalid_bet",
            Upstream(_) => "internal_error",
            Storage(_) => "internal_error",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
