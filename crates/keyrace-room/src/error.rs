//! Error types for the room layer.

use keyrace_protocol::{ErrorCode, PlayerId, RoomCode};

/// Errors that can occur during room operations.
///
/// Every variant is reported only to the player whose command failed;
/// the room and its other members carry on.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Bad `create_lobby` input.
    #[error("invalid room settings: {0}")]
    InvalidConfig(String),

    #[error("room {0} not found")]
    NotFound(RoomCode),

    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// The room is racing (or about to) and does not accept players.
    #[error("room {0} has already started")]
    NotJoinable(RoomCode),

    #[error("wrong password for room {0}")]
    WrongPassword(RoomCode),

    #[error("only the host can start room {0}")]
    NotHost(RoomCode),

    #[error("room {0} needs at least {1} players to start")]
    NotEnoughPlayers(RoomCode, u32),

    #[error("player {0} already in room {1}")]
    AlreadyInRoom(PlayerId, RoomCode),

    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomCode),

    /// Progress must be finite and within 0–100; WPM finite and ≥ 0.
    #[error("invalid progress report: {0}")]
    InvalidProgress(String),

    #[error("room {0} is already running a round")]
    RoundInProgress(RoomCode),

    /// Every generated code collided with a live room.
    #[error("could not allocate a free room code after {0} attempts")]
    CodeSpaceExhausted(usize),

    /// The room's actor has stopped (it emptied or expired).
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}

impl RoomError {
    /// The wire error code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::NotFound(_) | Self::Unavailable(_) => ErrorCode::RoomNotFound,
            Self::RoomFull(_) => ErrorCode::RoomFull,
            Self::NotJoinable(_) => ErrorCode::RoomNotJoinable,
            Self::WrongPassword(_) => ErrorCode::WrongPassword,
            Self::NotHost(_) => ErrorCode::NotHost,
            Self::NotEnoughPlayers(..) => ErrorCode::NotEnoughPlayers,
            Self::AlreadyInRoom(..) => ErrorCode::AlreadyInRoom,
            Self::NotInRoom(..) => ErrorCode::NotInRoom,
            Self::InvalidProgress(_) => ErrorCode::InvalidProgress,
            Self::RoundInProgress(_) => ErrorCode::RoundInProgress,
            Self::CodeSpaceExhausted(_) => ErrorCode::Internal,
        }
    }
}
