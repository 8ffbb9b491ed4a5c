//! Error types for the session layer.

use keyrace_protocol::{ErrorCode, PlayerId};

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The profile provider refused the claimed display identity.
    #[error("profile rejected: {0}")]
    ProfileRejected(String),

    /// No session exists for the given player.
    #[error("session not found for player {0}")]
    NotFound(PlayerId),

    /// The resume token doesn't match anything the server issued.
    #[error("invalid resume token")]
    InvalidToken,

    /// The reconnect grace period has elapsed.
    #[error("session expired for player {0}")]
    SessionExpired(PlayerId),

    /// The player already has a live session.
    #[error("player {0} already has an active session")]
    AlreadyConnected(PlayerId),
}

impl SessionError {
    /// The wire error code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ProfileRejected(_) => ErrorCode::InvalidConfig,
            Self::NotFound(_) | Self::InvalidToken | Self::SessionExpired(_) => {
                ErrorCode::SessionExpired
            }
            Self::AlreadyConnected(_) => ErrorCode::AlreadyInRoom,
        }
    }
}
