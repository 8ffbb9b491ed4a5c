//! Unified error type for the Keyrace server.

use keyrace_protocol::{ErrorCode, ProtocolError};
use keyrace_room::RoomError;
use keyrace_session::SessionError;
use keyrace_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps every crate-specific error.
///
/// `?` converts sub-crate errors automatically through the `#[from]`
/// impls. Errors from a client command are turned into an `error` event
/// for that client with [`code`](Self::code); the rest end the task that
/// hit them.
#[derive(Debug, thiserror::Error)]
pub enum KeyraceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl KeyraceError {
    /// The wire error code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Room(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Protocol(_) => ErrorCode::MalformedMessage,
            Self::Transport(_) | Self::Config(_) => ErrorCode::Internal,
        }
    }
}
