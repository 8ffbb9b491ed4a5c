//! # Keyrace
//!
//! Real-time lobby and race server for a multiplayer typing game.
//!
//! Browser clients connect over WebSocket, create or join a room by its
//! six-character code, and race to type the same passage. The server is
//! authoritative for membership, the host role, round timing, and final
//! standings; clients only report their own progress.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keyrace::prelude::*;
//!
//! # async fn run() -> Result<(), KeyraceError> {
//! let server = KeyraceServer::builder()
//!     .config(ServerConfig::from_env()?)
//!     .build(GuestProfiles::default())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod gateway;
mod server;
mod sweeper;

pub use config::{ConfigError, DEFAULT_BIND, ServerConfig};
pub use error::KeyraceError;
pub use server::{KeyraceServer, KeyraceServerBuilder};

/// Everything needed to embed a Keyrace server.
pub mod prelude {
    pub use crate::{ConfigError, KeyraceError, KeyraceServer, KeyraceServerBuilder, ServerConfig};

    pub use keyrace_protocol::{
        ClientEvent, Codec, ErrorCode, JsonCodec, LobbyView, PlayerId, Profile, RoomCode,
        RoomSnapshot, RoomStatus, ServerEvent,
    };
    pub use keyrace_room::{ContentProvider, ParagraphBank, RoomConfig, RoomError};
    pub use keyrace_session::{GuestProfiles, ProfileProvider, SessionConfig, SessionError};
    pub use keyrace_transport::TransportError;
}
