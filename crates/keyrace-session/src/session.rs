//! Session types: the server's record of one player.
//!
//! A session outlives any single socket. It tracks who the player is,
//! which room they are bound to, and how they can come back after a
//! dropped connection.

use std::time::Duration;

use keyrace_protocol::{PlayerId, Profile, RoomCode};
use tokio::time::Instant;

/// Configuration for session behavior.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// How long a dropped player may take to `resume_session`.
    ///
    /// Zero (the default) means a disconnect is final: the session is
    /// removed on the spot and no resume token is handed out.
    pub reconnect_grace: Duration,
}

impl SessionConfig {
    /// Whether resume tokens are worth issuing.
    pub fn allows_resume(&self) -> bool {
        !self.reconnect_grace.is_zero()
    }
}

/// The current state of a player's session.
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected ──(grace elapsed)──→ Expired
///       ↑                            │
///       └──────(resume_session)──────┘
/// ```
#[derive(Debug, Clone)]
pub enum SessionState {
    Connected,
    /// Dropped at `since`; resumable until `since + reconnect_grace`.
    Disconnected { since: Instant },
    /// Waiting for [`SessionManager::cleanup_expired`](crate::SessionManager::cleanup_expired).
    Expired,
}

/// A single player's session on the server.
#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: PlayerId,
    /// Display identity as resolved by the profile provider.
    pub profile: Profile,
    pub state: SessionState,
    /// Secret the client presents in `resume_session`: 32 hex chars.
    pub resume_token: String,
    /// The room this player is currently a member of.
    pub room: Option<RoomCode>,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected)
    }
}
