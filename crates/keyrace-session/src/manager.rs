//! The session manager: tracks every player the server knows about.
//!
//! `SessionManager` is a plain single-owner structure; the server wraps
//! it in a mutex and holds the lock only for the duration of one call.

use std::collections::HashMap;

use keyrace_protocol::{PlayerId, Profile, RoomCode};
use rand::Rng;
use tokio::time::Instant;

use crate::{Session, SessionConfig, SessionError, SessionState};

/// What [`SessionManager::disconnect`] did with the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The session was dropped on the spot.
    Removed { room: Option<RoomCode> },
    /// The session is held for the grace period.
    Held { room: RoomCode },
}

impl Departure {
    /// The room the player was in, either way.
    pub fn room(&self) -> Option<&RoomCode> {
        match self {
            Self::Removed { room } => room.as_ref(),
            Self::Held { room } => Some(room),
        }
    }
}

/// Manages all player sessions.
///
/// ```text
/// create() ──→ bind_room() ──→ disconnect() ──→ reconnect()
///                                   │
///                                   ▼
///                             expire_stale() ──→ cleanup_expired()
/// ```
pub struct SessionManager {
    sessions: HashMap<PlayerId, Session>,
    /// Resume token → owner, kept in sync with `sessions`.
    tokens: HashMap<String, PlayerId>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates a connected session with a fresh resume token.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if the player already has a
    /// connected session.
    pub fn create(&mut self, player_id: PlayerId, profile: Profile) -> Result<&Session, SessionError> {
        if let Some(existing) = self.sessions.get(&player_id) {
            if existing.is_connected() {
                return Err(SessionError::AlreadyConnected(player_id));
            }
            self.tokens.remove(&existing.resume_token);
        }

        let token = generate_token();
        self.tokens.insert(token.clone(), player_id);
        let session = self.sessions.entry(player_id).insert_entry(Session {
            player_id,
            profile,
            state: SessionState::Connected,
            resume_token: token,
            room: None,
        });

        tracing::debug!(%player_id, "session created");
        Ok(session.into_mut())
    }

    /// Replaces the player's display profile.
    pub fn set_profile(&mut self, player_id: PlayerId, profile: Profile) -> Result<(), SessionError> {
        self.session_mut(player_id)?.profile = profile;
        Ok(())
    }

    /// Records that the player is now a member of `room`.
    pub fn bind_room(&mut self, player_id: PlayerId, room: RoomCode) -> Result<(), SessionError> {
        self.session_mut(player_id)?.room = Some(room);
        Ok(())
    }

    /// Clears the room binding, returning the room it pointed at.
    pub fn unbind_room(&mut self, player_id: PlayerId) -> Option<RoomCode> {
        self.sessions.get_mut(&player_id)?.room.take()
    }

    /// Clears the binding only if it still points at `room`.
    pub fn unbind_room_if(&mut self, player_id: PlayerId, room: &RoomCode) -> bool {
        match self.sessions.get_mut(&player_id) {
            Some(session) if session.room.as_ref() == Some(room) => {
                session.room = None;
                true
            }
            _ => false,
        }
    }

    /// The room the player is bound to, if any.
    pub fn room_of(&self, player_id: PlayerId) -> Option<&RoomCode> {
        self.sessions.get(&player_id)?.room.as_ref()
    }

    /// Handles a dropped connection.
    ///
    /// A player who is in a room keeps their session for the grace period
    /// when one is configured. Everyone else is removed immediately.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if no session exists.
    pub fn disconnect(&mut self, player_id: PlayerId) -> Result<Departure, SessionError> {
        let grace = self.config.allows_resume();
        let session = self.session_mut(player_id)?;

        match (grace, session.room.clone()) {
            (true, Some(room)) => {
                session.state = SessionState::Disconnected {
                    since: Instant::now(),
                };
                tracing::info!(%player_id, room_id = %room, "player disconnected, grace period started");
                Ok(Departure::Held { room })
            }
            (_, room) => {
                self.remove(player_id);
                tracing::debug!(%player_id, "player disconnected, session removed");
                Ok(Departure::Removed { room })
            }
        }
    }

    /// Restores a held session from its resume token.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`]: token not recognized
    /// - [`SessionError::SessionExpired`]: grace period elapsed
    /// - [`SessionError::AlreadyConnected`]: the session is still live
    pub fn reconnect(&mut self, token: &str) -> Result<&Session, SessionError> {
        let player_id = self
            .tokens
            .get(token)
            .copied()
            .ok_or(SessionError::InvalidToken)?;
        let grace = self.config.reconnect_grace;
        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::InvalidToken)?;

        match session.state {
            SessionState::Disconnected { since } if since.elapsed() <= grace => {
                session.state = SessionState::Connected;
                tracing::info!(%player_id, "player resumed session");
                Ok(session)
            }
            SessionState::Disconnected { .. } | SessionState::Expired => {
                session.state = SessionState::Expired;
                Err(SessionError::SessionExpired(player_id))
            }
            SessionState::Connected => Err(SessionError::AlreadyConnected(player_id)),
        }
    }

    /// Marks every session whose grace period elapsed as expired.
    ///
    /// Returns the expired sessions so callers can drop their room slots
    /// before [`cleanup_expired`](Self::cleanup_expired) forgets them.
    pub fn expire_stale(&mut self) -> Vec<Session> {
        let grace = self.config.reconnect_grace;
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = session.state {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    tracing::info!(player_id = %session.player_id, "session expired (grace period elapsed)");
                    expired.push(session.clone());
                }
            }
        }

        expired
    }

    /// Removes expired sessions. Returns how many were removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.sessions.len();
        let tokens = &mut self.tokens;
        self.sessions.retain(|_, session| {
            if matches!(session.state, SessionState::Expired) {
                tokens.remove(&session.resume_token);
                false
            } else {
                true
            }
        });
        before - self.sessions.len()
    }

    /// Forgets a session outright.
    pub fn remove(&mut self, player_id: PlayerId) -> Option<Session> {
        let session = self.sessions.remove(&player_id)?;
        self.tokens.remove(&session.resume_token);
        Some(session)
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    /// Number of sessions in any state.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(&mut self, player_id: PlayerId) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(&player_id)
            .ok_or(SessionError::NotFound(player_id))
    }
}

/// 32 lowercase hex characters (128 random bits).
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionManager`, named
    //! `test_{function}_{scenario}_{expected}`.
    //!
    //! Grace-period tests run on paused tokio time and move the clock with
    //! `tokio::time::advance`.

    use std::time::Duration;

    use super::*;

    fn manager(grace_secs: u64) -> SessionManager {
        SessionManager::new(SessionConfig {
            reconnect_grace: Duration::from_secs(grace_secs),
        })
    }

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn room(code: &str) -> RoomCode {
        RoomCode::new(code)
    }

    fn token_of(mgr: &SessionManager, id: u64) -> String {
        mgr.get(&pid(id)).unwrap().resume_token.clone()
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_new_player_returns_connected_session() {
        let mut mgr = manager(30);
        let session = mgr.create(pid(1), Profile::default()).unwrap();

        assert!(session.is_connected());
        assert_eq!(session.player_id, pid(1));
        assert_eq!(session.resume_token.len(), 32);
        assert!(session.room.is_none());
    }

    #[test]
    fn test_create_tokens_are_unique() {
        let mut mgr = manager(30);
        mgr.create(pid(1), Profile::default()).unwrap();
        mgr.create(pid(2), Profile::default()).unwrap();
        assert_ne!(token_of(&mgr, 1), token_of(&mgr, 2));
    }

    #[test]
    fn test_create_already_connected_returns_error() {
        let mut mgr = manager(30);
        mgr.create(pid(1), Profile::default()).unwrap();

        let result = mgr.create(pid(1), Profile::default());
        assert!(matches!(result, Err(SessionError::AlreadyConnected(p)) if p == pid(1)));
    }

    // =====================================================================
    // bind_room() / unbind_room()
    // =====================================================================

    #[test]
    fn test_bind_room_then_room_of() {
        let mut mgr = manager(0);
        mgr.create(pid(1), Profile::default()).unwrap();
        mgr.bind_room(pid(1), room("ABC123")).unwrap();
        assert_eq!(mgr.room_of(pid(1)), Some(&room("ABC123")));

        assert_eq!(mgr.unbind_room(pid(1)), Some(room("ABC123")));
        assert_eq!(mgr.room_of(pid(1)), None);
    }

    #[test]
    fn test_bind_room_unknown_player_returns_not_found() {
        let mut mgr = manager(0);
        let result = mgr.bind_room(pid(9), room("ABC123"));
        assert!(matches!(result, Err(SessionError::NotFound(p)) if p == pid(9)));
    }

    #[test]
    fn test_unbind_room_if_ignores_other_room() {
        let mut mgr = manager(0);
        mgr.create(pid(1), Profile::default()).unwrap();
        mgr.bind_room(pid(1), room("NEW111")).unwrap();

        assert!(!mgr.unbind_room_if(pid(1), &room("OLD000")));
        assert_eq!(mgr.room_of(pid(1)), Some(&room("NEW111")));
        assert!(mgr.unbind_room_if(pid(1), &room("NEW111")));
    }

    // =====================================================================
    // disconnect()
    // =====================================================================

    #[test]
    fn test_disconnect_without_grace_removes_session() {
        let mut mgr = manager(0);
        mgr.create(pid(1), Profile::default()).unwrap();
        mgr.bind_room(pid(1), room("ABC123")).unwrap();
        let token = token_of(&mgr, 1);

        let departure = mgr.disconnect(pid(1)).unwrap();

        assert_eq!(departure, Departure::Removed { room: Some(room("ABC123")) });
        assert!(mgr.get(&pid(1)).is_none());
        assert!(matches!(mgr.reconnect(&token), Err(SessionError::InvalidToken)));
    }

    #[test]
    fn test_disconnect_outside_room_removes_even_with_grace() {
        let mut mgr = manager(30);
        mgr.create(pid(1), Profile::default()).unwrap();

        let departure = mgr.disconnect(pid(1)).unwrap();

        assert_eq!(departure, Departure::Removed { room: None });
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_disconnect_in_room_with_grace_holds_session() {
        let mut mgr = manager(30);
        mgr.create(pid(1), Profile::default()).unwrap();
        mgr.bind_room(pid(1), room("ABC123")).unwrap();

        let departure = mgr.disconnect(pid(1)).unwrap();

        assert_eq!(departure.room(), Some(&room("ABC123")));
        assert!(matches!(departure, Departure::Held { .. }));
        assert!(matches!(
            mgr.get(&pid(1)).unwrap().state,
            SessionState::Disconnected { .. }
        ));
    }

    #[test]
    fn test_disconnect_unknown_player_returns_not_found() {
        let mut mgr = manager(30);
        assert!(matches!(mgr.disconnect(pid(99)), Err(SessionError::NotFound(_))));
    }

    // =====================================================================
    // reconnect()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_within_grace_restores_connected() {
        let mut mgr = manager(30);
        mgr.create(pid(1), Profile::default()).unwrap();
        mgr.bind_room(pid(1), room("ABC123")).unwrap();
        let token = token_of(&mgr, 1);
        mgr.disconnect(pid(1)).unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        let session = mgr.reconnect(&token).unwrap();

        assert!(session.is_connected());
        assert_eq!(session.room, Some(room("ABC123")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_grace_returns_expired() {
        let mut mgr = manager(30);
        mgr.create(pid(1), Profile::default()).unwrap();
        mgr.bind_room(pid(1), room("ABC123")).unwrap();
        let token = token_of(&mgr, 1);
        mgr.disconnect(pid(1)).unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        let result = mgr.reconnect(&token);

        assert!(matches!(result, Err(SessionError::SessionExpired(p)) if p == pid(1)));
    }

    #[test]
    fn test_reconnect_invalid_token_returns_error() {
        let mut mgr = manager(30);
        assert!(matches!(mgr.reconnect("nope"), Err(SessionError::InvalidToken)));
    }

    #[test]
    fn test_reconnect_live_session_returns_already_connected() {
        let mut mgr = manager(30);
        mgr.create(pid(1), Profile::default()).unwrap();
        let token = token_of(&mgr, 1);

        let result = mgr.reconnect(&token);
        assert!(matches!(result, Err(SessionError::AlreadyConnected(_))));
    }

    // =====================================================================
    // expire_stale() / cleanup_expired()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_expire_stale_then_cleanup_removes_session() {
        let mut mgr = manager(5);
        for id in [1, 2] {
            mgr.create(pid(id), Profile::default()).unwrap();
            mgr.bind_room(pid(id), room("ABC123")).unwrap();
        }
        mgr.disconnect(pid(1)).unwrap();

        assert!(mgr.expire_stale().is_empty());
        tokio::time::advance(Duration::from_secs(6)).await;

        let expired = mgr.expire_stale();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].player_id, pid(1));
        assert_eq!(expired[0].room, Some(room("ABC123")));

        assert_eq!(mgr.cleanup_expired(), 1);
        assert!(mgr.get(&pid(1)).is_none());
        assert!(mgr.get(&pid(2)).unwrap().is_connected());
    }

    #[test]
    fn test_remove_forgets_token() {
        let mut mgr = manager(30);
        mgr.create(pid(1), Profile::default()).unwrap();
        let token = token_of(&mgr, 1);

        assert!(mgr.remove(pid(1)).is_some());
        assert!(matches!(mgr.reconnect(&token), Err(SessionError::InvalidToken)));
    }

    #[test]
    fn test_set_profile_replaces_display_identity() {
        let mut mgr = manager(0);
        mgr.create(pid(1), Profile::default()).unwrap();
        let profile = Profile {
            username: "ana".into(),
            avatar: "cat".into(),
            theme: "dark".into(),
        };
        mgr.set_profile(pid(1), profile.clone()).unwrap();
        assert_eq!(mgr.get(&pid(1)).unwrap().profile, profile);
    }
}
