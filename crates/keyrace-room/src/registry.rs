//! Room registry: allocates codes, spawns room actors, and finds them
//! again.
//!
//! The registry only holds handles. Every room-level rule (capacity,
//! password, host, rounds) is enforced inside the room's own actor, so
//! two players racing for the last seat are settled by the actor's
//! command order rather than by a lock here.

use std::collections::HashMap;
use std::sync::Arc;

use keyrace_protocol::{LobbySummary, PlayerId, Profile, RoomCode, RoomSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use crate::content::ContentProvider;
use crate::room::{NewRoom, spawn_room};
use crate::{LeaveOutcome, PlayerSender, RoomConfig, RoomError, RoomHandle, RoomSettings};

type CodeSource = Box<dyn FnMut() -> RoomCode + Send>;

/// Generates a random room code.
pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> RoomCode {
    let code: String = (0..RoomCode::LEN)
        .map(|_| {
            let i = rng.random_range(0..RoomCode::ALPHABET.len());
            RoomCode::ALPHABET[i] as char
        })
        .collect();
    RoomCode::new(code)
}

struct Inner {
    rooms: HashMap<RoomCode, RoomHandle>,
    codes: CodeSource,
    spawned: u64,
}

impl Inner {
    /// Draws codes until one is not held by a live room.
    fn free_code(&mut self, attempts: usize) -> Result<RoomCode, RoomError> {
        for _ in 0..attempts {
            let code = (self.codes)();
            match self.rooms.get(&code) {
                Some(handle) if !handle.is_closed() => {
                    tracing::debug!(room_id = %code, "room code collision, retrying");
                }
                _ => return Ok(code),
            }
        }
        Err(RoomError::CodeSpaceExhausted(attempts))
    }

    /// Forgets `code` if it still points at the actor behind `handle`.
    fn forget(&mut self, code: &RoomCode, handle: &RoomHandle) -> bool {
        if self.rooms.get(code).is_some_and(|h| h.same_room(handle)) {
            self.rooms.remove(code);
            true
        } else {
            false
        }
    }
}

/// Every live room on the server, by code.
pub struct RoomRegistry {
    inner: Mutex<Inner>,
    config: RoomConfig,
    content: Arc<dyn ContentProvider>,
}

impl RoomRegistry {
    /// Creates a registry drawing codes from a random source (seeded when
    /// `config.seed` is set).
    pub fn new(config: RoomConfig, content: Arc<dyn ContentProvider>) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self::with_code_source(config, content, move || random_code(&mut rng))
    }

    /// Creates a registry drawing codes from `codes`.
    pub fn with_code_source(
        config: RoomConfig,
        content: Arc<dyn ContentProvider>,
        codes: impl FnMut() -> RoomCode + Send + 'static,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rooms: HashMap::new(),
                codes: Box::new(codes),
                spawned: 0,
            }),
            config,
            content,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Opens a room with `host` seated and ready.
    ///
    /// The host's `lobby_created` event goes out through `sender` before
    /// this returns.
    ///
    /// # Errors
    /// [`RoomError::CodeSpaceExhausted`] if every attempted code was taken.
    pub async fn create_room(
        &self,
        settings: RoomSettings,
        host: PlayerId,
        profile: Profile,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        let mut inner = self.inner.lock().await;
        let code = inner.free_code(self.config.code_attempts)?;
        inner.spawned += 1;
        let rng = self.room_rng(inner.spawned);

        let (handle, snapshot) = spawn_room(
            NewRoom {
                code: code.clone(),
                settings,
                host,
                profile,
                sender,
            },
            &self.config,
            Arc::clone(&self.content),
            rng,
        );
        inner.rooms.insert(code.clone(), handle);

        tracing::info!(room_id = %code, %host, rooms = inner.rooms.len(), "room created");
        Ok(snapshot)
    }

    /// Looks up a live room.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] for unknown codes and for rooms whose
    /// actor has stopped.
    pub async fn handle(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        let mut inner = self.inner.lock().await;
        match inner.rooms.get(code) {
            Some(handle) if !handle.is_closed() => Ok(handle.clone()),
            Some(_) => {
                inner.rooms.remove(code);
                Err(RoomError::NotFound(code.clone()))
            }
            None => Err(RoomError::NotFound(code.clone())),
        }
    }

    /// The current snapshot of room `code`.
    pub async fn get_room(&self, code: &RoomCode) -> Result<RoomSnapshot, RoomError> {
        let handle = self.handle(code).await?;
        handle.snapshot().await.map_err(not_found_if_gone)
    }

    /// Seats `player` in the room `code`.
    pub async fn add_player(
        &self,
        code: &RoomCode,
        player: PlayerId,
        profile: Profile,
        password: Option<String>,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        let handle = self.handle(code).await?;
        handle
            .join(player, profile, password, sender)
            .await
            .map_err(not_found_if_gone)
    }

    /// Removes `player` from `code`, forgetting the room if it emptied.
    pub async fn remove_player(
        &self,
        code: &RoomCode,
        player: PlayerId,
    ) -> Result<LeaveOutcome, RoomError> {
        let handle = self.handle(code).await?;
        let outcome = handle.leave(player).await.map_err(not_found_if_gone)?;
        if outcome.emptied && self.inner.lock().await.forget(code, &handle) {
            tracing::info!(room_id = %code, "room closed: last player left");
        }
        Ok(outcome)
    }

    /// Holds `player`'s slot in `code` for the reconnect grace period.
    pub async fn disconnect_player(&self, code: &RoomCode, player: PlayerId) -> Result<(), RoomError> {
        let handle = self.handle(code).await?;
        handle.disconnect(player).await.map_err(not_found_if_gone)
    }

    /// Reattaches a held player to a new connection.
    pub async fn reconnect_player(
        &self,
        code: &RoomCode,
        player: PlayerId,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        let handle = self.handle(code).await?;
        handle
            .reconnect(player, sender)
            .await
            .map_err(not_found_if_gone)
    }

    /// Rooms that are waiting with a free seat, ordered by code.
    pub async fn list_open(&self) -> Vec<LobbySummary> {
        let handles = self.live_handles().await;
        let mut open = Vec::new();
        for handle in handles {
            match handle.info().await {
                Ok(info) if info.is_open => open.push(info.summary),
                Ok(_) => {}
                Err(_) => {
                    self.inner.lock().await.forget(handle.code(), &handle);
                }
            }
        }
        open.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        open
    }

    /// Closes every room idle for at least the configured TTL, telling
    /// its members why. Returns the closed codes.
    pub async fn sweep_expired(&self) -> Vec<RoomCode> {
        let handles = self.live_handles().await;
        let mut closed = Vec::new();
        for handle in handles {
            let expired = match handle.info().await {
                Ok(info) => info.idle_for >= self.config.room_ttl,
                Err(_) => {
                    self.inner.lock().await.forget(handle.code(), &handle);
                    continue;
                }
            };
            if !expired {
                continue;
            }
            let _ = handle.close("expired").await;
            self.inner.lock().await.forget(handle.code(), &handle);
            tracing::info!(room_id = %handle.code(), "room closed: expired");
            closed.push(handle.code().clone());
        }
        closed
    }

    /// Closes every room, e.g. on shutdown.
    pub async fn close_all(&self, reason: &str) {
        let handles: Vec<RoomHandle> = self.inner.lock().await.rooms.drain().map(|(_, h)| h).collect();
        for handle in handles {
            let _ = handle.close(reason).await;
        }
    }

    /// Number of rooms whose actor is still running.
    pub async fn room_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .rooms
            .values()
            .filter(|h| !h.is_closed())
            .count()
    }

    async fn live_handles(&self) -> Vec<RoomHandle> {
        let mut inner = self.inner.lock().await;
        inner.rooms.retain(|_, h| !h.is_closed());
        inner.rooms.values().cloned().collect()
    }

    fn room_rng(&self, index: u64) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index)),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }
}

/// A stopped actor looks the same as a missing room to callers.
fn not_found_if_gone(err: RoomError) -> RoomError {
    match err {
        RoomError::Unavailable(code) => RoomError::NotFound(code),
        other => other,
    }
}
