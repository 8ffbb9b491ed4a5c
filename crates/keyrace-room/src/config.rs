//! Room settings (chosen by the host) and registry configuration (chosen
//! by the operator).

use std::time::Duration;

use keyrace_protocol::GameMode;

use crate::RoomError;

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// What the host picked in `create_lobby`. Immutable once the room exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSettings {
    pub mode: GameMode,
    pub max_players: u32,
    /// `None` means anyone with the code may join.
    pub password: Option<String>,
}

impl RoomSettings {
    /// Smallest room that can race.
    pub const MIN_PLAYERS: u32 = 2;
    /// Largest room allowed.
    pub const MAX_PLAYERS: u32 = 4;

    /// Validates raw `create_lobby` input.
    ///
    /// An empty or whitespace-only password counts as no password.
    ///
    /// # Errors
    /// [`RoomError::InvalidConfig`] for an unknown mode or a player limit
    /// outside `MIN_PLAYERS..=MAX_PLAYERS`.
    pub fn new(mode: &str, max_players: u32, password: Option<String>) -> Result<Self, RoomError> {
        let mode: GameMode = mode
            .parse()
            .map_err(|_| RoomError::InvalidConfig(format!("unknown game mode '{mode}'")))?;

        if !(Self::MIN_PLAYERS..=Self::MAX_PLAYERS).contains(&max_players) {
            return Err(RoomError::InvalidConfig(format!(
                "maxPlayers must be between {} and {}, got {max_players}",
                Self::MIN_PLAYERS,
                Self::MAX_PLAYERS
            )));
        }

        let password = password.filter(|p| !p.trim().is_empty());
        Ok(Self {
            mode,
            max_players,
            password,
        })
    }

    /// Validates a `create_lobby` request where the player limit arrived
    /// as an arbitrary JSON number.
    ///
    /// # Errors
    /// [`RoomError::InvalidConfig`] when `max_players` is not a whole
    /// number, plus everything [`RoomSettings::new`] rejects.
    pub fn from_request(
        mode: &str,
        max_players: f64,
        password: Option<String>,
    ) -> Result<Self, RoomError> {
        if !max_players.is_finite() || max_players.fract() != 0.0 || max_players < 0.0 {
            return Err(RoomError::InvalidConfig(format!(
                "maxPlayers must be a whole number, got {max_players}"
            )));
        }
        let max_players = u32::try_from(max_players as u64).unwrap_or(u32::MAX);
        Self::new(mode, max_players, password)
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Whether `attempt` opens this room.
    pub fn admits(&self, attempt: Option<&str>) -> bool {
        match &self.password {
            None => true,
            Some(expected) => attempt == Some(expected.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Operator-level settings shared by every room in a registry.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// How long a dropped player's slot is held. Zero removes them at once.
    pub reconnect_grace: Duration,
    /// Rooms idle for this long are closed by the sweeper.
    pub room_ttl: Duration,
    /// Capacity of each room actor's command channel.
    pub channel_size: usize,
    /// How many fresh codes to try before giving up on a collision streak.
    pub code_attempts: usize,
    /// Seeds each room's round/text RNG for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::ZERO,
            room_ttl: Duration::from_secs(60 * 60),
            channel_size: 64,
            code_attempts: 16,
            seed: None,
        }
    }
}
