//! Core protocol types: identities, room codes, modes, and the room
//! snapshot that every membership change broadcasts.
//!
//! All structs here use camelCase field names on the wire because the
//! browser client reads them directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Assigned from the connection id when a session is first created and
/// kept across `resume_session`, so it is the player's identity for the
/// lifetime of the session rather than of one socket.
///
/// `#[serde(transparent)]` puts it on the wire as a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A short, human-shareable room code such as `"K7Q2ZD"`.
///
/// Codes are normalized on construction (surrounding whitespace trimmed,
/// letters upper-cased), so a player typing `" k7q2zd "` reaches the same
/// room. Deserialization goes through the same normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Number of characters in a generated code.
    pub const LEN: usize = 6;

    /// Characters a generated code is drawn from.
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Creates a normalized room code.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the code has the generated shape: [`LEN`](Self::LEN)
    /// characters, all from [`ALPHABET`](Self::ALPHABET).
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == Self::LEN && self.0.bytes().all(|b| Self::ALPHABET.contains(&b))
    }
}

impl From<String> for RoomCode {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<&str> for RoomCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Room configuration
// ---------------------------------------------------------------------------

/// How each round's difficulty and time limit are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Each round is a coin flip between medium and hard.
    Random,
    /// Difficulty escalates with the round number.
    Tier,
}

impl FromStr for GameMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "tier" => Ok(Self::Tier),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown game mode '{other}'"
            ))),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Random => "random",
            Self::Tier => "tier",
        })
    }
}

/// Difficulty class of a passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        })
    }
}

/// Lifecycle state of a room.
///
/// ```text
/// waiting ──► starting ──► in_progress ──► finished
///    ▲                                        │
///    └────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Waiting,
    Starting,
    InProgress,
    Finished,
}

impl RoomStatus {
    /// Only waiting rooms accept new players.
    pub fn is_joinable(self) -> bool {
        self == Self::Waiting
    }

    /// The one state this state may move to.
    pub fn next(self) -> Self {
        match self {
            Self::Waiting => Self::Starting,
            Self::Starting => Self::InProgress,
            Self::InProgress => Self::Finished,
            Self::Finished => Self::Waiting,
        }
    }

    /// Whether `self → to` is a legal transition. Only single forward
    /// steps are, with `finished → waiting` closing the cycle.
    pub fn can_transition_to(self, to: Self) -> bool {
        to == self.next()
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
        })
    }
}

/// Display identity supplied by the client and cleaned up by the
/// session layer's profile provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub avatar: String,
    pub theme: String,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One player as seen in a [`RoomSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub connection_id: PlayerId,
    pub username: String,
    pub avatar: String,
    pub theme: String,
    pub is_host: bool,
    pub is_ready: bool,
    /// False while the player's slot is held during a reconnect grace.
    pub connected: bool,
    /// Percentage of the passage typed, 0–100.
    pub progress: f64,
    pub wpm: f64,
    /// Final position, set only when a round has finished.
    pub rank: Option<u32>,
}

/// The full state of a room. Clients replace their local copy with each
/// snapshot they receive rather than patching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomCode,
    pub host_id: PlayerId,
    pub mode: GameMode,
    pub max_players: u32,
    /// Whether joining needs a password. The password itself never
    /// leaves the server.
    pub has_password: bool,
    pub status: RoomStatus,
    pub round: u32,
    pub target_text: Option<String>,
    /// Round length in seconds.
    pub time_limit: Option<u64>,
    /// Unix milliseconds at which the current round started.
    pub start_timestamp: Option<u64>,
    pub players: Vec<PlayerSnapshot>,
}

impl RoomSnapshot {
    /// Looks up a player by id.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| p.connection_id == id)
    }

    /// Mutable lookup, used by client-side reconcilers.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerSnapshot> {
        self.players.iter_mut().find(|p| p.connection_id == id)
    }
}

/// A room as shown in the lobby browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub room_id: RoomCode,
    pub mode: GameMode,
    pub players: u32,
    pub max_players: u32,
    pub has_password: bool,
}

// ---------------------------------------------------------------------------
// Recipient: who should receive an event?
// ---------------------------------------------------------------------------

/// Specifies who should receive a server event.
///
/// Room logic returns `(Recipient, ServerEvent)` pairs and the room actor
/// delivers each one to the matching members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every player in the room.
    All,
    /// One specific player.
    Player(PlayerId),
    /// Everyone except the given player.
    AllExcept(PlayerId),
}

impl Recipient {
    /// Whether `player` is addressed by this recipient.
    pub fn includes(self, player: PlayerId) -> bool {
        match self {
            Self::All => true,
            Self::Player(id) => id == player,
            Self::AllExcept(id) => id != player,
        }
    }
}
