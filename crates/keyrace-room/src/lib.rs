//! Race rooms for Keyrace.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! members, host, round state machine, and timers. Nothing outside the
//! actor touches room state; callers talk to it through a [`RoomHandle`].
//!
//! # Key types
//!
//! - [`RoomRegistry`]: allocates room codes, spawns rooms, finds them
//! - [`RoomHandle`]: sends commands to a running room actor
//! - [`Lobby`]: the pure room state machine the actor drives
//! - [`RoomSettings`] / [`RoomConfig`]: per-room and server-wide settings
//! - [`ContentProvider`]: where passages come from
//!
//! # Round lifecycle
//!
//! ```text
//! waiting ──start──▶ starting ──▶ in_progress ──time up / all done──▶ finished
//!    ▲                                  │                                 │
//!    └──────────── abandoned ───────────┘◀──────────── results sent ──────┘
//! ```

mod config;
mod content;
mod error;
mod lobby;
mod ranking;
mod registry;
mod room;
mod round;

pub use config::{RoomConfig, RoomSettings};
pub use content::{ContentProvider, FALLBACK_TEXT, ParagraphBank};
pub use error::RoomError;
pub use lobby::{Lobby, Outbox, Removal};
pub use ranking::{RaceEntry, rank};
pub use registry::{RoomRegistry, random_code};
pub use room::{LeaveOutcome, PlayerSender, RoomHandle, RoomInfo};
pub use round::{RoundPlan, select_round};
