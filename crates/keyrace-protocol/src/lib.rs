//! Wire protocol for Keyrace.
//!
//! This crate defines the language browser clients and the server speak:
//!
//! - **Types** ([`RoomSnapshot`], [`RoomCode`], [`RoomStatus`], ...): the
//!   room state every membership change broadcasts.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]): the
//!   `{"event": ..., "data": ...}` frames on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): events to bytes and back.
//! - **View** ([`LobbyView`]): how a client folds server events into
//!   local state.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (events) → Gateway → Room actors
//! ```
//!
//! The protocol layer knows nothing about connections or rooms; it only
//! describes what travels between them.

mod codec;
mod error;
mod events;
mod types;
mod view;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{
    ClientEvent, Connected, CreateLobby, ErrorCode, ErrorPayload, FinishReason, JoinLobby,
    LobbyList, Ping, Pong, ProgressUpdate, ResumeSession, RoomClosed, RoomRef, RoundResult,
    RoundStart, ServerEvent, SetReady, Standing, UpdateProgress,
};
pub use types::{
    Difficulty, GameMode, LobbySummary, PlayerId, PlayerSnapshot, Profile, Recipient, RoomCode,
    RoomSnapshot, RoomStatus,
};
pub use view::LobbyView;
