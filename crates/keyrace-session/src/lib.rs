//! Player session management for Keyrace.
//!
//! This crate handles the lifecycle of a player across connections:
//!
//! 1. **Profiles**: turning the name/avatar/theme a player typed into
//!    what others see ([`ProfileProvider`] trait, [`GuestProfiles`])
//! 2. **Session tracking**: who is connected and which room they are in
//!    ([`SessionManager`])
//! 3. **Resuming**: letting a dropped player reclaim their room slot
//!    with a token, within a configurable grace period
//!
//! # How it fits in the stack
//!
//! ```text
//! Gateway (above)  ← binds each connection to one session
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← PlayerId, Profile, RoomCode
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod manager;
mod profile;
mod session;

pub use error::SessionError;
pub use manager::{Departure, SessionManager};
pub use profile::{GuestProfiles, ProfileProvider};
pub use session::{Session, SessionConfig, SessionState};
