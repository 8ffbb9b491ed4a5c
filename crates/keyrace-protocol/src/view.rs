//! Client-side reconciliation of server events.
//!
//! [`LobbyView`] is what a client renderer keeps in memory. Snapshots
//! replace the room wholesale, so applying the same snapshot twice is a
//! no-op; `opponent_progress` only ever raises a player's progress, so a
//! late or duplicated relay cannot move a bar backwards.

use crate::events::{RoundResult, RoundStart, ServerEvent};
use crate::types::{PlayerId, RoomSnapshot, RoomStatus};

/// A client's local picture of its lobby.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LobbyView {
    me: Option<PlayerId>,
    room: Option<RoomSnapshot>,
    round: Option<RoundStart>,
    last_result: Option<RoundResult>,
    last_error: Option<String>,
}

impl LobbyView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one server event into the view.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Connected(connected) => {
                self.me = Some(connected.connection_id);
            }
            ServerEvent::LobbyCreated(snapshot)
            | ServerEvent::PlayerJoined(snapshot)
            | ServerEvent::JoinedSuccess(snapshot)
            | ServerEvent::RoomUpdated(snapshot)
            | ServerEvent::SessionResumed(snapshot) => {
                if snapshot.status != RoomStatus::InProgress {
                    self.round = None;
                }
                self.room = Some(snapshot.clone());
            }
            ServerEvent::GameStarting(start) => {
                if let Some(room) = self.room.as_mut() {
                    room.status = RoomStatus::InProgress;
                    room.round = start.round;
                    room.target_text = Some(start.text.clone());
                    room.time_limit = Some(start.time);
                    room.start_timestamp = Some(start.start_timestamp);
                    for player in &mut room.players {
                        player.progress = 0.0;
                        player.wpm = 0.0;
                        player.rank = None;
                    }
                }
                self.round = Some(start.clone());
                self.last_result = None;
            }
            ServerEvent::OpponentProgress(update) => {
                if let Some(player) = self
                    .room
                    .as_mut()
                    .and_then(|room| room.player_mut(update.connection_id))
                {
                    if update.progress > player.progress {
                        player.progress = update.progress;
                    }
                    player.wpm = update.wpm;
                }
            }
            ServerEvent::RoundFinished(result) => {
                if let Some(room) = self.room.as_mut() {
                    for standing in &result.standings {
                        if let Some(player) = room.player_mut(standing.connection_id) {
                            player.rank = Some(standing.rank);
                        }
                    }
                }
                self.round = None;
                self.last_result = Some(result.clone());
            }
            ServerEvent::LeftLobby(_) | ServerEvent::RoomClosed(_) => {
                self.room = None;
                self.round = None;
            }
            ServerEvent::Error(err) => {
                self.last_error = Some(format!("{}: {}", err.code, err.message));
            }
            ServerEvent::LobbyList(_) | ServerEvent::Pong(_) => {}
        }
    }

    /// This client's own player id, once `connected` has arrived.
    pub fn me(&self) -> Option<PlayerId> {
        self.me
    }

    pub fn room(&self) -> Option<&RoomSnapshot> {
        self.room.as_ref()
    }

    /// The round currently being raced, if any.
    pub fn round(&self) -> Option<&RoundStart> {
        self.round.as_ref()
    }

    pub fn last_result(&self) -> Option<&RoundResult> {
        self.last_result.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether this client is the room's host.
    pub fn is_host(&self) -> bool {
        matches!((self.me, &self.room), (Some(me), Some(room)) if room.host_id == me)
    }

    /// Last known progress of a player.
    pub fn progress_of(&self, player: PlayerId) -> Option<f64> {
        self.room.as_ref()?.player(player).map(|p| p.progress)
    }
}
