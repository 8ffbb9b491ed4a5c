//! Room actor: one Tokio task per room.
//!
//! The actor owns a [`Lobby`] plus everything that needs a clock or a
//! channel: player senders, the round timer, and reconnect deadlines.
//! Commands arrive over an mpsc channel and are handled one at a time,
//! so every room sees a single total order of events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use keyrace_clock::{DeadlineQueue, RoundTimer, unix_millis};
use keyrace_protocol::{
    FinishReason, LobbySummary, PlayerId, Profile, RoomClosed, RoomCode, RoomSnapshot, RoomStatus,
    ServerEvent,
};
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::content::ContentProvider;
use crate::lobby::{Lobby, Outbox};
use crate::{RoomConfig, RoomError, RoomSettings};

/// Where a room delivers events for one player.
pub type PlayerSender = mpsc::UnboundedSender<ServerEvent>;

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

pub(crate) enum RoomCommand {
    Join {
        player: PlayerId,
        profile: Profile,
        password: Option<String>,
        sender: PlayerSender,
        reply: Reply<RoomSnapshot>,
    },
    Leave {
        player: PlayerId,
        reply: Reply<LeaveOutcome>,
    },
    /// The player's connection dropped; hold their slot.
    Disconnect {
        player: PlayerId,
        reply: Reply<()>,
    },
    Reconnect {
        player: PlayerId,
        sender: PlayerSender,
        reply: Reply<RoomSnapshot>,
    },
    Start {
        player: PlayerId,
        reply: Reply<()>,
    },
    Progress {
        player: PlayerId,
        progress: f64,
        wpm: f64,
        reply: Reply<()>,
    },
    SetReady {
        player: PlayerId,
        ready: bool,
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    Close {
        reason: String,
        reply: oneshot::Sender<()>,
    },
}

/// What happened to the room when a player left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// The last member left and the actor has stopped.
    pub emptied: bool,
}

/// Room metadata for the lobby browser and the sweeper.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub summary: LobbySummary,
    pub status: RoomStatus,
    /// Waiting with a free seat.
    pub is_open: bool,
    /// Time since the last player command.
    pub idle_for: Duration,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Whether both handles reach the same actor.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    /// Adds a player. Returns the snapshot they joined into.
    pub async fn join(
        &self,
        player: PlayerId,
        profile: Profile,
        password: Option<String>,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Join {
            player,
            profile,
            password,
            sender,
            reply,
        })
        .await?
    }

    pub async fn leave(&self, player: PlayerId) -> Result<LeaveOutcome, RoomError> {
        self.request(|reply| RoomCommand::Leave { player, reply })
            .await?
    }

    /// Marks the player dropped and starts their reconnect grace period.
    pub async fn disconnect(&self, player: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Disconnect { player, reply })
            .await?
    }

    /// Reattaches a held player to a new connection.
    pub async fn reconnect(
        &self,
        player: PlayerId,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Reconnect {
            player,
            sender,
            reply,
        })
        .await?
    }

    pub async fn start(&self, player: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Start { player, reply })
            .await?
    }

    pub async fn progress(&self, player: PlayerId, progress: f64, wpm: f64) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Progress {
            player,
            progress,
            wpm,
            reply,
        })
        .await?
    }

    pub async fn set_ready(&self, player: PlayerId, ready: bool) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SetReady {
            player,
            ready,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Info { reply }).await
    }

    /// Tells every member the room is gone, then stops the actor.
    pub async fn close(&self, reason: impl Into<String>) -> Result<(), RoomError> {
        let reason = reason.into();
        self.request(|reply| RoomCommand::Close { reason, reply })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }
}

/// Everything needed to open a room for its host.
pub(crate) struct NewRoom {
    pub code: RoomCode,
    pub settings: RoomSettings,
    pub host: PlayerId,
    pub profile: Profile,
    pub sender: PlayerSender,
}

enum Flow {
    Continue,
    Stop,
}

struct RoomActor {
    lobby: Lobby,
    senders: HashMap<PlayerId, PlayerSender>,
    timer: RoundTimer,
    grace: DeadlineQueue<PlayerId>,
    reconnect_grace: Duration,
    content: Arc<dyn ContentProvider>,
    rng: StdRng,
    last_activity: Instant,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(room_id = %self.lobby.code(), "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if let Flow::Stop = self.handle(cmd) {
                        break;
                    }
                }
                _ = self.timer.expired() => {
                    tracing::debug!(room_id = %self.lobby.code(), "round time is up");
                    let outbox = self.lobby.finish(FinishReason::TimeUp);
                    self.dispatch(outbox);
                }
                player = self.grace.next_expired() => {
                    tracing::info!(room_id = %self.lobby.code(), %player, "reconnect grace expired");
                    if let Flow::Stop = self.remove(player) {
                        break;
                    }
                }
            }
        }

        tracing::info!(room_id = %self.lobby.code(), "room actor stopped");
    }

    fn handle(&mut self, cmd: RoomCommand) -> Flow {
        if !matches!(cmd, RoomCommand::Snapshot { .. } | RoomCommand::Info { .. }) {
            self.last_activity = Instant::now();
        }

        let flow = match cmd {
            RoomCommand::Join {
                player,
                profile,
                password,
                sender,
                reply,
            } => {
                let result = self.lobby.join(player, profile, password.as_deref());
                let result = result.map(|outbox| {
                    self.senders.insert(player, sender);
                    self.dispatch(outbox);
                    self.lobby.snapshot()
                });
                let _ = reply.send(result);
                Flow::Continue
            }
            RoomCommand::Leave { player, reply } => {
                self.grace.cancel(&player);
                self.senders.remove(&player);
                match self.lobby.remove(player) {
                    Ok(removal) => {
                        self.dispatch(removal.outbox);
                        let _ = reply.send(Ok(LeaveOutcome {
                            emptied: removal.emptied,
                        }));
                        if removal.emptied {
                            Flow::Stop
                        } else {
                            Flow::Continue
                        }
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        Flow::Continue
                    }
                }
            }
            RoomCommand::Disconnect { player, reply } => {
                let result = self.lobby.mark_disconnected(player).map(|outbox| {
                    self.senders.remove(&player);
                    self.grace.schedule(player, self.reconnect_grace);
                    self.dispatch(outbox);
                });
                let _ = reply.send(result);
                Flow::Continue
            }
            RoomCommand::Reconnect {
                player,
                sender,
                reply,
            } => {
                let result = self.lobby.mark_reconnected(player).map(|outbox| {
                    self.grace.cancel(&player);
                    self.senders.insert(player, sender);
                    self.dispatch(outbox);
                    self.lobby.snapshot()
                });
                let _ = reply.send(result);
                Flow::Continue
            }
            RoomCommand::Start { player, reply } => {
                let started = self.lobby.start(
                    player,
                    &mut self.rng,
                    self.content.as_ref(),
                    unix_millis(),
                );
                let result = started.map(|(outbox, plan)| {
                    self.timer.arm(plan.time_limit);
                    self.dispatch(outbox);
                });
                let _ = reply.send(result);
                Flow::Continue
            }
            RoomCommand::Progress {
                player,
                progress,
                wpm,
                reply,
            } => {
                let elapsed = self.timer.elapsed().unwrap_or_default();
                let result = self
                    .lobby
                    .record_progress(player, progress, wpm, elapsed)
                    .map(|outbox| self.dispatch(outbox));
                let _ = reply.send(result);
                Flow::Continue
            }
            RoomCommand::SetReady {
                player,
                ready,
                reply,
            } => {
                let result = self
                    .lobby
                    .set_ready(player, ready)
                    .map(|outbox| self.dispatch(outbox));
                let _ = reply.send(result);
                Flow::Continue
            }
            RoomCommand::Close { reason, reply } => {
                tracing::info!(room_id = %self.lobby.code(), %reason, "room closing");
                let closed = ServerEvent::RoomClosed(RoomClosed {
                    room_id: self.lobby.code().clone(),
                    reason,
                });
                for sender in self.senders.values() {
                    let _ = sender.send(closed.clone());
                }
                let _ = reply.send(());
                Flow::Stop
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.lobby.snapshot());
                Flow::Continue
            }
            RoomCommand::Info { reply } => {
                let _ = reply.send(self.info());
                Flow::Continue
            }
        };

        self.sync_timer();
        flow
    }

    /// Drops a held player whose grace ran out.
    fn remove(&mut self, player: PlayerId) -> Flow {
        self.senders.remove(&player);
        let flow = match self.lobby.remove(player) {
            Ok(removal) => {
                self.dispatch(removal.outbox);
                if removal.emptied {
                    Flow::Stop
                } else {
                    Flow::Continue
                }
            }
            Err(e) => {
                tracing::debug!(room_id = %self.lobby.code(), %player, error = %e, "expired player already gone");
                Flow::Continue
            }
        };
        self.sync_timer();
        flow
    }

    /// The timer runs exactly while a round does.
    fn sync_timer(&mut self) {
        if !self.lobby.round_active() {
            self.timer.cancel();
        }
    }

    fn dispatch(&self, outbox: Outbox) {
        for (recipient, event) in outbox {
            for (player, sender) in &self.senders {
                if recipient.includes(*player) {
                    let _ = sender.send(event.clone());
                }
            }
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            summary: self.lobby.summary(),
            status: self.lobby.status(),
            is_open: self.lobby.is_open(),
            idle_for: self.last_activity.elapsed(),
        }
    }
}

/// Spawns a room with its host already seated.
///
/// The host's `lobby_created` event is queued before the actor starts,
/// so it always precedes anything the room broadcasts later.
pub(crate) fn spawn_room(
    room: NewRoom,
    config: &RoomConfig,
    content: Arc<dyn ContentProvider>,
    rng: StdRng,
) -> (RoomHandle, RoomSnapshot) {
    let (tx, rx) = mpsc::channel(config.channel_size);
    let lobby = Lobby::new(room.code.clone(), room.settings, room.host, room.profile);
    let snapshot = lobby.snapshot();
    let _ = room.sender.send(ServerEvent::LobbyCreated(snapshot.clone()));

    let actor = RoomActor {
        lobby,
        senders: HashMap::from([(room.host, room.sender)]),
        timer: RoundTimer::new(),
        grace: DeadlineQueue::new(),
        reconnect_grace: config.reconnect_grace,
        content,
        rng,
        last_activity: Instant::now(),
        receiver: rx,
    };
    tokio::spawn(actor.run());

    (
        RoomHandle {
            code: room.code,
            sender: tx,
        },
        snapshot,
    )
}
