//! Per-connection gateway: decodes client events, routes them to rooms,
//! and forwards room events back to the socket.
//!
//! Each accepted connection gets its own task running
//! [`handle_connection`]. The flow is:
//!   1. Create a session and send `connected` (with a resume token when
//!      reconnect grace is enabled)
//!   2. Loop: read frames and handle each command to completion before
//!      reading the next; meanwhile flush room events to the socket and
//!      ping the client every half idle timeout
//!   3. On close, error, or idle timeout: always issue a disconnect so
//!      the room sees the player leave
//!
//! Any frame counts as activity, pongs included, so a browser that only
//! sends game events still stays connected while it waits.

use std::sync::Arc;

use keyrace_clock::unix_millis;
use keyrace_protocol::{
    ClientEvent, Codec, Connected, CreateLobby, ErrorCode, JoinLobby, LobbyList, Ping, PlayerId,
    Pong, Profile, ResumeSession, RoomCode, RoomRef, ServerEvent, SetReady, UpdateProgress,
};
use keyrace_room::{RoomError, RoomHandle, RoomSettings};
use keyrace_session::{Departure, ProfileProvider, SessionError};
use keyrace_transport::{Connection, Frame, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval, sleep_until};

use crate::KeyraceError;
use crate::server::ServerState;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<P, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<P, C>>,
) -> Result<(), KeyraceError>
where
    P: ProfileProvider,
    C: Codec,
{
    let conn_id = conn.id();
    let player = PlayerId(conn_id.into_inner());
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let token = {
        let mut sessions = state.sessions.lock().await;
        let allows_resume = sessions.config().allows_resume();
        let session = sessions.create(player, Profile::default())?;
        allows_resume.then(|| session.resume_token.clone())
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut gateway = Gateway {
        state: Arc::clone(&state),
        player,
        tx,
    };
    gateway.send(ServerEvent::Connected(Connected {
        connection_id: player,
        resume_token: token,
        server_time: unix_millis(),
    }));

    let result = gateway.serve(&conn, &mut rx).await;

    gateway.disconnect().await;
    let _ = conn.close().await;
    tracing::info!(%conn_id, player = %gateway.player, "connection closed");
    result
}

/// One connection's view of the server.
struct Gateway<P: ProfileProvider, C: Codec> {
    state: Arc<ServerState<P, C>>,
    /// Changes when the connection resumes an earlier session.
    player: PlayerId,
    /// Every event for this client goes through here, so replies and
    /// broadcasts reach the socket in the order they were produced.
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl<P: ProfileProvider, C: Codec> Gateway<P, C> {
    async fn serve(
        &mut self,
        conn: &WebSocketConnection,
        rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Result<(), KeyraceError> {
        let idle_timeout = self.state.config.idle_timeout;
        let mut idle_deadline = Instant::now() + idle_timeout;
        let mut heartbeat = interval((idle_timeout / 2).max(Duration::from_millis(1)));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                frame = conn.recv() => match frame {
                    Ok(Some(Frame::Data(data))) => {
                        idle_deadline = Instant::now() + idle_timeout;
                        self.handle_frame(&data).await;
                    }
                    Ok(Some(Frame::Heartbeat)) => {
                        tracing::trace!(player = %self.player, "heartbeat");
                        idle_deadline = Instant::now() + idle_timeout;
                    }
                    Ok(None) => {
                        tracing::debug!(player = %self.player, "client closed the connection");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                },
                Some(event) = rx.recv() => {
                    if let ServerEvent::RoomClosed(closed) = &event {
                        self.state
                            .sessions
                            .lock()
                            .await
                            .unbind_room_if(self.player, &closed.room_id);
                    }
                    let bytes = self.state.codec.encode(&event)?;
                    conn.send(&bytes).await?;
                }
                _ = heartbeat.tick() => {
                    conn.ping().await?;
                }
                () = sleep_until(idle_deadline) => {
                    tracing::info!(player = %self.player, "connection idle, closing");
                    return Ok(());
                }
            }
        }
    }

    async fn handle_frame(&mut self, data: &[u8]) {
        let event: ClientEvent = match self.state.codec.decode(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(player = %self.player, error = %e, "undecodable frame");
                self.send(ServerEvent::error(
                    ErrorCode::MalformedMessage,
                    format!("could not decode event: {e}"),
                ));
                return;
            }
        };

        let name = event.name();
        if let Err(e) = self.dispatch(event).await {
            tracing::debug!(player = %self.player, event = name, error = %e, "command rejected");
            self.send(ServerEvent::error(e.code(), e.to_string()));
        }
    }

    async fn dispatch(&mut self, event: ClientEvent) -> Result<(), KeyraceError> {
        match event {
            ClientEvent::CreateLobby(create) => self.create_lobby(create).await,
            ClientEvent::JoinLobby(join) => self.join_lobby(join).await,
            ClientEvent::StartGame(RoomRef { room_id }) => {
                self.member_room(&room_id).await?.start(self.player).await?;
                Ok(())
            }
            ClientEvent::UpdateProgress(UpdateProgress {
                room_id,
                progress,
                wpm,
            }) => {
                self.member_room(&room_id)
                    .await?
                    .progress(self.player, progress, wpm)
                    .await?;
                Ok(())
            }
            ClientEvent::SetReady(SetReady { room_id, ready }) => {
                self.member_room(&room_id)
                    .await?
                    .set_ready(self.player, ready)
                    .await?;
                Ok(())
            }
            ClientEvent::LeaveLobby(RoomRef { room_id }) => self.leave_lobby(room_id).await,
            ClientEvent::ListLobbies => {
                let lobbies = self.state.registry.list_open().await;
                self.send(ServerEvent::LobbyList(LobbyList { lobbies }));
                Ok(())
            }
            ClientEvent::ResumeSession(ResumeSession { token }) => self.resume(&token).await,
            ClientEvent::Ping(Ping { client_time }) => {
                self.send(ServerEvent::Pong(Pong {
                    client_time,
                    server_time: unix_millis(),
                }));
                Ok(())
            }
        }
    }

    async fn create_lobby(&mut self, create: CreateLobby) -> Result<(), KeyraceError> {
        self.ensure_roomless().await?;
        let settings = RoomSettings::from_request(&create.mode, create.max_players, create.password)?;
        let profile = self
            .resolve_profile(Profile {
                username: create.username,
                avatar: create.avatar,
                theme: create.theme,
            })
            .await?;

        let snapshot = self
            .state
            .registry
            .create_room(settings, self.player, profile, self.tx.clone())
            .await?;
        self.state
            .sessions
            .lock()
            .await
            .bind_room(self.player, snapshot.room_id)?;
        Ok(())
    }

    async fn join_lobby(&mut self, join: JoinLobby) -> Result<(), KeyraceError> {
        self.ensure_roomless().await?;
        let profile = self
            .resolve_profile(Profile {
                username: join.username,
                avatar: join.avatar,
                theme: join.theme,
            })
            .await?;

        let snapshot = self
            .state
            .registry
            .add_player(&join.room_id, self.player, profile, join.password, self.tx.clone())
            .await?;
        self.state
            .sessions
            .lock()
            .await
            .bind_room(self.player, snapshot.room_id)?;
        Ok(())
    }

    async fn leave_lobby(&mut self, room_id: RoomCode) -> Result<(), KeyraceError> {
        self.member_room(&room_id).await?;
        let result = self.state.registry.remove_player(&room_id, self.player).await;
        self.state
            .sessions
            .lock()
            .await
            .unbind_room_if(self.player, &room_id);
        match result {
            // The room vanished underneath us; the player is out either way.
            Ok(_) | Err(RoomError::NotFound(_)) => {
                self.send(ServerEvent::LeftLobby(RoomRef { room_id }));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Moves this connection onto a held session and back into its room.
    async fn resume(&mut self, token: &str) -> Result<(), KeyraceError> {
        self.ensure_roomless().await?;

        let (previous, room) = {
            let mut sessions = self.state.sessions.lock().await;
            let session = sessions.reconnect(token)?;
            let previous = session.player_id;
            match session.room.clone() {
                Some(room) => (previous, room),
                None => {
                    sessions.remove(previous);
                    return Err(SessionError::SessionExpired(previous).into());
                }
            }
        };

        match self
            .state
            .registry
            .reconnect_player(&room, previous, self.tx.clone())
            .await
        {
            Ok(_) => {
                let mut sessions = self.state.sessions.lock().await;
                sessions.remove(self.player);
                tracing::info!(from = %self.player, to = %previous, room_id = %room, "connection resumed session");
                self.player = previous;
                Ok(())
            }
            Err(e) => {
                tracing::debug!(player = %previous, room_id = %room, error = %e, "resume failed, room slot gone");
                self.state.sessions.lock().await.remove(previous);
                Err(SessionError::SessionExpired(previous).into())
            }
        }
    }

    /// Issued on every teardown: the room sees a leave, or a held slot
    /// when reconnect grace is enabled.
    async fn disconnect(&mut self) {
        let departure = self.state.sessions.lock().await.disconnect(self.player);
        let result = match departure {
            Ok(Departure::Held { room }) => {
                self.state
                    .registry
                    .disconnect_player(&room, self.player)
                    .await
            }
            Ok(Departure::Removed { room: Some(room) }) => self
                .state
                .registry
                .remove_player(&room, self.player)
                .await
                .map(|_| ()),
            Ok(Departure::Removed { room: None }) => Ok(()),
            Err(e) => {
                tracing::debug!(player = %self.player, error = %e, "no session to disconnect");
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::debug!(player = %self.player, error = %e, "room already gone at disconnect");
        }
    }

    /// The room handle for `room_id`, if this player is bound to it.
    async fn member_room(&self, room_id: &RoomCode) -> Result<RoomHandle, KeyraceError> {
        let bound = self.state.sessions.lock().await.room_of(self.player).cloned();
        if bound.as_ref() != Some(room_id) {
            return Err(RoomError::NotInRoom(self.player, room_id.clone()).into());
        }
        Ok(self.state.registry.handle(room_id).await?)
    }

    async fn ensure_roomless(&self) -> Result<(), KeyraceError> {
        match self.state.sessions.lock().await.room_of(self.player) {
            Some(room) => Err(RoomError::AlreadyInRoom(self.player, room.clone()).into()),
            None => Ok(()),
        }
    }

    async fn resolve_profile(&self, claimed: Profile) -> Result<Profile, KeyraceError> {
        let profile = self.state.profiles.resolve(self.player, claimed).await?;
        self.state
            .sessions
            .lock()
            .await
            .set_profile(self.player, profile.clone())?;
        Ok(profile)
    }

    fn send(&self, event: ServerEvent) {
        // The receiver lives as long as the connection task.
        let _ = self.tx.send(event);
    }
}
