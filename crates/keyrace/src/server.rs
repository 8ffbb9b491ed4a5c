//! `KeyraceServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → gateway → rooms.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keyrace_protocol::{Codec, JsonCodec};
use keyrace_room::{ContentProvider, ParagraphBank, RoomRegistry};
use keyrace_session::{GuestProfiles, ProfileProvider, SessionManager};
use keyrace_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::gateway::handle_connection;
use crate::sweeper::spawn_sweeper;
use crate::{KeyraceError, ServerConfig};

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<P: ProfileProvider, C: Codec> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) registry: RoomRegistry,
    pub(crate) profiles: P,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Keyrace server.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use keyrace::prelude::*;
///
/// # async fn run() -> Result<(), KeyraceError> {
/// let server = KeyraceServer::builder()
///     .bind("0.0.0.0:8080")
///     .reconnect_grace(Duration::from_secs(20))
///     .build(GuestProfiles::default())
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct KeyraceServerBuilder {
    config: ServerConfig,
    content: Arc<dyn ContentProvider>,
}

impl KeyraceServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            content: Arc::new(ParagraphBank::default()),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn reconnect_grace(mut self, grace: Duration) -> Self {
        self.config.reconnect_grace = grace;
        self
    }

    pub fn room_ttl(mut self, ttl: Duration) -> Self {
        self.config.room_ttl = ttl;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Sets where round passages come from.
    pub fn content(mut self, content: impl ContentProvider) -> Self {
        self.content = Arc::new(content);
        self
    }

    /// Binds the listener and assembles the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`, which is what browser
    /// clients speak.
    pub async fn build<P: ProfileProvider>(
        self,
        profiles: P,
    ) -> Result<KeyraceServer<P, JsonCodec>, KeyraceError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.config.session_config())),
            registry: RoomRegistry::new(self.config.room_config(), self.content),
            profiles,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(KeyraceServer { transport, state })
    }
}

impl Default for KeyraceServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Keyrace server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct KeyraceServer<P: ProfileProvider, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<P, C>>,
}

impl KeyraceServer<GuestProfiles, JsonCodec> {
    /// Starts configuring a server. The profile provider is chosen at
    /// [`build`](KeyraceServerBuilder::build).
    pub fn builder() -> KeyraceServerBuilder {
        KeyraceServerBuilder::new()
    }
}

impl<P, C> KeyraceServer<P, C>
where
    P: ProfileProvider,
    C: Codec,
{
    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, KeyraceError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Accepts connections until the process is terminated.
    pub async fn run(self) -> Result<(), KeyraceError> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves, then closes every
    /// room so connected players are told why.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), KeyraceError> {
        tracing::info!(
            bind = %self.state.config.bind_addr,
            reconnect_grace_s = self.state.config.reconnect_grace.as_secs(),
            "Keyrace server running"
        );
        let sweeper = spawn_sweeper(Arc::clone(&self.state));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!("shutting down");
        sweeper.abort();
        self.state.registry.close_all("server shutting down").await;
        Ok(())
    }
}
