//! `TheaterServer` builder and server loops.
//!
//! This is the entry point for running the Theater core. It ties
//! together all the layers: transport → protocol → session → lobby.
//! The transport is supplied by the caller; the server only sees
//! decoded commands.

use std::net::SocketAddr;
use std::sync::Arc;

use theater_lobby::{JoinOrchestrator, LobbyRegistry};
use theater_protocol::{Command, Op};
use theater_session::{SessionConfig, SessionManager};
use theater_store::{DurableStore, KvStore, MemoryKv};
use theater_transport::{ConnectionId, DatagramSocket, Listener, TransportError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::connection::handle_connection;
use crate::{TheaterConfig, TheaterError};

/// Shared server state passed to each connection task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// registry and orchestrator serialize per lobby on their own; only
/// the session table needs the mutex.
pub(crate) struct ServerState<D> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) registry: Arc<LobbyRegistry<D>>,
    pub(crate) orchestrator: JoinOrchestrator<D>,
    pub(crate) config: TheaterConfig,
}

impl<D: DurableStore> ServerState<D> {
    pub(crate) fn new(config: TheaterConfig, kv: Arc<dyn KvStore>, durable: Arc<D>) -> Self {
        let registry = Arc::new(LobbyRegistry::new(kv, durable, config.lobby.clone()));
        let orchestrator = JoinOrchestrator::new(Arc::clone(&registry), config.join.clone());
        Self {
            sessions: Mutex::new(SessionManager::new()),
            registry,
            orchestrator,
            config,
        }
    }

    pub(crate) async fn is_active(&self, conn_id: &ConnectionId) -> bool {
        self.sessions.lock().await.is_active(conn_id)
    }
}

/// Builder for configuring a Theater server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use theater::prelude::*;
///
/// # async fn run() -> Result<(), TheaterError> {
/// let (listener, _connector) = theater::transport::memory::listener();
/// let server = TheaterServer::<MemoryDurableStore>::builder()
///     .config(TheaterConfig::default())
///     .build(Arc::new(MemoryDurableStore::new()));
/// server.run(listener).await
/// # }
/// ```
pub struct TheaterServerBuilder {
    config: TheaterConfig,
    kv: Option<Arc<dyn KvStore>>,
}

impl TheaterServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: TheaterConfig::default(),
            kv: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: TheaterConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Uses `kv` as the shared key-value store. Defaults to a fresh
    /// in-process [`MemoryKv`].
    pub fn kv_store(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Builds the server around `durable`.
    pub fn build<D: DurableStore>(self, durable: Arc<D>) -> TheaterServer<D> {
        let kv = self.kv.unwrap_or_else(|| Arc::new(MemoryKv::new()));
        TheaterServer {
            state: Arc::new(ServerState::new(self.config, kv, durable)),
        }
    }
}

impl Default for TheaterServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Theater server.
///
/// Cloning is cheap and every clone shares the same state, so one clone
/// can run the TCP loop while another runs the UDP echo loop.
pub struct TheaterServer<D> {
    state: Arc<ServerState<D>>,
}

impl<D> Clone for TheaterServer<D> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<D: DurableStore> TheaterServer<D> {
    /// Creates a new builder.
    pub fn builder() -> TheaterServerBuilder {
        TheaterServerBuilder::new()
    }

    pub fn config(&self) -> &TheaterConfig {
        &self.state.config
    }

    /// The game registry, for inspection by the embedding process.
    pub fn registry(&self) -> &Arc<LobbyRegistry<D>> {
        &self.state.registry
    }

    /// The join orchestrator, for inspection by the embedding process.
    pub fn orchestrator(&self) -> &JoinOrchestrator<D> {
        &self.state.orchestrator
    }

    /// Number of sessions currently registered, closing ones included.
    pub async fn session_count(&self) -> usize {
        self.state.sessions.lock().await.len()
    }

    /// Runs the control-connection accept loop.
    ///
    /// Spawns one task per accepted connection. Returns when the
    /// listener shuts down; other accept errors are logged and the
    /// loop keeps going.
    pub async fn run<L: Listener>(self, mut listener: L) -> Result<(), TheaterError> {
        info!("theater server running");

        loop {
            match listener.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(TransportError::Shutdown) => {
                    info!("listener shut down, accept loop stopped");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }

    /// Runs the stateless UDP heartbeat loop.
    ///
    /// Every `ECHO` datagram is answered with its `TID`/`TXN` and the
    /// address it was observed from. Anything else is ignored. Returns
    /// when the socket shuts down.
    pub async fn run_echo<S: DatagramSocket>(self, socket: S) -> Result<(), TheaterError> {
        info!("udp echo running");

        loop {
            let (command, from) = match socket.recv_from().await {
                Ok(Some(datagram)) => datagram,
                Ok(None) => {
                    info!("udp socket shut down, echo loop stopped");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "udp receive failed");
                    continue;
                }
            };

            if command.op != Op::Echo {
                debug!(op = %command.op, %from, "ignoring non-echo datagram");
                continue;
            }

            let reply = echo_reply(&command, from);
            if let Err(e) = socket.send_to(&reply, from).await {
                warn!(error = %e, %from, "udp echo reply failed");
            }
        }
    }
}

fn echo_reply(request: &Command, from: SocketAddr) -> Command {
    request
        .reply()
        .echo(request, "TXN")
        .with("IP", from.ip().to_string())
        .with("PORT", from.port().to_string())
        .with("ERR", "0")
        .with("TYPE", "1")
}
