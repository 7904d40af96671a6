//! # Theater
//!
//! Session and matchmaking core for the Theater lobby protocol.
//!
//! Game servers connect and register lobbies; clients connect, list
//! them, and ask to join. The core runs the handshake in between:
//! it asks the owning server to admit the player (`EGRQ`) and then
//! tells the client where to connect (`EGEG`), one join per lobby at a
//! time. A UDP loop answers `ECHO` heartbeats.
//!
//! Wire encoding is not handled here. A transport hands over decoded
//! [`Command`](prelude::Command)s through the
//! [`Listener`](prelude::Listener) and
//! [`DatagramSocket`](prelude::DatagramSocket) traits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use theater::prelude::*;
//!
//! # async fn start() -> Result<(), TheaterError> {
//! let config = TheaterConfig::from_json(r#"{ "log_filter": "info" }"#)?;
//! theater::init_logging(&config.log_filter);
//!
//! let (listener, _connector) = theater::transport::memory::listener();
//! let (socket, _network) = theater::transport::memory::datagram_pair();
//!
//! let server = TheaterServer::<MemoryDurableStore>::builder()
//!     .config(config)
//!     .build(Arc::new(MemoryDurableStore::new()));
//! tokio::spawn(server.clone().run_echo(socket));
//! server.run(listener).await
//! # }
//! ```

mod config;
mod connection;
mod dispatcher;
mod error;
mod handlers;
mod logging;
pub mod messages;
mod server;

pub use config::{DEFAULT_LOG_FILTER, TheaterConfig};
pub use error::TheaterError;
pub use logging::init_logging;
pub use server::{TheaterServer, TheaterServerBuilder};

pub use theater_lobby as lobby;
pub use theater_protocol as protocol;
pub use theater_session as session;
pub use theater_store as store;
pub use theater_timer as timer;
pub use theater_transport as transport;

/// Common imports for embedding the server.
pub mod prelude {
    pub use crate::{TheaterConfig, TheaterError, TheaterServer, TheaterServerBuilder};
    pub use theater_lobby::{IdentityPolicy, JoinConfig, JoinState, LobbyConfig};
    pub use theater_protocol::{AccountId, Command, Fields, Identity, LobbyId, Op, PlayerId};
    pub use theater_session::SessionConfig;
    pub use theater_store::{DurableStore, KvStore, MemoryDurableStore, MemoryKv};
    pub use theater_transport::{Connection, ConnectionId, DatagramSocket, Listener};
}
