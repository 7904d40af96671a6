//! Transport seam for the Theater core.
//!
//! The core never touches bytes. A transport library decodes the
//! tag-value packets and hands over [`Command`]s through these traits:
//!
//! - [`Listener`]: accepts TCP/TLS control connections.
//! - [`Connection`]: per-connection read/write of decoded commands.
//! - [`DatagramSocket`]: UDP heartbeats with the sender's address.
//!
//! # Feature Flags
//!
//! - `memory` (default): channel-backed implementations for embedding
//!   and tests, see [`memory`].

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use theater_protocol::Command;

mod error;
#[cfg(feature = "memory")]
pub mod memory;

pub use error::TransportError;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming control connections.
pub trait Listener: Send + 'static {
    /// The connection type produced by this listener.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single control connection carrying decoded commands.
pub trait Connection: Send + Sync + 'static {
    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The address the peer connected from, as observed by the socket.
    fn peer_addr(&self) -> SocketAddr;

    /// Sends one command to the peer.
    fn send(
        &self,
        command: &Command,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next command from the peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed. Must be
    /// cancel-safe: the session loop races it against its timers.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Command>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A UDP socket exchanging decoded commands.
pub trait DatagramSocket: Send + Sync + 'static {
    /// Receives the next datagram and the address it came from.
    ///
    /// Returns `Ok(None)` once the socket is shut down.
    fn recv_from(
        &self,
    ) -> impl Future<Output = Result<Option<(Command, SocketAddr)>, TransportError>> + Send;

    /// Sends a command to `addr`.
    fn send_to(
        &self,
        command: &Command,
        addr: SocketAddr,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
