//! Channel-backed transport for embedding and tests.
//!
//! A [`MemoryConnector`] plays the role of the network: every
//! [`connect`](MemoryConnector::connect) yields a [`MemoryPeer`] for the
//! remote side and queues the matching [`MemoryConnection`] on the
//! [`MemoryListener`]. Dropping or [`close`](MemoryPeer::close)-ing the
//! peer looks like a clean disconnect to the server side.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use theater_protocol::Command;
use tokio::sync::{Mutex, mpsc};

use crate::{Connection, ConnectionId, DatagramSocket, Listener, TransportError};

/// Creates a connected listener/connector pair.
pub fn listener() -> (MemoryListener, MemoryConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryListener { incoming: rx },
        MemoryConnector {
            incoming: tx,
            next_id: Arc::new(AtomicU64::new(1)),
        },
    )
}

/// Server side: yields connections opened through the connector.
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<MemoryConnection>,
}

impl Listener for MemoryListener {
    type Connection = MemoryConnection;

    async fn accept(&mut self) -> Result<MemoryConnection, TransportError> {
        self.incoming.recv().await.ok_or(TransportError::Shutdown)
    }
}

/// Opens in-memory connections to a [`MemoryListener`].
#[derive(Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<MemoryConnection>,
    next_id: Arc<AtomicU64>,
}

impl MemoryConnector {
    /// Opens a connection that appears to come from `peer_addr`.
    pub fn connect(&self, peer_addr: SocketAddr) -> Result<MemoryPeer, TransportError> {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (to_server, server_inbound) = mpsc::unbounded_channel();
        let (server_outbound, from_server) = mpsc::unbounded_channel();

        let conn = MemoryConnection {
            id,
            peer_addr,
            inbound: Mutex::new(server_inbound),
            outbound: server_outbound,
            closed: AtomicBool::new(false),
        };
        self.incoming
            .send(conn)
            .map_err(|_| TransportError::Shutdown)?;

        tracing::debug!(%id, %peer_addr, "memory connection opened");
        Ok(MemoryPeer {
            id,
            to_server: Some(to_server),
            from_server,
        })
    }
}

/// The server's end of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    inbound: Mutex<mpsc::UnboundedReceiver<Command>>,
    outbound: mpsc::UnboundedSender<Command>,
    closed: AtomicBool,
}

impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    async fn send(&self, command: &Command) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        self.outbound.send(command.clone()).map_err(|_| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer went away",
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Command>, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        self.inbound.lock().await.close();
        Ok(())
    }
}

/// The remote end of an in-memory connection (a game client or server).
pub struct MemoryPeer {
    id: ConnectionId,
    to_server: Option<mpsc::UnboundedSender<Command>>,
    from_server: mpsc::UnboundedReceiver<Command>,
}

impl MemoryPeer {
    /// Id the server side sees for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Sends a command to the server.
    pub fn send(&self, command: Command) -> Result<(), TransportError> {
        self.to_server
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionClosed(self.id.to_string()))?
            .send(command)
            .map_err(|_| TransportError::ConnectionClosed(self.id.to_string()))
    }

    /// Waits for the next command from the server. `None` once the
    /// server side has gone away.
    pub async fn recv(&mut self) -> Option<Command> {
        self.from_server.recv().await
    }

    /// Returns an already-delivered command without waiting.
    pub fn try_recv(&mut self) -> Option<Command> {
        self.from_server.try_recv().ok()
    }

    /// Hangs up. The server sees a clean close.
    pub fn close(&mut self) {
        self.to_server = None;
    }
}

// ---------------------------------------------------------------------------
// Datagrams
// ---------------------------------------------------------------------------

/// Creates a datagram socket and the handle that feeds it.
pub fn datagram_pair() -> (MemoryDatagramSocket, MemoryDatagramPeer) {
    let (to_socket, socket_inbound) = mpsc::unbounded_channel();
    let (socket_outbound, from_socket) = mpsc::unbounded_channel();
    (
        MemoryDatagramSocket {
            inbound: Mutex::new(socket_inbound),
            outbound: socket_outbound,
        },
        MemoryDatagramPeer {
            to_socket: Some(to_socket),
            from_socket,
        },
    )
}

/// Server side of an in-memory UDP socket.
pub struct MemoryDatagramSocket {
    inbound: Mutex<mpsc::UnboundedReceiver<(Command, SocketAddr)>>,
    outbound: mpsc::UnboundedSender<(Command, SocketAddr)>,
}

impl DatagramSocket for MemoryDatagramSocket {
    async fn recv_from(&self) -> Result<Option<(Command, SocketAddr)>, TransportError> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn send_to(&self, command: &Command, addr: SocketAddr) -> Result<(), TransportError> {
        self.outbound
            .send((command.clone(), addr))
            .map_err(|_| TransportError::Shutdown)
    }
}

/// The "network" side of a [`MemoryDatagramSocket`].
pub struct MemoryDatagramPeer {
    to_socket: Option<mpsc::UnboundedSender<(Command, SocketAddr)>>,
    from_socket: mpsc::UnboundedReceiver<(Command, SocketAddr)>,
}

impl MemoryDatagramPeer {
    /// Delivers `command` to the socket as if it came from `from`.
    pub fn send_from(&self, command: Command, from: SocketAddr) -> Result<(), TransportError> {
        self.to_socket
            .as_ref()
            .ok_or(TransportError::Shutdown)?
            .send((command, from))
            .map_err(|_| TransportError::Shutdown)
    }

    /// Waits for the next datagram the socket sent, with its destination.
    pub async fn recv(&mut self) -> Option<(Command, SocketAddr)> {
        self.from_socket.recv().await
    }

    /// Stops feeding the socket; its `recv_from` then yields `None`.
    pub fn shutdown(&mut self) {
        self.to_socket = None;
    }
}
