//! Error types for the lobby layer.

use theater_protocol::LobbyId;
use theater_store::StoreError;
use theater_transport::ConnectionId;

/// Errors that can occur during registry and join operations.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The lobby does not exist.
    #[error("lobby {0} not found")]
    NotFound(LobbyId),

    /// A session tried to update a lobby it doesn't own.
    #[error("{conn_id} does not own lobby {lobby_id}")]
    NotOwner {
        lobby_id: LobbyId,
        conn_id: ConnectionId,
    },

    /// The counter handed out an id that already has a record. The
    /// record is left untouched.
    #[error("lobby id {0} already in use")]
    IdCollision(LobbyId),

    /// A client asked to join but no lobby with a live owner exists.
    #[error("no lobby available to join")]
    NoLobbyAvailable,

    /// The shared store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
