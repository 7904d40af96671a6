//! Error types for the session layer.

use theater_transport::ConnectionId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session is registered for the connection. Either it never
    /// connected or it has already been released.
    #[error("no session for {0}")]
    NotFound(ConnectionId),

    /// A session for this connection already exists.
    #[error("session for {0} already registered")]
    AlreadyRegistered(ConnectionId),

    /// The session is closing; state changes are refused.
    #[error("session {0} is no longer active")]
    Inactive(ConnectionId),
}
