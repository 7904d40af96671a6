/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed by the peer or locally.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing a command failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading the next command failed (decode error, reset, ...).
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Accepting a new connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
