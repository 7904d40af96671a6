//! Unified error type for the Theater server.

use theater_lobby::LobbyError;
use theater_protocol::ProtocolError;
use theater_session::SessionError;
use theater_store::StoreError;
use theater_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TheaterError {
    /// A transport-level error (accept, send, recv). Ends the session
    /// it happened on.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A command was missing a field or carried a malformed one.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (unknown, duplicate or closing session).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A registry or join error (unknown lobby, not the owner).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// A shared or durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configuration document could not be read.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl TheaterError {
    /// Only transport failures are fatal to a session. Everything else
    /// costs the one command that caused it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TheaterError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use theater_protocol::LobbyId;
    use theater_transport::ConnectionId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let theater_err: TheaterError = err.into();
        assert!(matches!(theater_err, TheaterError::Transport(_)));
        assert!(theater_err.to_string().contains("gone"));
        assert!(theater_err.is_fatal());
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::MissingField {
            op: "EGAM".into(),
            field: "R-U-accid".into(),
        };
        let theater_err: TheaterError = err.into();
        assert!(matches!(theater_err, TheaterError::Protocol(_)));
        assert!(!theater_err.is_fatal());
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::Inactive(ConnectionId::new(3));
        let theater_err: TheaterError = err.into();
        assert!(matches!(theater_err, TheaterError::Session(_)));
    }

    #[test]
    fn test_from_lobby_error() {
        let err = LobbyError::NotFound(LobbyId(9));
        let theater_err: TheaterError = err.into();
        assert!(matches!(theater_err, TheaterError::Lobby(_)));
        assert!(theater_err.to_string().contains('9'));
    }

    #[test]
    fn test_from_store_error() {
        let err = StoreError::Unavailable("redis down".into());
        let theater_err: TheaterError = err.into();
        assert!(matches!(theater_err, TheaterError::Store(_)));
        assert!(!theater_err.is_fatal());
    }
}
