//! Server-wide configuration.

use serde::{Deserialize, Serialize};
use theater_lobby::{JoinConfig, LobbyConfig};
use theater_session::SessionConfig;

use crate::TheaterError;

/// Default `tracing` filter when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Everything a [`TheaterServer`](crate::TheaterServer) needs to know.
///
/// Every section falls back to its defaults, so `{}` is a valid
/// document:
///
/// ```
/// let config = theater::TheaterConfig::from_json(r#"{
///     "session": { "heartbeat_interval_secs": 5 },
///     "join": { "require_server_ack": true }
/// }"#).unwrap();
/// assert_eq!(config.session.heartbeat_interval_secs, 5);
/// assert_eq!(config.lobby.max_players, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TheaterConfig {
    pub session: SessionConfig,
    pub lobby: LobbyConfig,
    pub join: JoinConfig,
    /// `EnvFilter` directives, e.g. `"info,theater_lobby=debug"`.
    pub log_filter: String,
}

impl Default for TheaterConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            lobby: LobbyConfig::default(),
            join: JoinConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl TheaterConfig {
    /// Reads a JSON document.
    pub fn from_json(json: &str) -> Result<Self, TheaterError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builder: replaces the session section.
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Builder: replaces the lobby section.
    pub fn with_lobby(mut self, lobby: LobbyConfig) -> Self {
        self.lobby = lobby;
        self
    }

    /// Builder: replaces the join section.
    pub fn with_join(mut self, join: JoinConfig) -> Self {
        self.join = join;
        self
    }

    /// Builder: sets the log filter.
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }
}
