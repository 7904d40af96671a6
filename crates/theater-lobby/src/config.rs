//! Lobby and join configuration.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LobbyConfig
// ---------------------------------------------------------------------------

/// Constants the registry advertises to game servers and clients.
///
/// The credential fields (`ekey`, `secret`, `ugid`) are handed to the
/// server on create and to the client on enter-game so both sides can
/// authenticate the rendezvous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// `MAX-PLAYERS` returned on create, and the `MP` fallback.
    pub max_players: u32,

    pub ekey: String,
    pub secret: String,
    pub ugid: String,

    /// The well-known lobby group every game belongs to (`LID`).
    pub lobby_group_id: u64,
    /// Lobby group name advertised in `LDAT`.
    pub lobby_group_name: String,
    pub locale: String,
    pub max_games: u32,

    /// Platform tag sent in enter-game (`PL`).
    pub platform: String,
    /// Game version, the `V` fallback.
    pub version: String,

    /// Rendezvous host used only when a lobby record has no address.
    pub default_host: String,
    /// Rendezvous port used only when a lobby record has no port.
    pub default_port: u16,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            max_players: 16,
            ekey: "O65zZ2D2A58mNrZw1hmuJw%3d%3d".into(),
            secret: "2587913".into(),
            ugid: "7eb6155c-ac70-4567-9fc4-732d56a9334a".into(),
            lobby_group_id: 1,
            lobby_group_name: "bfwestPC02".into(),
            locale: "en_US".into(),
            max_games: 10_000,
            platform: "pc".into(),
            version: "1.02.1067.0".into(),
            default_host: "127.0.0.1".into(),
            default_port: 18569,
        }
    }
}

// ---------------------------------------------------------------------------
// JoinConfig
// ---------------------------------------------------------------------------

/// What to do when a joining player's identity can't be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdentityPolicy {
    /// Continue with an empty nickname and player id 0.
    #[default]
    ProceedPartial,
    /// Acknowledge the request but abort the join before the server is
    /// contacted.
    FailJoin,
}

/// Join handshake behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// When `true`, the client only gets its enter-game once the server
    /// has answered the request-join (`EGRS`). When `false` the client
    /// is told on its first poll after the server was asked.
    pub require_server_ack: bool,

    pub identity_policy: IdentityPolicy,
}

impl JoinConfig {
    /// Builder: strict acknowledgement mode.
    pub fn with_server_ack(mut self) -> Self {
        self.require_server_ack = true;
        self
    }

    /// Builder: identity failure policy.
    pub fn with_identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.identity_policy = policy;
        self
    }
}
