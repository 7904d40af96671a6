//! Lobby records as stored in the shared key-value store.
//!
//! A record is the flat attribute map a game server registered, plus a
//! few keys the registry derives itself. [`LobbyRecord`] is a typed view
//! over that map; the map stays the stored form.

use std::str::FromStr;

use theater_protocol::{Fields, LobbyId};

/// Record field names.
pub mod keys {
    pub const GID: &str = "GID";
    pub const LID: &str = "LID";
    pub const IP: &str = "IP";
    pub const PORT: &str = "PORT";
    pub const INT_IP: &str = "INT-IP";
    pub const INT_PORT: &str = "INT-PORT";
    pub const NAME: &str = "NAME";
    pub const MAX_PLAYERS: &str = "MAX-PLAYERS";
    pub const ACTIVE_PLAYERS: &str = "ACTIVE-PLAYERS";
    pub const QUEUE_LENGTH: &str = "QUEUE-LENGTH";
    pub const SERVER_STATE: &str = "B-U-server_state";

    /// Keys only the registry writes. Game servers can't override them.
    pub const DERIVED: &[&str] = &[GID, LID, IP];
}

/// Namespace holding the lobby id counter.
pub const COUNTER_NAMESPACE: &str = "gameServer-config";
/// Counter key inside [`COUNTER_NAMESPACE`].
pub const COUNTER_KEY: &str = "Lobbies";

/// Namespace of one lobby's record.
pub fn namespace(id: LobbyId) -> String {
    format!("gameServer-{id}")
}

/// Where players connect to reach the game server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LobbyAddress {
    /// Observed by the registry on create.
    pub public_ip: Option<String>,
    pub public_port: Option<u16>,
    pub internal_ip: Option<String>,
    pub internal_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LobbyCapacity {
    pub max_players: Option<u32>,
    pub active_players: u32,
    pub queue_length: u32,
}

/// Typed view of one lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyRecord {
    pub id: LobbyId,
    pub address: LobbyAddress,
    pub capacity: LobbyCapacity,
    /// The name the server registered under.
    pub name: Option<String>,
    /// Free-form status reported by the server.
    pub state: Option<String>,
    /// Every stored attribute, derived keys included.
    pub fields: Fields,
}

fn text(fields: &Fields, key: &str) -> Option<String> {
    fields
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn number<T: FromStr>(fields: &Fields, key: &str) -> Option<T> {
    fields.get(key).and_then(|v| v.trim().parse().ok())
}

impl LobbyRecord {
    /// Builds the view from stored fields. Unparseable numbers read as
    /// absent rather than failing the whole record.
    pub fn from_fields(id: LobbyId, fields: Fields) -> Self {
        Self {
            id,
            address: LobbyAddress {
                public_ip: text(&fields, keys::IP),
                public_port: number(&fields, keys::PORT),
                internal_ip: text(&fields, keys::INT_IP),
                internal_port: number(&fields, keys::INT_PORT),
            },
            capacity: LobbyCapacity {
                max_players: number(&fields, keys::MAX_PLAYERS),
                active_players: number(&fields, keys::ACTIVE_PLAYERS).unwrap_or(0),
                queue_length: number(&fields, keys::QUEUE_LENGTH).unwrap_or(0),
            },
            name: text(&fields, keys::NAME),
            state: text(&fields, keys::SERVER_STATE),
            fields,
        }
    }

    /// Raw attribute lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key)
    }
}
