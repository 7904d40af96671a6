//! Identity types and operation codes shared by every Theater layer.
//!
//! Ids travel on the wire as plain decimal strings, so their `Display`
//! implementations print the bare number. Parsing goes through
//! [`FromStr`] and fails on anything that is not a decimal integer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

numeric_id! {
    /// A registered game server instance ("game" on the wire, `GID`).
    ///
    /// Assigned from the registry's shared counter; never reused.
    LobbyId
}

numeric_id! {
    /// The externally supplied account id of a player (`R-U-accid`, `CID`).
    AccountId
}

numeric_id! {
    /// A player's persona id as stored in the durable store (`PID`).
    PlayerId
}

numeric_id! {
    /// Correlates a client's join request with the server's answer.
    TicketId
}

/// Who a player is, as resolved from the durable store.
///
/// `player_id` and `nickname` are empty/zero when the lookup failed and
/// the join policy chose to proceed with a partial identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub account_id: AccountId,
    pub nickname: String,
    pub player_id: PlayerId,
}

impl Identity {
    /// An identity carrying only the account id.
    pub fn partial(account_id: AccountId) -> Self {
        Self {
            account_id,
            nickname: String::new(),
            player_id: PlayerId(0),
        }
    }

    /// Whether the durable lookup filled in nickname and player id.
    pub fn is_resolved(&self) -> bool {
        self.player_id.0 != 0
    }
}

// ---------------------------------------------------------------------------
// Op: the 4-letter operation code
// ---------------------------------------------------------------------------

/// The operation a command carries, which selects its handler.
///
/// Known Theater codes get their own variant; anything else is kept
/// verbatim in [`Op::Other`] so it can be logged and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Op {
    /// Connection setup.
    Conn,
    /// User data lookup.
    User,
    /// Lobby list request.
    Llst,
    /// Lobby data (sent after `LLST`).
    Ldat,
    /// Game server details.
    Gdat,
    /// Game list (unused by this title).
    Glst,
    /// Client asks to enter a game.
    Egam,
    /// Client leaves the join queue.
    Ecnl,
    /// Server creates a game.
    Cgam,
    /// Server updates its game attributes.
    Ugam,
    /// Server updates its bracket.
    Ubra,
    /// Server answers a join request.
    Egrs,
    /// Server entitles a player.
    Pent,
    /// Server updates player data.
    Upla,
    /// Request-join pushed to a server.
    Egrq,
    /// Enter-game pushed to a client.
    Egeg,
    /// Queue-leave pushed to a server.
    Qlvt,
    /// Keep-alive.
    Ping,
    /// UDP heartbeat.
    Echo,
    /// FESL ranking service (`GetStats` and friends).
    Rank,
    /// Anything unrecognized.
    Other(String),
}

impl Op {
    /// The operation code as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Conn => "CONN",
            Self::User => "USER",
            Self::Llst => "LLST",
            Self::Ldat => "LDAT",
            Self::Gdat => "GDAT",
            Self::Glst => "GLST",
            Self::Egam => "EGAM",
            Self::Ecnl => "ECNL",
            Self::Cgam => "CGAM",
            Self::Ugam => "UGAM",
            Self::Ubra => "UBRA",
            Self::Egrs => "EGRS",
            Self::Pent => "PENT",
            Self::Upla => "UPLA",
            Self::Egrq => "EGRQ",
            Self::Egeg => "EGEG",
            Self::Qlvt => "QLVT",
            Self::Ping => "PING",
            Self::Echo => "ECHO",
            Self::Rank => "rank",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for Op {
    fn from(s: &str) -> Self {
        match s {
            "CONN" => Self::Conn,
            "USER" => Self::User,
            "LLST" => Self::Llst,
            "LDAT" => Self::Ldat,
            "GDAT" => Self::Gdat,
            "GLST" => Self::Glst,
            "EGAM" => Self::Egam,
            "ECNL" => Self::Ecnl,
            "CGAM" => Self::Cgam,
            "UGAM" => Self::Ugam,
            "UBRA" => Self::Ubra,
            "EGRS" => Self::Egrs,
            "PENT" => Self::Pent,
            "UPLA" => Self::Upla,
            "EGRQ" => Self::Egrq,
            "EGEG" => Self::Egeg,
            "QLVT" => Self::Qlvt,
            "PING" => Self::Ping,
            "ECHO" => Self::Echo,
            "rank" => Self::Rank,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Op {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Op> for String {
    fn from(op: Op) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
