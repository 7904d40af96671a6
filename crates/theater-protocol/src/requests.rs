//! Typed views of the inbound commands the core acts on.
//!
//! Each view is built with `TryFrom<&Command>` and gives handlers named,
//! parsed fields instead of ad hoc string lookups. The raw command is
//! still available to the handler for anything a view doesn't cover.

use crate::{AccountId, Command, Fields, LobbyId, Op, PlayerId, ProtocolError, unquote};

/// Keys that belong to the envelope rather than to a game's attributes.
const ENVELOPE_KEYS: &[&str] = &["TID"];

/// Collects every non-envelope field, unquoting values.
fn attributes(cmd: &Command) -> Fields {
    cmd.fields
        .iter()
        .filter(|(k, _)| !ENVELOPE_KEYS.contains(k))
        .map(|(k, v)| (k, unquote(v)))
        .collect()
}

// ---------------------------------------------------------------------------
// Server-side requests
// ---------------------------------------------------------------------------

/// `CGAM`: a game server registers a new game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateGame {
    /// The join mode the server asked for (`JOIN`), echoed back.
    pub join: Option<String>,
    /// All supplied attributes, unquoted, `TID` excluded.
    pub attributes: Fields,
}

impl TryFrom<&Command> for CreateGame {
    type Error = ProtocolError;

    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        cmd.expect_op(Op::Cgam)?;
        Ok(Self {
            join: cmd.get("JOIN").map(str::to_string),
            attributes: attributes(cmd),
        })
    }
}

/// `UGAM`: a game server pushes updated attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateGame {
    pub lobby: LobbyId,
    pub attributes: Fields,
}

impl TryFrom<&Command> for UpdateGame {
    type Error = ProtocolError;

    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        cmd.expect_op(Op::Ugam)?;
        Ok(Self {
            lobby: cmd.parse("GID")?,
            attributes: attributes(cmd),
        })
    }
}

/// `EGRS`: the server's answer to a request-join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResponse {
    pub lobby: Option<LobbyId>,
    pub player_id: Option<PlayerId>,
    /// `ALLOWED=0` means the server refused the player.
    pub allowed: bool,
}

impl TryFrom<&Command> for JoinResponse {
    type Error = ProtocolError;

    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        cmd.expect_op(Op::Egrs)?;
        Ok(Self {
            lobby: cmd.parse_opt("GID")?,
            player_id: cmd.parse_opt("PID")?,
            allowed: cmd.get("ALLOWED").map(str::trim) != Some("0"),
        })
    }
}

// ---------------------------------------------------------------------------
// Client-side requests
// ---------------------------------------------------------------------------

/// Addresses a client reports for itself when asking to join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportedAddress {
    pub external_ip: Option<String>,
    pub external_port: Option<u16>,
    pub internal_ip: Option<String>,
    pub internal_port: Option<u16>,
}

/// `EGAM`: a client asks to enter a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGame {
    /// Target game; `None` lets the registry pick the default lobby.
    pub lobby: Option<LobbyId>,
    pub account_id: AccountId,
    pub address: ReportedAddress,
}

impl TryFrom<&Command> for JoinGame {
    type Error = ProtocolError;

    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        cmd.expect_op(Op::Egam)?;
        let non_blank = |key: &str| {
            cmd.get(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Ok(Self {
            lobby: cmd.parse_opt("GID")?,
            account_id: cmd.parse("R-U-accid")?,
            address: ReportedAddress {
                external_ip: non_blank("R-U-externalIp"),
                external_port: cmd.parse_opt("PORT")?,
                internal_ip: non_blank("R-INT-IP"),
                internal_port: cmd.parse_opt("R-INT-PORT")?,
            },
        })
    }
}

/// `ECNL`: a client leaves the join queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveQueue {
    pub lobby: Option<LobbyId>,
}

impl TryFrom<&Command> for LeaveQueue {
    type Error = ProtocolError;

    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        cmd.expect_op(Op::Ecnl)?;
        Ok(Self {
            lobby: cmd.parse_opt("GID")?,
        })
    }
}

/// `GDAT`: a client asks for a game's details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameData {
    pub lobby: Option<LobbyId>,
}

impl TryFrom<&Command> for GameData {
    type Error = ProtocolError;

    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        cmd.expect_op(Op::Gdat)?;
        Ok(Self {
            lobby: cmd.parse_opt("GID")?,
        })
    }
}

/// `USER`: a connection announces which account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLogin {
    pub account_id: Option<AccountId>,
    pub name: Option<String>,
}

impl TryFrom<&Command> for UserLogin {
    type Error = ProtocolError;

    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        cmd.expect_op(Op::User)?;
        Ok(Self {
            account_id: cmd.parse_opt("CID")?,
            name: cmd.get("NAME").map(|n| unquote(n).to_string()),
        })
    }
}

/// `rank`/`GetStats`: fetch named stats for a persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetStats {
    /// The entity whose stats are read (`owner`).
    pub owner: String,
    /// Stat names, in the order the caller listed them.
    pub keys: Vec<String>,
}

impl TryFrom<&Command> for GetStats {
    type Error = ProtocolError;

    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        cmd.expect_op(Op::Rank)?;
        Ok(Self {
            owner: cmd.require("owner")?.to_string(),
            keys: cmd.list("keys")?,
        })
    }
}
