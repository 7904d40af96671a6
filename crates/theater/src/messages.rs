//! Outbound commands the server pushes without being asked, and the
//! replies that are built from lobby records rather than echoed input.

use theater_lobby::{ClientEnterGame, LobbyConfig, LobbyRecord, ServerJoinRequest};
use theater_protocol::{Command, LobbyId, Op, PlayerId};

/// `TID` of every server-initiated request-join.
const REQUEST_JOIN_TID: &str = "6";
/// Data center tag reported for joining players.
const DATA_CENTER: &str = "iad";

/// Keep-alive sent on every heartbeat tick.
pub fn ping() -> Command {
    Command::new(Op::Ping).with("TID", "0")
}

/// `EGRQ`: asks the owning server to admit a player.
pub fn request_join(req: &ServerJoinRequest, config: &LobbyConfig) -> Command {
    let uid = req.identity.account_id.to_string();
    let nickname = req.identity.nickname.as_str();
    let rv = &req.rendezvous;
    let external_port = rv.external_port.map(|p| p.to_string()).unwrap_or_default();
    let internal_ip = rv.internal_ip.clone().unwrap_or_default();
    let internal_port = rv.internal_port.map(|p| p.to_string()).unwrap_or_default();

    Command::new(Op::Egrq)
        .with("TID", REQUEST_JOIN_TID)
        .with("NAME", nickname)
        .with("UID", uid.as_str())
        .with("PID", req.identity.player_id.to_string())
        .with("TICKET", req.ticket.to_string())
        .with("IP", rv.external_ip.as_str())
        .with("PORT", external_port.as_str())
        .with("INT-IP", internal_ip.as_str())
        .with("INT-PORT", internal_port.as_str())
        .with("PTYPE", "P")
        .with("R-cid", uid.as_str())
        .with("cid", uid.as_str())
        .with("R-USER", nickname)
        .with("R-UID", uid.as_str())
        .with("XUID", uid.as_str())
        .with("R-XUID", uid.as_str())
        .with("R-U-accid", uid.as_str())
        .with("R-U-elo", "1")
        .with("R-U-team", "1")
        .with("R-U-kit", "2")
        .with("R-U-lvl", "1")
        .with("R-U-dataCenter", DATA_CENTER)
        .with("R-U-externalIp", rv.external_ip.as_str())
        .with("R-U-internalIp", internal_ip.as_str())
        .with("R-U-category", "5")
        .with("R-U-cid", uid.as_str())
        .with("R-INT-PORT", internal_port.as_str())
        .with("R-INT-IP", internal_ip.as_str())
        .with("LID", config.lobby_group_id.to_string())
        .with("GID", req.lobby_id.to_string())
}

/// `EGEG`: tells the client where to connect and with which ticket.
///
/// Missing record addresses fall back to the configured rendezvous
/// host and port; the internal address falls back to the public one.
pub fn enter_game(enter: &ClientEnterGame, config: &LobbyConfig) -> Command {
    let server = &enter.server;
    let host = server
        .public_ip
        .clone()
        .unwrap_or_else(|| config.default_host.clone());
    let port = server.public_port.unwrap_or(config.default_port);
    let internal_host = server.internal_ip.clone().unwrap_or_else(|| host.clone());
    let internal_port = server.internal_port.unwrap_or(port);

    Command::new(Op::Egeg)
        .with("PL", config.platform.as_str())
        .with("TICKET", enter.ticket.to_string())
        .with("PID", enter.player_id.to_string())
        .with("I", host)
        .with("P", port.to_string())
        .with("HUID", "1")
        .with("EKEY", config.ekey.as_str())
        .with("INT-IP", internal_host)
        .with("INT-PORT", internal_port.to_string())
        .with("SECRET", config.secret.as_str())
        .with("UGID", config.ugid.as_str())
        .with("LID", config.lobby_group_id.to_string())
        .with("GID", enter.lobby_id.to_string())
}

/// `QLVT`: a queued player left before joining.
pub fn queue_leave(lobby_id: LobbyId, player_id: PlayerId, config: &LobbyConfig) -> Command {
    Command::new(Op::Qlvt)
        .with("PID", player_id.to_string())
        .with("LID", config.lobby_group_id.to_string())
        .with("GID", lobby_id.to_string())
}

/// `LDAT`: the well-known lobby group, sent after an `LLST` reply.
pub fn lobby_group(request: &Command, config: &LobbyConfig, live_games: usize) -> Command {
    let mut ldat = Command::new(Op::Ldat);
    if let Some(tid) = request.tid() {
        ldat = ldat.with("TID", tid);
    }
    ldat.with("FAVORITE-GAMES", "0")
        .with("FAVORITE-PLAYERS", "0")
        .with("LID", config.lobby_group_id.to_string())
        .with("LOCALE", config.locale.as_str())
        .with("MAX-GAMES", config.max_games.to_string())
        .with("NAME", config.lobby_group_name.as_str())
        .with("NUM-GAMES", live_games.to_string())
        .with("PASSING", "0")
}

/// `GDAT` reply built from a stored record.
///
/// Fields the server never reported fall back to configuration values.
/// Every `B-*` attribute is passed through as stored.
pub fn game_details(request: &Command, record: &LobbyRecord, config: &LobbyConfig) -> Command {
    let stored = |key: &str, fallback: String| {
        record
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .unwrap_or(fallback)
    };

    let host = record
        .address
        .public_ip
        .clone()
        .unwrap_or_else(|| config.default_host.clone());
    let port = record.address.public_port.unwrap_or(config.default_port);
    let max_players = record.capacity.max_players.unwrap_or(config.max_players);

    let mut reply = request
        .reply()
        .with("TYPE", stored("TYPE", "G".into()))
        .with("LID", config.lobby_group_id.to_string())
        .with("GID", record.id.to_string())
        .with("I", host)
        .with("P", port.to_string())
        .with("N", record.name.clone().unwrap_or_default())
        .with("MP", max_players.to_string())
        .with("AP", record.capacity.active_players.to_string())
        .with("QP", record.capacity.queue_length.to_string())
        .with("JP", stored("JP", "0".into()))
        .with("PW", stored("PW", "0".into()))
        .with("HU", stored("HU", "1".into()))
        .with("HN", stored("HN", String::new()))
        .with("V", stored("V", config.version.clone()))
        .with("PL", stored("PL", config.platform.to_uppercase()))
        .with("J", stored("J", "O".into()))
        .with("F", stored("F", "0".into()))
        .with("NF", stored("NF", "0".into()));

    for (key, value) in record.fields.iter().filter(|(k, _)| k.starts_with("B-")) {
        reply.fields.insert(key, value);
    }
    reply
}

/// `GDAT` reply for a lobby that doesn't exist.
pub fn unknown_game(request: &Command, lobby_id: Option<LobbyId>, config: &LobbyConfig) -> Command {
    let reply = request
        .reply()
        .with("LID", config.lobby_group_id.to_string());
    match lobby_id {
        Some(id) => reply.with("GID", id.to_string()),
        None => reply,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use theater_lobby::{LobbyAddress, Rendezvous};
    use theater_protocol::{AccountId, Fields, Identity, TicketId};
    use theater_transport::ConnectionId;

    fn config() -> LobbyConfig {
        LobbyConfig::default()
    }

    #[test]
    fn test_ping_carries_zero_tid() {
        let ping = ping();
        assert_eq!(ping.op, Op::Ping);
        assert_eq!(ping.tid(), Some("0"));
    }

    #[test]
    fn test_request_join_carries_identity_and_rendezvous() {
        let req = ServerJoinRequest {
            lobby_id: LobbyId(1),
            client: ConnectionId::new(2),
            ticket: TicketId(2_018_751_182),
            identity: Identity {
                account_id: AccountId(42),
                nickname: "Grunt".into(),
                player_id: PlayerId(7),
            },
            rendezvous: Rendezvous {
                external_ip: "203.0.113.9".into(),
                external_port: Some(3659),
                internal_ip: Some("192.168.1.20".into()),
                internal_port: Some(3660),
            },
        };

        let egrq = request_join(&req, &config());
        assert_eq!(egrq.op, Op::Egrq);
        assert_eq!(egrq.get("R-U-accid"), Some("42"));
        assert_eq!(egrq.get("NAME"), Some("Grunt"));
        assert_eq!(egrq.get("PID"), Some("7"));
        assert_eq!(egrq.get("TICKET"), Some("2018751182"));
        assert_eq!(egrq.get("IP"), Some("203.0.113.9"));
        assert_eq!(egrq.get("PORT"), Some("3659"));
        assert_eq!(egrq.get("R-INT-IP"), Some("192.168.1.20"));
        assert_eq!(egrq.get("R-INT-PORT"), Some("3660"));
        assert_eq!(egrq.get("GID"), Some("1"));
        assert_eq!(egrq.get("LID"), Some("1"));
    }

    #[test]
    fn test_enter_game_falls_back_to_configured_address() {
        let enter = ClientEnterGame {
            lobby_id: LobbyId(4),
            ticket: TicketId(1_234_567_890),
            player_id: PlayerId(7),
            server: LobbyAddress::default(),
        };
        let egeg = enter_game(&enter, &config());
        assert_eq!(egeg.get("I"), Some("127.0.0.1"));
        assert_eq!(egeg.get("P"), Some("18569"));
        assert_eq!(egeg.get("INT-IP"), Some("127.0.0.1"));
        assert_eq!(egeg.get("SECRET"), Some("2587913"));
        assert_eq!(egeg.get("GID"), Some("4"));
    }

    #[test]
    fn test_enter_game_uses_recorded_address() {
        let enter = ClientEnterGame {
            lobby_id: LobbyId(1),
            ticket: TicketId(1_234_567_890),
            player_id: PlayerId(7),
            server: LobbyAddress {
                public_ip: Some("198.51.100.7".into()),
                public_port: Some(18567),
                internal_ip: Some("10.0.0.2".into()),
                internal_port: None,
            },
        };
        let egeg = enter_game(&enter, &config());
        assert_eq!(egeg.get("I"), Some("198.51.100.7"));
        assert_eq!(egeg.get("P"), Some("18567"));
        assert_eq!(egeg.get("INT-IP"), Some("10.0.0.2"));
        assert_eq!(egeg.get("INT-PORT"), Some("18567"));
    }

    #[test]
    fn test_game_details_serves_stored_fields() {
        let fields = Fields::new()
            .with("GID", "3")
            .with("IP", "198.51.100.7")
            .with("PORT", "18567")
            .with("NAME", "Test")
            .with("MAX-PLAYERS", "16")
            .with("ACTIVE-PLAYERS", "4")
            .with("B-U-map", "no_vehicles")
            .with("B-version", "1.02.1067.0");
        let record = LobbyRecord::from_fields(LobbyId(3), fields);
        let request = Command::new(Op::Gdat).with("TID", "5").with("GID", "3");

        let gdat = game_details(&request, &record, &config());
        assert_eq!(gdat.tid(), Some("5"));
        assert_eq!(gdat.get("I"), Some("198.51.100.7"));
        assert_eq!(gdat.get("P"), Some("18567"));
        assert_eq!(gdat.get("N"), Some("Test"));
        assert_eq!(gdat.get("AP"), Some("4"));
        assert_eq!(gdat.get("MP"), Some("16"));
        assert_eq!(gdat.get("B-U-map"), Some("no_vehicles"));
        assert_eq!(gdat.get("B-version"), Some("1.02.1067.0"));
        assert_eq!(gdat.get("PL"), Some("PC"));
    }

    #[test]
    fn test_unknown_game_only_identifies() {
        let request = Command::new(Op::Gdat).with("TID", "5");
        let gdat = unknown_game(&request, Some(LobbyId(99)), &config());
        assert_eq!(gdat.fields.len(), 3);
        assert_eq!(gdat.get("GID"), Some("99"));
    }
}
