//! Command handlers.
//!
//! Each handler reads its command, touches the registry, orchestrator
//! or session table, and returns the replies. None of them send.

use std::time::{SystemTime, UNIX_EPOCH};

use theater_lobby::{LobbyError, LobbyRecord};
use theater_protocol::requests::{
    CreateGame, GameData, GetStats, JoinGame, JoinResponse, LeaveQueue, UpdateGame, UserLogin,
};
use theater_protocol::{AccountId, Command, Identity};
use theater_session::Role;
use theater_store::DurableStore;
use tracing::{debug, info, warn};

use crate::dispatcher::{Caller, Replies};
use crate::server::ServerState;
use crate::{TheaterError, messages};

/// `TXN` of the ranking service's stat lookup.
const GET_STATS: &str = "GetStats";

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// `CONN`: server time and the activity timeout, `PROT` echoed.
pub(crate) fn conn<D>(state: &ServerState<D>, command: &Command) -> Replies {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    vec![
        command
            .reply()
            .with("TIME", now.to_string())
            .with(
                "activityTimeoutSecs",
                state.config.session.activity_timeout_secs.to_string(),
            )
            .echo(command, "PROT"),
    ]
}

/// `USER`: binds the session to an account and answers with its name.
pub(crate) async fn user<D: DurableStore>(
    state: &ServerState<D>,
    caller: Caller,
    command: &Command,
) -> Result<Replies, TheaterError> {
    let login = UserLogin::try_from(command)?;

    let known = state
        .sessions
        .lock()
        .await
        .get(&caller.conn_id)
        .and_then(|s| s.identity.clone());

    let identity = match (known, login.account_id) {
        (Some(identity), _) => Some(identity),
        (None, Some(account_id)) => {
            let identity = resolve_identity(state, account_id, login.name.as_deref()).await;
            state
                .sessions
                .lock()
                .await
                .set_identity(caller.conn_id, identity.clone())?;
            Some(identity)
        }
        (None, None) => None,
    };

    let (name, cid) = match identity {
        Some(identity) => (identity.nickname, identity.account_id.to_string()),
        None => (login.name.unwrap_or_default(), String::new()),
    };
    Ok(vec![command.reply().with("NAME", name).with("CID", cid)])
}

/// Looks an account up, degrading to a partial identity on any failure.
async fn resolve_identity<D: DurableStore>(
    state: &ServerState<D>,
    account_id: AccountId,
    claimed_name: Option<&str>,
) -> Identity {
    match state.registry.durable().lookup_identity(account_id).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            warn!(%account_id, "identity not found");
            partial_identity(account_id, claimed_name)
        }
        Err(e) => {
            warn!(%account_id, error = %e, "identity lookup failed");
            partial_identity(account_id, claimed_name)
        }
    }
}

fn partial_identity(account_id: AccountId, claimed_name: Option<&str>) -> Identity {
    let mut identity = Identity::partial(account_id);
    if let Some(name) = claimed_name {
        identity.nickname = name.to_string();
    }
    identity
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// `LLST`: one lobby group, described in a following `LDAT`.
pub(crate) fn llst<D: DurableStore>(state: &ServerState<D>, command: &Command) -> Replies {
    vec![
        command.reply().with("NUM-LOBBIES", "1"),
        messages::lobby_group(command, &state.config.lobby, state.registry.live_count()),
    ]
}

/// `GDAT`: details of one game, from its stored record.
pub(crate) fn gdat<D: DurableStore>(
    state: &ServerState<D>,
    command: &Command,
) -> Result<Replies, TheaterError> {
    let request = GameData::try_from(command)?;
    let lobby_config = &state.config.lobby;
    let target = request.lobby.or_else(|| state.registry.default_lobby());

    let Some(lobby_id) = target else {
        debug!("game data requested with no lobby registered");
        return Ok(vec![messages::unknown_game(command, None, lobby_config)]);
    };

    let record: LobbyRecord = match state.registry.query_lobby(lobby_id) {
        Ok(record) => record,
        Err(LobbyError::NotFound(_)) => {
            warn!(%lobby_id, "game data requested for unknown lobby");
            return Ok(vec![messages::unknown_game(command, Some(lobby_id), lobby_config)]);
        }
        Err(e) => return Err(e.into()),
    };
    Ok(vec![messages::game_details(command, &record, lobby_config)])
}

/// `GLST`: not used by this title.
pub(crate) fn glst(caller: Caller, command: &Command) -> Replies {
    info!(conn_id = %caller.conn_id, tid = ?command.tid(), "game list requested, not answered");
    Vec::new()
}

/// `EGAM`: queues a join and acknowledges it.
///
/// The acknowledgement names the lobby the join was queued on, which
/// may differ from the requested one when that had no live owner.
pub(crate) async fn egam<D: DurableStore>(
    state: &ServerState<D>,
    caller: Caller,
    command: &Command,
) -> Result<Replies, TheaterError> {
    let request = JoinGame::try_from(command)?;
    let group_id = state.config.lobby.lobby_group_id.to_string();

    let current = state
        .sessions
        .lock()
        .await
        .get(&caller.conn_id)
        .and_then(|s| s.identity.clone());

    let admission = match state
        .orchestrator
        .request_join_as(caller.conn_id, caller.peer_addr, &request, current.clone())
        .await
    {
        Ok(admission) => admission,
        Err(LobbyError::NoLobbyAvailable) => {
            warn!(conn_id = %caller.conn_id, "join requested with no lobby available");
            let mut ack = command.reply().with("LID", group_id);
            if let Some(lobby) = request.lobby {
                ack = ack.with("GID", lobby.to_string());
            }
            return Ok(vec![ack]);
        }
        Err(e) => return Err(e.into()),
    };

    // Identity is resolved once per session; a lookup that succeeded
    // only upgrades a partial one.
    let upgrade = match &current {
        None => true,
        Some(known) => !known.is_resolved() && admission.identity.is_resolved(),
    };
    if upgrade {
        state
            .sessions
            .lock()
            .await
            .set_identity(caller.conn_id, admission.identity.clone())?;
    }

    debug!(
        conn_id = %caller.conn_id,
        lobby_id = %admission.lobby_id,
        state = %admission.state,
        "join acknowledged"
    );
    Ok(vec![
        command
            .reply()
            .with("GID", admission.lobby_id.to_string())
            .with("LID", group_id),
    ])
}

/// `ECNL`: leaves the join queue.
pub(crate) fn ecnl<D: DurableStore>(
    state: &ServerState<D>,
    caller: Caller,
    command: &Command,
) -> Result<Replies, TheaterError> {
    let request = LeaveQueue::try_from(command)?;
    let left = state.orchestrator.leave(caller.conn_id, request.lobby);
    if left.is_none() {
        debug!(conn_id = %caller.conn_id, "leave with nothing pending");
    }

    let mut ack = command.reply();
    if let Some(lobby_id) = left.or(request.lobby) {
        ack = ack.with("GID", lobby_id.to_string());
    }
    let lid = command
        .get("LID")
        .map(str::to_string)
        .unwrap_or_else(|| state.config.lobby.lobby_group_id.to_string());
    Ok(vec![ack.with("LID", lid)])
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// `CGAM`: registers a lobby owned by the caller.
pub(crate) async fn cgam<D: DurableStore>(
    state: &ServerState<D>,
    caller: Caller,
    command: &Command,
) -> Result<Replies, TheaterError> {
    let request = CreateGame::try_from(command)?;
    let lobby_id = state
        .registry
        .create_lobby(caller.conn_id, caller.peer_addr, &request)?;
    state
        .sessions
        .lock()
        .await
        .set_role(caller.conn_id, Role::Server)?;

    let config = &state.config.lobby;
    let mut reply = command
        .reply()
        .with("MAX-PLAYERS", config.max_players.to_string())
        .with("EKEY", config.ekey.as_str())
        .with("UGID", config.ugid.as_str());
    if let Some(join) = &request.join {
        reply = reply.with("JOIN", join.as_str());
    }
    Ok(vec![
        reply
            .with("LID", config.lobby_group_id.to_string())
            .with("SECRET", config.secret.as_str())
            .with("J", "0")
            .with("GID", lobby_id.to_string()),
    ])
}

/// `UGAM`: merges attributes onto the caller's lobby. No reply.
pub(crate) async fn ugam<D: DurableStore>(
    state: &ServerState<D>,
    caller: Caller,
    command: &Command,
) -> Result<Replies, TheaterError> {
    state
        .sessions
        .lock()
        .await
        .set_role(caller.conn_id, Role::Server)?;
    let request = UpdateGame::try_from(command)?;
    state.registry.update_lobby(caller.conn_id, &request).await?;
    Ok(Vec::new())
}

/// `EGRS`: the server's answer to a request-join.
pub(crate) fn egrs<D: DurableStore>(
    state: &ServerState<D>,
    caller: Caller,
    command: &Command,
) -> Result<Replies, TheaterError> {
    let response = JoinResponse::try_from(command)?;
    if let Some((lobby_id, client)) = state.orchestrator.server_ack(caller.conn_id, &response) {
        debug!(server = %caller.conn_id, %lobby_id, %client, allowed = response.allowed, "join answered");
    }
    Ok(vec![command.reply()])
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// `rank`: only `GetStats` is served.
pub(crate) async fn rank<D: DurableStore>(
    state: &ServerState<D>,
    caller: Caller,
    command: &Command,
) -> Result<Replies, TheaterError> {
    if command.txn() != Some(GET_STATS) {
        debug!(conn_id = %caller.conn_id, txn = ?command.txn(), "unhandled ranking transaction");
        return Ok(Vec::new());
    }
    get_stats(state, caller, command).await
}

/// `GetStats`: the requested stats of `owner`, in request order.
///
/// A store failure answers with an empty list.
async fn get_stats<D: DurableStore>(
    state: &ServerState<D>,
    caller: Caller,
    command: &Command,
) -> Result<Replies, TheaterError> {
    let request = GetStats::try_from(command)?;

    let account_id = state
        .sessions
        .lock()
        .await
        .get(&caller.conn_id)
        .and_then(|s| s.account_id())
        .unwrap_or(AccountId(0));

    let entries = match state
        .registry
        .durable()
        .fetch_stats(&request.owner, account_id, &request.keys)
        .await
    {
        Ok(entries) => entries,
        Err(e) => {
            warn!(owner = %request.owner, error = %e, "stats lookup failed");
            Vec::new()
        }
    };

    let rows: Vec<[(&str, String); 3]> = entries
        .into_iter()
        .map(|e| [("key", e.key), ("value", e.value.clone()), ("text", e.value)])
        .collect();

    let mut reply = command
        .reply()
        .with("TXN", GET_STATS)
        .with("ownerId", request.owner.as_str())
        .with("ownerType", "1");
    reply.fields.insert_records("stats", rows.iter().map(|r| &r[..]));
    Ok(vec![reply])
}
