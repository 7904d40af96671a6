//! Command routing.
//!
//! [`dispatch`] is the single place that drops commands arriving on an
//! inactive session. Handlers return the replies to send; the
//! dispatcher writes them. Handler errors are logged and cost only the
//! command that caused them. A write failure is returned, which ends
//! the session.

use std::net::SocketAddr;

use theater_protocol::{Command, Op};
use theater_store::DurableStore;
use theater_transport::{Connection, ConnectionId, TransportError};
use tracing::{debug, warn};

use crate::server::ServerState;
use crate::{TheaterError, handlers};

/// Who sent the command being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Caller {
    pub(crate) conn_id: ConnectionId,
    /// As observed by the transport, never as claimed by the peer.
    pub(crate) peer_addr: SocketAddr,
}

/// Replies a handler wants sent, in order.
pub(crate) type Replies = Vec<Command>;

/// Routes one command to its handler and sends the replies.
pub(crate) async fn dispatch<C, D>(
    conn: &C,
    state: &ServerState<D>,
    caller: Caller,
    command: Command,
) -> Result<(), TransportError>
where
    C: Connection,
    D: DurableStore,
{
    let conn_id = caller.conn_id;
    if !state.is_active(&conn_id).await {
        debug!(%conn_id, op = %command.op, "command on inactive session dropped");
        return Ok(());
    }
    debug!(%conn_id, op = %command.op, tid = ?command.tid(), "dispatching command");

    let replies = match route(state, caller, &command).await {
        Ok(replies) => replies,
        Err(TheaterError::Transport(e)) => return Err(e),
        Err(e) => {
            warn!(%conn_id, op = %command.op, error = %e, "command failed");
            return Ok(());
        }
    };

    for reply in &replies {
        conn.send(reply).await?;
    }
    Ok(())
}

async fn route<D: DurableStore>(
    state: &ServerState<D>,
    caller: Caller,
    command: &Command,
) -> Result<Replies, TheaterError> {
    match &command.op {
        // Shared
        Op::Conn => Ok(handlers::conn(state, command)),
        Op::User => handlers::user(state, caller, command).await,
        Op::Ping => Ok(Vec::new()),

        // Client
        Op::Llst => Ok(handlers::llst(state, command)),
        Op::Gdat => handlers::gdat(state, command),
        Op::Glst => Ok(handlers::glst(caller, command)),
        Op::Egam => handlers::egam(state, caller, command).await,
        Op::Ecnl => handlers::ecnl(state, caller, command),

        // Server
        Op::Cgam => handlers::cgam(state, caller, command).await,
        Op::Ugam => handlers::ugam(state, caller, command).await,
        Op::Ubra => Ok(vec![command.reply()]),
        Op::Egrs => handlers::egrs(state, caller, command),
        Op::Pent => Ok(vec![command.reply().echo(command, "PID")]),
        Op::Upla => Ok(vec![
            command.reply().echo(command, "PID").echo(command, "P-cid"),
        ]),

        // Ranking service
        Op::Rank => handlers::rank(state, caller, command).await,

        Op::Ldat | Op::Egrq | Op::Egeg | Op::Qlvt | Op::Echo | Op::Other(_) => {
            debug!(conn_id = %caller.conn_id, op = %command.op, "unhandled operation ignored");
            Ok(Vec::new())
        }
    }
}
