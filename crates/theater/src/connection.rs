//! Per-connection session task.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The task owns the session's timers and its
//! notice mailbox, and races three things:
//!
//! 1. Inbound commands → [`dispatch`](crate::dispatcher::dispatch),
//!    one at a time in arrival order.
//! 2. Heartbeat ticks → `PING` with `TID=0`.
//! 3. Join-poll ticks → drain the mailbox: `EGRQ` to a server for
//!    each waiting join, `EGEG` to a client whose ticket is ready,
//!    `QLVT` to a server whose queue lost a player.
//!
//! A failed write ends this session only.

use std::sync::Arc;

use theater_lobby::{JoinNotice, NoticeReceiver};
use theater_session::SessionTimers;
use theater_store::DurableStore;
use theater_transport::{Connection, ConnectionId};
use tracing::{debug, info};

use crate::dispatcher::{Caller, dispatch};
use crate::messages;
use crate::server::ServerState;
use crate::TheaterError;

/// Drop guard that closes a session when its task exits.
///
/// This ensures cleanup happens even if the task panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async lock.
/// The normal exit path calls [`release`](Self::release) instead, so
/// cleanup has finished by the time the task ends.
struct SessionGuard<D: DurableStore> {
    conn_id: ConnectionId,
    state: Arc<ServerState<D>>,
    armed: bool,
}

impl<D: DurableStore> SessionGuard<D> {
    fn new(conn_id: ConnectionId, state: Arc<ServerState<D>>) -> Self {
        Self {
            conn_id,
            state,
            armed: true,
        }
    }

    async fn release(mut self) {
        self.armed = false;
        close_session(&self.state, self.conn_id).await;
    }
}

impl<D: DurableStore> Drop for SessionGuard<D> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            close_session(&state, conn_id).await;
        });
    }
}

/// Ends a session: marks it inactive, reconciles every handshake that
/// referenced it, then releases it. Safe to call more than once.
async fn close_session<D: DurableStore>(state: &ServerState<D>, conn_id: ConnectionId) {
    let closed = state.sessions.lock().await.close(conn_id);
    state.orchestrator.on_session_closed(conn_id);
    state.sessions.lock().await.remove(conn_id);
    if closed {
        info!(%conn_id, "session ended");
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C, D>(
    conn: C,
    state: Arc<ServerState<D>>,
) -> Result<(), TheaterError>
where
    C: Connection,
    D: DurableStore,
{
    let caller = Caller {
        conn_id: conn.id(),
        peer_addr: conn.peer_addr(),
    };

    state
        .sessions
        .lock()
        .await
        .create(caller.conn_id, caller.peer_addr)?;
    let guard = SessionGuard::new(caller.conn_id, Arc::clone(&state));

    let mut notices = state.orchestrator.register(caller.conn_id);
    let mut timers = SessionTimers::start(&state.config.session);

    let result = session_loop(&conn, &state, caller, &mut timers, &mut notices).await;

    timers.stop();
    guard.release().await;
    if let Err(e) = conn.close().await {
        debug!(conn_id = %caller.conn_id, error = %e, "close failed");
    }
    result
}

async fn session_loop<C, D>(
    conn: &C,
    state: &ServerState<D>,
    caller: Caller,
    timers: &mut SessionTimers,
    notices: &mut NoticeReceiver,
) -> Result<(), TheaterError>
where
    C: Connection,
    D: DurableStore,
{
    let conn_id = caller.conn_id;

    loop {
        tokio::select! {
            biased;

            received = conn.recv() => match received {
                Ok(Some(command)) => dispatch(conn, state, caller, command).await?,
                Ok(None) => {
                    info!(%conn_id, "connection closed by peer");
                    return Ok(());
                }
                Err(e) => {
                    debug!(%conn_id, error = %e, "recv error");
                    return Err(e.into());
                }
            },

            _ = timers.heartbeat.wait_for_tick() => {
                if !state.is_active(&conn_id).await {
                    return Ok(());
                }
                conn.send(&messages::ping()).await?;
            }

            _ = timers.join_poll.wait_for_tick() => {
                if !state.is_active(&conn_id).await {
                    return Ok(());
                }
                poll_notices(conn, state, conn_id, notices).await?;
            }
        }
    }
}

/// Acts on every notice queued since the last join-poll tick.
async fn poll_notices<C, D>(
    conn: &C,
    state: &ServerState<D>,
    conn_id: ConnectionId,
    notices: &mut NoticeReceiver,
) -> Result<(), TheaterError>
where
    C: Connection,
    D: DurableStore,
{
    let orchestrator = &state.orchestrator;
    let lobby_config = &state.config.lobby;

    while let Ok(notice) = notices.try_recv() {
        match notice {
            JoinNotice::JoinRequested { lobby_id } => {
                let Some(request) = orchestrator.issue_ticket(conn_id, lobby_id) else {
                    continue;
                };
                conn.send(&messages::request_join(&request, lobby_config))
                    .await?;
                debug!(%conn_id, %lobby_id, ticket = %request.ticket, "request-join sent");
                orchestrator.server_notified(lobby_id, request.ticket);
            }
            JoinNotice::TicketIssued { lobby_id } => {
                let Some(enter) = orchestrator.deliver_ticket(conn_id, lobby_id) else {
                    continue;
                };
                conn.send(&messages::enter_game(&enter, lobby_config))
                    .await?;
                debug!(%conn_id, %lobby_id, ticket = %enter.ticket, "enter-game sent");
            }
            JoinNotice::LeaveRequested {
                lobby_id,
                player_id,
            } => {
                conn.send(&messages::queue_leave(lobby_id, player_id, lobby_config))
                    .await?;
                debug!(%conn_id, %lobby_id, %player_id, "queue-leave sent");
            }
        }
    }
    Ok(())
}
