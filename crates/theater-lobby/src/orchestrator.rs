//! The join orchestrator: moves a client from "wants to join" to
//! "knows where to connect".
//!
//! State lives per lobby in [`LobbyHandshake`]s. Sessions never poll
//! shared flags; instead each session registers a mailbox and receives
//! [`JoinNotice`]s telling it what to do on its next join-poll tick:
//!
//! ```text
//! client EGAM ──request_join()──→ owner mailbox: JoinRequested
//! owner poll  ──issue_ticket()──→ EGRQ to server ──server_notified()
//!                                 └─→ client mailbox: TicketIssued
//! client poll ──deliver_ticket()─→ EGEG to client (exactly once)
//! client ECNL ──leave()──────────→ owner mailbox: LeaveRequested (QLVT)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use theater_protocol::requests::{JoinGame, JoinResponse};
use theater_protocol::{Identity, LobbyId, PlayerId, TicketId};
use theater_store::DurableStore;
use theater_transport::ConnectionId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::handshake::{JoinState, JoinTicket, LobbyHandshake, Rendezvous};
use crate::record::LobbyAddress;
use crate::{IdentityPolicy, JoinConfig, LobbyError, LobbyRegistry};

// ---------------------------------------------------------------------------
// Notices and results
// ---------------------------------------------------------------------------

/// Work for a session's next join-poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinNotice {
    /// To a server: a client is waiting on `lobby_id`.
    JoinRequested { lobby_id: LobbyId },
    /// To a client: its ticket for `lobby_id` is ready.
    TicketIssued { lobby_id: LobbyId },
    /// To a server: a player left the queue of `lobby_id`.
    LeaveRequested {
        lobby_id: LobbyId,
        player_id: PlayerId,
    },
}

/// Receiving end of a session's notice mailbox.
pub type NoticeReceiver = mpsc::UnboundedReceiver<JoinNotice>;

/// Result of [`JoinOrchestrator::request_join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAdmission {
    pub lobby_id: LobbyId,
    pub identity: Identity,
    /// `JoinRequested` normally; `Aborted` when the identity policy
    /// refused the join.
    pub state: JoinState,
}

/// What the owning server is told on request-join (`EGRQ`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerJoinRequest {
    pub lobby_id: LobbyId,
    pub client: ConnectionId,
    pub ticket: TicketId,
    pub identity: Identity,
    pub rendezvous: Rendezvous,
}

/// What the client is told on enter-game (`EGEG`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEnterGame {
    pub lobby_id: LobbyId,
    pub ticket: TicketId,
    pub player_id: PlayerId,
    /// The game server's address as last recorded.
    pub server: LobbyAddress,
}

// ---------------------------------------------------------------------------
// JoinOrchestrator
// ---------------------------------------------------------------------------

/// Cross-session join state machine, serialized per lobby.
pub struct JoinOrchestrator<D> {
    registry: Arc<LobbyRegistry<D>>,
    config: JoinConfig,
    handshakes: DashMap<LobbyId, LobbyHandshake>,
    mailboxes: DashMap<ConnectionId, mpsc::UnboundedSender<JoinNotice>>,
}

fn fresh_ticket() -> TicketId {
    TicketId(rand::rng().random_range(1_000_000_000..=u32::MAX as u64))
}

impl<D: DurableStore> JoinOrchestrator<D> {
    pub fn new(registry: Arc<LobbyRegistry<D>>, config: JoinConfig) -> Self {
        Self {
            registry,
            config,
            handshakes: DashMap::new(),
            mailboxes: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<LobbyRegistry<D>> {
        &self.registry
    }

    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    /// Opens the notice mailbox for `conn_id`. A second call replaces
    /// the first mailbox.
    pub fn register(&self, conn_id: ConnectionId) -> NoticeReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.insert(conn_id, tx);
        rx
    }

    fn notify(&self, conn_id: ConnectionId, notice: JoinNotice) {
        match self.mailboxes.get(&conn_id) {
            Some(tx) => {
                if tx.send(notice).is_err() {
                    debug!(%conn_id, "mailbox closed, notice dropped");
                }
            }
            None => debug!(%conn_id, ?notice, "no mailbox, notice dropped"),
        }
    }

    fn notify_owner(&self, lobby_id: LobbyId, notice: JoinNotice) {
        match self.registry.owner(lobby_id) {
            Some(owner) => self.notify(owner, notice),
            None => debug!(%lobby_id, "lobby has no live owner, notice dropped"),
        }
    }

    // -- Client join -------------------------------------------------------

    /// Records a client's wish to join.
    ///
    /// Resolves the identity first (the only await), then queues the
    /// join on the target lobby. A client already pending on that lobby
    /// gets its current state back and nothing is queued twice.
    pub async fn request_join(
        &self,
        client: ConnectionId,
        observed: SocketAddr,
        request: &JoinGame,
    ) -> Result<JoinAdmission, LobbyError> {
        self.request_join_as(client, observed, request, None).await
    }

    /// [`request_join`](Self::request_join) for a session that already
    /// resolved its identity. `known` is used instead of a durable lookup
    /// when it is resolved and belongs to the requested account.
    pub async fn request_join_as(
        &self,
        client: ConnectionId,
        observed: SocketAddr,
        request: &JoinGame,
        known: Option<Identity>,
    ) -> Result<JoinAdmission, LobbyError> {
        let lobby_id = self
            .registry
            .resolve_target(request.lobby)
            .ok_or(LobbyError::NoLobbyAvailable)?;

        let known = known.filter(|id| id.account_id == request.account_id && id.is_resolved());
        let identity = match known {
            Some(identity) => Some(identity),
            None => self.lookup(client, request).await,
        };

        let identity = match (identity, self.config.identity_policy) {
            (Some(identity), _) => identity,
            (None, IdentityPolicy::ProceedPartial) => Identity::partial(request.account_id),
            (None, IdentityPolicy::FailJoin) => {
                let identity = Identity::partial(request.account_id);
                let mut hs = self
                    .handshakes
                    .entry(lobby_id)
                    .or_insert_with(|| LobbyHandshake::new(lobby_id));
                if !hs.is_pending(client) {
                    hs.record_outcome(client, JoinState::Aborted);
                }
                info!(%client, %lobby_id, "join refused: identity unresolved");
                return Ok(JoinAdmission {
                    lobby_id,
                    identity,
                    state: hs.state_of(client),
                });
            }
        };

        let rendezvous = Rendezvous {
            external_ip: request
                .address
                .external_ip
                .clone()
                .unwrap_or_else(|| observed.ip().to_string()),
            external_port: request.address.external_port.or(Some(observed.port())),
            internal_ip: request.address.internal_ip.clone(),
            internal_port: request.address.internal_port,
        };

        // The owner may have gone during the lookup. Its cleanup removes
        // the handshake under the same shard lock, so checking here is
        // enough to never queue on an ownerless lobby.
        let mut lobby_id = lobby_id;
        let became_active = loop {
            let mut hs = self
                .handshakes
                .entry(lobby_id)
                .or_insert_with(|| LobbyHandshake::new(lobby_id));
            if self.registry.owner(lobby_id).is_none() {
                drop(hs);
                self.handshakes.remove_if(&lobby_id, |_, hs| hs.is_empty());
                let retarget = self
                    .registry
                    .resolve_target(None)
                    .ok_or(LobbyError::NoLobbyAvailable)?;
                debug!(%client, from = %lobby_id, to = %retarget, "target lost its owner, retargeting");
                lobby_id = retarget;
                continue;
            }
            if hs.is_pending(client) {
                debug!(%client, %lobby_id, "duplicate join request ignored");
                return Ok(JoinAdmission {
                    lobby_id,
                    identity,
                    state: hs.state_of(client),
                });
            }
            break hs.enqueue(JoinTicket::new(client, identity.clone(), rendezvous));
        };

        info!(
            %client,
            %lobby_id,
            account_id = %identity.account_id,
            player_id = %identity.player_id,
            queued = !became_active,
            "join requested"
        );
        if became_active {
            self.notify_owner(lobby_id, JoinNotice::JoinRequested { lobby_id });
        }

        Ok(JoinAdmission {
            lobby_id,
            identity,
            state: JoinState::JoinRequested,
        })
    }

    async fn lookup(&self, client: ConnectionId, request: &JoinGame) -> Option<Identity> {
        match self
            .registry
            .durable()
            .lookup_identity(request.account_id)
            .await
        {
            Ok(Some(identity)) => Some(identity),
            Ok(None) => {
                warn!(%client, account_id = %request.account_id, "identity not found");
                None
            }
            Err(err) => {
                warn!(%client, account_id = %request.account_id, error = %err, "identity lookup failed");
                None
            }
        }
    }

    // -- Server side -------------------------------------------------------

    /// Issues a ticket for the active join on `lobby_id`, if `server`
    /// owns it and the join is waiting. The caller sends the request-join
    /// and then calls [`server_notified`](Self::server_notified).
    pub fn issue_ticket(&self, server: ConnectionId, lobby_id: LobbyId) -> Option<ServerJoinRequest> {
        if self.registry.owner(lobby_id) != Some(server) {
            debug!(%server, %lobby_id, "poll from non-owner ignored");
            return None;
        }
        let mut hs = self.handshakes.get_mut(&lobby_id)?;
        let active = hs.active.as_mut()?;
        if active.state != JoinState::JoinRequested {
            return None;
        }

        let ticket = fresh_ticket();
        active.ticket = Some(ticket);
        active.advance(JoinState::TicketIssued);
        info!(%lobby_id, client = %active.client, %ticket, "ticket issued");

        Some(ServerJoinRequest {
            lobby_id,
            client: active.client,
            ticket,
            identity: active.identity.clone(),
            rendezvous: active.rendezvous.clone(),
        })
    }

    /// Marks the request-join for `ticket` as delivered to the server.
    /// Without strict acknowledgement the client is told right away.
    pub fn server_notified(&self, lobby_id: LobbyId, ticket: TicketId) {
        let client = {
            let Some(mut hs) = self.handshakes.get_mut(&lobby_id) else {
                return;
            };
            let Some(active) = hs.active.as_mut().filter(|t| t.ticket == Some(ticket)) else {
                return;
            };
            if !active.advance(JoinState::AwaitingServerAck) {
                return;
            }
            active.client
        };
        if !self.config.require_server_ack {
            self.notify(client, JoinNotice::TicketIssued { lobby_id });
        }
    }

    /// Applies the server's answer to a request-join (`EGRS`).
    ///
    /// Returns the lobby and client the answer applied to. A refusal
    /// aborts the join and promotes the next queued one.
    pub fn server_ack(
        &self,
        server: ConnectionId,
        response: &JoinResponse,
    ) -> Option<(LobbyId, ConnectionId)> {
        let candidates = match response.lobby {
            Some(id) => vec![id],
            None => self.registry.lobbies_owned_by(server),
        };

        for lobby_id in candidates {
            if self.registry.owner(lobby_id) != Some(server) {
                continue;
            }
            let (client, promoted) = {
                let Some(mut hs) = self.handshakes.get_mut(&lobby_id) else {
                    continue;
                };
                let Some(active) = hs.active.as_mut() else {
                    continue;
                };
                if active.state != JoinState::AwaitingServerAck {
                    continue;
                }
                if let Some(pid) = response.player_id {
                    if active.identity.player_id != pid {
                        continue;
                    }
                }
                let client = active.client;
                if response.allowed {
                    active.server_acked = true;
                    (client, None)
                } else {
                    let next = hs.finish_active(JoinState::Aborted).map(|t| t.client);
                    (client, Some(next))
                }
            };

            match promoted {
                None => {
                    debug!(%lobby_id, %client, "server accepted join");
                    if self.config.require_server_ack {
                        self.notify(client, JoinNotice::TicketIssued { lobby_id });
                    }
                }
                Some(next) => {
                    info!(%lobby_id, %client, "server refused join");
                    if next.is_some() {
                        self.notify_owner(lobby_id, JoinNotice::JoinRequested { lobby_id });
                    }
                }
            }
            return Some((lobby_id, client));
        }

        debug!(%server, "join response matched no pending join");
        None
    }

    // -- Client side -------------------------------------------------------

    /// Hands `client` its enter-game for `lobby_id`, exactly once.
    pub fn deliver_ticket(&self, client: ConnectionId, lobby_id: LobbyId) -> Option<ClientEnterGame> {
        let server = match self.registry.query_lobby(lobby_id) {
            Ok(record) => record.address,
            Err(err) => {
                warn!(%lobby_id, error = %err, "lobby record missing at enter-game");
                LobbyAddress::default()
            }
        };

        let (enter, promoted) = {
            let mut hs = self.handshakes.get_mut(&lobby_id)?;
            let active = hs.active_for(client)?;
            if active.state != JoinState::AwaitingServerAck {
                return None;
            }
            if self.config.require_server_ack && !active.server_acked {
                return None;
            }
            let ticket = active.ticket?;
            active.advance(JoinState::Joined);
            let enter = ClientEnterGame {
                lobby_id,
                ticket,
                player_id: active.identity.player_id,
                server,
            };
            let promoted = hs.finish_active(JoinState::Joined).is_some();
            (enter, promoted)
        };

        info!(%lobby_id, %client, ticket = %enter.ticket, "client joined");
        if promoted {
            self.notify_owner(lobby_id, JoinNotice::JoinRequested { lobby_id });
        }
        Some(enter)
    }

    /// Leaves the join queue (`ECNL`). Returns the lobby that was left.
    ///
    /// The owning server is sent a leave notice; a finished join is not
    /// affected.
    pub fn leave(&self, client: ConnectionId, lobby: Option<LobbyId>) -> Option<LobbyId> {
        let lobby_id = match lobby {
            Some(id) => id,
            None => self
                .handshakes
                .iter()
                .find(|hs| hs.is_pending(client))
                .map(|hs| hs.lobby_id)?,
        };

        let (player_id, promoted) = {
            let mut hs = self.handshakes.get_mut(&lobby_id)?;
            if hs.active_for(client).is_some() {
                let player_id = hs.active.as_ref().map(|t| t.identity.player_id)?;
                let promoted = hs.finish_active(JoinState::Aborted).is_some();
                (player_id, promoted)
            } else if let Some(queued) = hs.remove_queued(client) {
                hs.record_outcome(client, JoinState::Aborted);
                (queued.identity.player_id, false)
            } else {
                return None;
            }
        };

        info!(%lobby_id, %client, "client left join queue");
        self.notify_owner(lobby_id, JoinNotice::LeaveRequested { lobby_id, player_id });
        if promoted {
            self.notify_owner(lobby_id, JoinNotice::JoinRequested { lobby_id });
        }
        Some(lobby_id)
    }

    // -- Cleanup -----------------------------------------------------------

    /// Reconciles everything that referenced `conn_id`. Call once when a
    /// session ends.
    ///
    /// Lobbies it owned lose their owner and their handshake state. Joins
    /// it was making are aborted and forgotten: each owner gets a leave
    /// notice, and the next queued join (if any) is handed to it.
    pub fn on_session_closed(&self, conn_id: ConnectionId) {
        self.mailboxes.remove(&conn_id);

        for lobby_id in self.registry.release_owner(conn_id) {
            if self.handshakes.remove(&lobby_id).is_some() {
                info!(%lobby_id, "handshake state reset, owner gone");
            }
        }

        let mut aborted = Vec::new();
        let mut promoted = Vec::new();
        for mut hs in self.handshakes.iter_mut() {
            let lobby_id = hs.lobby_id;
            if let Some(active) = hs.active_for(conn_id) {
                aborted.push((lobby_id, active.identity.player_id));
                if hs.finish_active(JoinState::Aborted).is_some() {
                    promoted.push(lobby_id);
                }
                info!(%lobby_id, client = %conn_id, "join aborted, client gone");
            } else if let Some(queued) = hs.remove_queued(conn_id) {
                aborted.push((lobby_id, queued.identity.player_id));
            }
            hs.forget(conn_id);
        }
        self.handshakes.retain(|_, hs| !hs.is_empty());

        for (lobby_id, player_id) in aborted {
            self.notify_owner(lobby_id, JoinNotice::LeaveRequested { lobby_id, player_id });
        }
        for lobby_id in promoted {
            self.notify_owner(lobby_id, JoinNotice::JoinRequested { lobby_id });
        }
    }

    /// Drops all handshake state for `lobby_id`.
    pub fn reset(&self, lobby_id: LobbyId) {
        self.handshakes.remove(&lobby_id);
    }

    /// Where `client` stands against `lobby_id`.
    pub fn state(&self, lobby_id: LobbyId, client: ConnectionId) -> JoinState {
        self.handshakes
            .get(&lobby_id)
            .map(|hs| hs.state_of(client))
            .unwrap_or(JoinState::Idle)
    }
}
