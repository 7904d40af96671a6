//! Per-lobby join handshake state.
//!
//! Each lobby services one join at a time. Further requests wait in a
//! FIFO queue and are promoted when the active one finishes.
//!
//! ```text
//! Idle → JoinRequested → TicketIssued → AwaitingServerAck → Joined
//!             │               │                 │
//!             └───────────────┴─────────────────┴──→ Aborted
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;

use theater_protocol::{Identity, LobbyId, TicketId};
use theater_transport::ConnectionId;

/// Where a client's handshake with one lobby stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinState {
    /// Nothing in flight for this client.
    Idle,
    /// The client asked to join; the server hasn't been told yet.
    JoinRequested,
    /// A ticket exists and the request-join is on its way to the server.
    TicketIssued,
    /// The server has the request; the client is waiting for enter-game.
    AwaitingServerAck,
    /// The client was told where to connect.
    Joined,
    /// The join was abandoned (leave, refusal, disconnect, policy).
    Aborted,
}

impl JoinState {
    /// `Joined` and `Aborted` end a handshake.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Joined | Self::Aborted)
    }

    /// Returns `true` if moving to `target` is a legal step.
    pub fn can_transition_to(self, target: Self) -> bool {
        use JoinState::*;
        match (self, target) {
            (Idle, JoinRequested) => true,
            (JoinRequested, TicketIssued) => true,
            (TicketIssued, AwaitingServerAck) => true,
            (AwaitingServerAck, Joined) => true,
            (from, Aborted) => !from.is_terminal() && from != Idle,
            _ => false,
        }
    }
}

impl fmt::Display for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::JoinRequested => "JoinRequested",
            Self::TicketIssued => "TicketIssued",
            Self::AwaitingServerAck => "AwaitingServerAck",
            Self::Joined => "Joined",
            Self::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// The addresses a client reported for itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendezvous {
    pub external_ip: String,
    pub external_port: Option<u16>,
    pub internal_ip: Option<String>,
    pub internal_port: Option<u16>,
}

/// One client's join attempt against one lobby.
#[derive(Debug, Clone)]
pub struct JoinTicket {
    pub client: ConnectionId,
    pub identity: Identity,
    pub rendezvous: Rendezvous,
    pub state: JoinState,
    /// Assigned when the server is asked.
    pub ticket: Option<TicketId>,
    /// Set once the server answered the request-join.
    pub server_acked: bool,
}

impl JoinTicket {
    pub fn new(client: ConnectionId, identity: Identity, rendezvous: Rendezvous) -> Self {
        Self {
            client,
            identity,
            rendezvous,
            state: JoinState::JoinRequested,
            ticket: None,
            server_acked: false,
        }
    }

    /// Moves to `next` if legal; returns whether it moved.
    pub fn advance(&mut self, next: JoinState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

/// All handshake state for one lobby.
#[derive(Debug)]
pub struct LobbyHandshake {
    pub lobby_id: LobbyId,
    /// The join currently being serviced.
    pub active: Option<JoinTicket>,
    /// Waiting joins, oldest first. All in `JoinRequested`.
    pub queue: VecDeque<JoinTicket>,
    /// How each client's most recent finished attempt ended.
    outcomes: HashMap<ConnectionId, JoinState>,
}

impl LobbyHandshake {
    pub fn new(lobby_id: LobbyId) -> Self {
        Self {
            lobby_id,
            active: None,
            queue: VecDeque::new(),
            outcomes: HashMap::new(),
        }
    }

    /// `true` if `client` is active or queued here.
    pub fn is_pending(&self, client: ConnectionId) -> bool {
        self.active.as_ref().is_some_and(|t| t.client == client)
            || self.queue.iter().any(|t| t.client == client)
    }

    /// Adds a join. It becomes active immediately when nothing else is;
    /// returns `true` in that case.
    pub fn enqueue(&mut self, ticket: JoinTicket) -> bool {
        self.outcomes.remove(&ticket.client);
        if self.active.is_none() {
            self.active = Some(ticket);
            true
        } else {
            self.queue.push_back(ticket);
            false
        }
    }

    /// The active ticket, if it belongs to `client`.
    pub fn active_for(&mut self, client: ConnectionId) -> Option<&mut JoinTicket> {
        self.active.as_mut().filter(|t| t.client == client)
    }

    /// Ends the active join with `outcome` and promotes the next queued
    /// one, which is returned.
    pub fn finish_active(&mut self, outcome: JoinState) -> Option<&JoinTicket> {
        if let Some(mut done) = self.active.take() {
            done.state = outcome;
            self.outcomes.insert(done.client, outcome);
        }
        self.active = self.queue.pop_front();
        self.active.as_ref()
    }

    /// Removes `client` from the queue (not the active slot).
    pub fn remove_queued(&mut self, client: ConnectionId) -> Option<JoinTicket> {
        let idx = self.queue.iter().position(|t| t.client == client)?;
        self.queue.remove(idx)
    }

    /// Records a finished attempt for a client that never became active.
    pub fn record_outcome(&mut self, client: ConnectionId, outcome: JoinState) {
        self.outcomes.insert(client, outcome);
    }

    /// Forgets everything about `client`.
    pub fn forget(&mut self, client: ConnectionId) {
        self.outcomes.remove(&client);
    }

    /// Current state of `client` against this lobby.
    pub fn state_of(&self, client: ConnectionId) -> JoinState {
        if let Some(active) = self.active.as_ref().filter(|t| t.client == client) {
            return active.state;
        }
        if self.queue.iter().any(|t| t.client == client) {
            return JoinState::JoinRequested;
        }
        self.outcomes
            .get(&client)
            .copied()
            .unwrap_or(JoinState::Idle)
    }

    /// `true` when nothing is active, queued or remembered.
    pub fn is_empty(&self) -> bool {
        self.active.is_none() && self.queue.is_empty() && self.outcomes.is_empty()
    }
}
