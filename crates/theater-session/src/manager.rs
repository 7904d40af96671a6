//! The session manager: every live connection's [`Session`].
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain `HashMap` and is not thread-safe by
//! itself. The server keeps it behind one mutex; each operation here is
//! short and never awaits, so the lock is never held across I/O.

use std::collections::HashMap;
use std::net::SocketAddr;

use theater_protocol::Identity;
use theater_transport::ConnectionId;

use crate::{Role, Session, SessionError};

/// Tracks sessions by connection id.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ [active] ──close()──→ [inactive] ──remove()──→ gone
///                 │
///                 ├─ set_role()
///                 └─ set_identity()
/// ```
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new active client session for `conn_id`.
    ///
    /// # Errors
    /// [`SessionError::AlreadyRegistered`] if `conn_id` is already known.
    pub fn create(
        &mut self,
        conn_id: ConnectionId,
        peer_addr: SocketAddr,
    ) -> Result<&Session, SessionError> {
        if self.sessions.contains_key(&conn_id) {
            return Err(SessionError::AlreadyRegistered(conn_id));
        }
        tracing::info!(%conn_id, %peer_addr, "session created");
        Ok(self
            .sessions
            .entry(conn_id)
            .or_insert_with(|| Session::new(conn_id, peer_addr)))
    }

    pub fn get(&self, conn_id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(conn_id)
    }

    /// `true` only for a registered session that has not started closing.
    pub fn is_active(&self, conn_id: &ConnectionId) -> bool {
        self.sessions.get(conn_id).is_some_and(|s| s.active)
    }

    fn active_mut(&mut self, conn_id: ConnectionId) -> Result<&mut Session, SessionError> {
        let session = self
            .sessions
            .get_mut(&conn_id)
            .ok_or(SessionError::NotFound(conn_id))?;
        if !session.active {
            return Err(SessionError::Inactive(conn_id));
        }
        Ok(session)
    }

    /// Changes the role of an active session.
    pub fn set_role(&mut self, conn_id: ConnectionId, role: Role) -> Result<(), SessionError> {
        let session = self.active_mut(conn_id)?;
        if session.role != role {
            tracing::debug!(%conn_id, ?role, "session role changed");
            session.role = role;
        }
        Ok(())
    }

    /// Stores the resolved identity of an active session.
    pub fn set_identity(
        &mut self,
        conn_id: ConnectionId,
        identity: Identity,
    ) -> Result<(), SessionError> {
        let session = self.active_mut(conn_id)?;
        tracing::debug!(
            %conn_id,
            account_id = %identity.account_id,
            player_id = %identity.player_id,
            "session identity set"
        );
        session.identity = Some(identity);
        Ok(())
    }

    /// Marks the session inactive.
    ///
    /// Returns `true` only for the call that actually performed the
    /// transition; repeated calls and unknown ids return `false`.
    pub fn close(&mut self, conn_id: ConnectionId) -> bool {
        match self.sessions.get_mut(&conn_id) {
            Some(session) if session.active => {
                session.active = false;
                tracing::info!(%conn_id, role = ?session.role, "session closing");
                true
            }
            _ => false,
        }
    }

    /// Releases the session entirely.
    pub fn remove(&mut self, conn_id: ConnectionId) -> Option<Session> {
        let removed = self.sessions.remove(&conn_id);
        if removed.is_some() {
            tracing::info!(%conn_id, "session released");
        }
        removed
    }

    /// Ids of all active sessions, in ascending order.
    pub fn active_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self
            .sessions
            .values()
            .filter(|s| s.active)
            .map(|s| s.conn_id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered sessions, active or closing.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
