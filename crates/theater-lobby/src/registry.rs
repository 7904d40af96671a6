//! The game registry: creates, updates and answers queries about lobbies.
//!
//! Records live in the shared key-value store, one namespace per lobby.
//! Ownership (which connection registered a lobby) is process-local and
//! kept here; records outlive their owners and are never deleted.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use theater_protocol::requests::{CreateGame, UpdateGame};
use theater_protocol::{Fields, LobbyId};
use theater_store::{DurableStore, KvStore};
use theater_transport::ConnectionId;
use tracing::{debug, info, warn};

use crate::record::{self, COUNTER_KEY, COUNTER_NAMESPACE, keys};
use crate::{LobbyConfig, LobbyError, LobbyRecord};

/// Registry of every lobby ever created.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct LobbyRegistry<D> {
    kv: Arc<dyn KvStore>,
    durable: Arc<D>,
    config: LobbyConfig,
    /// Live owner of each lobby. Removed when the owner disconnects.
    owners: DashMap<LobbyId, ConnectionId>,
}

impl<D: DurableStore> LobbyRegistry<D> {
    pub fn new(kv: Arc<dyn KvStore>, durable: Arc<D>, config: LobbyConfig) -> Self {
        Self {
            kv,
            durable,
            config,
            owners: DashMap::new(),
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    pub fn durable(&self) -> &Arc<D> {
        &self.durable
    }

    /// Registers a new lobby for the server on `owner`.
    ///
    /// The id comes from the shared counter, which continues from
    /// whatever high-water mark is already stored. The public IP is the
    /// address the connection was observed from; client-supplied `GID`,
    /// `LID` and `IP` values are replaced.
    pub fn create_lobby(
        &self,
        owner: ConnectionId,
        peer_addr: SocketAddr,
        request: &CreateGame,
    ) -> Result<LobbyId, LobbyError> {
        let id = LobbyId(self.kv.incr(COUNTER_NAMESPACE, COUNTER_KEY)?);

        let mut fields = request.attributes.clone();
        fields.insert(keys::GID, id.to_string());
        fields.insert(keys::LID, self.config.lobby_group_id.to_string());
        fields.insert(keys::IP, peer_addr.ip().to_string());
        fields.insert(keys::ACTIVE_PLAYERS, "0");
        fields.insert(keys::QUEUE_LENGTH, "0");

        if !self.kv.create(&record::namespace(id), &fields)? {
            warn!(lobby_id = %id, "counter produced an id that already has a record");
            return Err(LobbyError::IdCollision(id));
        }
        self.owners.insert(id, owner);

        info!(
            lobby_id = %id,
            %owner,
            ip = %peer_addr.ip(),
            keys = fields.len(),
            "lobby created"
        );
        Ok(id)
    }

    /// Merges attributes onto an existing lobby, then mirrors them to the
    /// durable store.
    ///
    /// Only the owning connection may update. Derived keys are ignored.
    /// A conflicting durable write is retried once; any durable failure
    /// is logged and the shared-store copy stays authoritative.
    pub async fn update_lobby(
        &self,
        caller: ConnectionId,
        request: &UpdateGame,
    ) -> Result<(), LobbyError> {
        let id = request.lobby;
        if self.owner(id) != Some(caller) {
            if !self.kv.exists(&record::namespace(id))? {
                return Err(LobbyError::NotFound(id));
            }
            return Err(LobbyError::NotOwner {
                lobby_id: id,
                conn_id: caller,
            });
        }

        let fields: Fields = request
            .attributes
            .iter()
            .filter(|(k, _)| !keys::DERIVED.contains(k))
            .collect();

        if !self.kv.update(&record::namespace(id), &fields)? {
            return Err(LobbyError::NotFound(id));
        }
        debug!(lobby_id = %id, keys = fields.len(), "lobby updated");

        self.mirror(id, &fields).await;
        Ok(())
    }

    async fn mirror(&self, id: LobbyId, fields: &Fields) {
        if fields.is_empty() {
            return;
        }
        let err = match self.durable.record_lobby_stats(id, fields).await {
            Ok(()) => return,
            Err(err) => err,
        };
        if !err.is_conflict() {
            warn!(lobby_id = %id, error = %err, "failed to mirror lobby stats");
            return;
        }
        warn!(lobby_id = %id, error = %err, "lobby stats write conflicted, retrying once");
        if let Err(err) = self.durable.record_lobby_stats(id, fields).await {
            warn!(
                lobby_id = %id,
                error = %err,
                "failed to mirror lobby stats on the second try"
            );
        }
    }

    /// Reads one lobby.
    pub fn query_lobby(&self, id: LobbyId) -> Result<LobbyRecord, LobbyError> {
        let fields = self
            .kv
            .get_all(&record::namespace(id))?
            .ok_or(LobbyError::NotFound(id))?;
        Ok(LobbyRecord::from_fields(id, fields))
    }

    /// The connection that owns `id`, while it is connected.
    pub fn owner(&self, id: LobbyId) -> Option<ConnectionId> {
        self.owners.get(&id).map(|r| *r.value())
    }

    /// Lobbies currently owned by `conn_id`, lowest id first.
    pub fn lobbies_owned_by(&self, conn_id: ConnectionId) -> Vec<LobbyId> {
        let mut ids: Vec<_> = self
            .owners
            .iter()
            .filter(|r| *r.value() == conn_id)
            .map(|r| *r.key())
            .collect();
        ids.sort();
        ids
    }

    /// The well-known lobby: the lowest id that still has an owner.
    pub fn default_lobby(&self) -> Option<LobbyId> {
        self.owners.iter().map(|r| *r.key()).min()
    }

    /// Picks the lobby a join should target: `requested` if it has a live
    /// owner, otherwise the default lobby.
    pub fn resolve_target(&self, requested: Option<LobbyId>) -> Option<LobbyId> {
        match requested {
            Some(id) if self.owners.contains_key(&id) => Some(id),
            Some(id) => {
                debug!(lobby_id = %id, "requested lobby has no live owner, using default");
                self.default_lobby()
            }
            None => self.default_lobby(),
        }
    }

    /// Forgets `conn_id` as owner of its lobbies. Records stay.
    pub fn release_owner(&self, conn_id: ConnectionId) -> Vec<LobbyId> {
        let released = self.lobbies_owned_by(conn_id);
        for id in &released {
            self.owners.remove_if(id, |_, owner| *owner == conn_id);
            info!(lobby_id = %id, %conn_id, "lobby owner disconnected");
        }
        released
    }

    /// Number of lobbies with a connected owner.
    pub fn live_count(&self) -> usize {
        self.owners.len()
    }
}
