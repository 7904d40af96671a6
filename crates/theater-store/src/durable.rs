//! The durable store: identities, long-term stats, and the best-effort
//! mirror of lobby attributes.
//!
//! The core only reads identities and stats from here and mirrors lobby
//! stats into it. It is never the source of truth for handshake state.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;
use theater_protocol::{AccountId, Fields, Identity, LobbyId, PlayerId};
use tracing::debug;

use crate::StoreError;

/// One stat row returned by [`DurableStore::fetch_stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEntry {
    pub key: String,
    pub value: String,
}

/// Async access to the durable relational store.
pub trait DurableStore: Send + Sync + 'static {
    /// Resolves an account to its persona. `Ok(None)` means not found.
    fn lookup_identity(
        &self,
        account_id: AccountId,
    ) -> impl Future<Output = Result<Option<Identity>, StoreError>> + Send;

    /// Upserts a batch of stats for one lobby.
    fn record_lobby_stats(
        &self,
        lobby_id: LobbyId,
        stats: &Fields,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads the named stats of `owner` as seen by `account_id`. Keys
    /// with no stored value are omitted; the rest keep request order.
    fn fetch_stats(
        &self,
        owner: &str,
        account_id: AccountId,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<StatEntry>, StoreError>> + Send;
}

/// In-process [`DurableStore`] with seeding and fault injection.
#[derive(Debug, Default)]
pub struct MemoryDurableStore {
    identities: DashMap<AccountId, (PlayerId, String)>,
    stats: DashMap<(String, AccountId), Fields>,
    lobby_stats: DashMap<LobbyId, Fields>,
    pending_conflicts: AtomicU32,
    stat_writes: AtomicU64,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a persona for `account_id`.
    pub fn insert_identity(&self, account_id: AccountId, player_id: PlayerId, nickname: &str) {
        self.identities
            .insert(account_id, (player_id, nickname.to_string()));
    }

    /// Seeds one stat of `owner` for `account_id`.
    pub fn insert_stat(&self, owner: &str, account_id: AccountId, key: &str, value: &str) {
        self.stats
            .entry((owner.to_string(), account_id))
            .or_default()
            .insert(key, value);
    }

    /// Makes the next `count` lobby-stat writes fail with a conflict.
    pub fn fail_next_writes(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Lobby stats mirrored so far.
    pub fn lobby_stats(&self, lobby_id: LobbyId) -> Option<Fields> {
        self.lobby_stats.get(&lobby_id).map(|r| r.value().clone())
    }

    /// Number of `record_lobby_stats` calls, failed ones included.
    pub fn stat_write_attempts(&self) -> u64 {
        self.stat_writes.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DurableStore for MemoryDurableStore {
    async fn lookup_identity(&self, account_id: AccountId) -> Result<Option<Identity>, StoreError> {
        Ok(self.identities.get(&account_id).map(|r| {
            let (player_id, nickname) = r.value().clone();
            Identity {
                account_id,
                nickname,
                player_id,
            }
        }))
    }

    async fn record_lobby_stats(&self, lobby_id: LobbyId, stats: &Fields) -> Result<(), StoreError> {
        self.stat_writes.fetch_add(1, Ordering::SeqCst);
        if self.take_conflict() {
            return Err(StoreError::Conflict(
                "deadlock found when trying to get lock".into(),
            ));
        }

        let mut record = self.lobby_stats.entry(lobby_id).or_default();
        for (key, value) in stats.iter() {
            record.insert(key, value);
        }
        debug!(%lobby_id, keys = stats.len(), "lobby stats mirrored");
        Ok(())
    }

    async fn fetch_stats(
        &self,
        owner: &str,
        account_id: AccountId,
        keys: &[String],
    ) -> Result<Vec<StatEntry>, StoreError> {
        let Some(record) = self.stats.get(&(owner.to_string(), account_id)) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|key| {
                record.get(key).map(|value| StatEntry {
                    key: key.clone(),
                    value: value.to_string(),
                })
            })
            .collect())
    }
}
