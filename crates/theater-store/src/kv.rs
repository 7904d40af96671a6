//! The shared key-value store.
//!
//! Records live in namespaces (`gameServer-7`, `gameServer-config`) and
//! are flat string maps. Every operation on one namespace is atomic with
//! respect to every other operation on the same namespace.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use theater_protocol::Fields;

use crate::StoreError;

/// Synchronous access to the shared key-value store.
///
/// Object safe so the registry can hold an `Arc<dyn KvStore>`.
pub trait KvStore: Send + Sync + 'static {
    /// All fields of `namespace`, or `None` if it was never written.
    fn get_all(&self, namespace: &str) -> Result<Option<Fields>, StoreError>;

    /// One field of `namespace`.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError>;

    /// Sets one field, creating the namespace if needed.
    fn set(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError>;

    /// Merges `fields` into `namespace` in one atomic step, creating it if
    /// needed.
    fn set_many(&self, namespace: &str, fields: &Fields) -> Result<(), StoreError>;

    /// Writes `fields` as a brand-new namespace. Returns `false` and
    /// leaves the store untouched if the namespace already exists.
    fn create(&self, namespace: &str, fields: &Fields) -> Result<bool, StoreError>;

    /// Merges `fields` into an existing namespace. Returns `false`
    /// without creating anything if the namespace does not exist.
    fn update(&self, namespace: &str, fields: &Fields) -> Result<bool, StoreError>;

    /// Atomically increments the integer at `key` (missing counts as 0)
    /// and returns the new value.
    fn incr(&self, namespace: &str, key: &str) -> Result<u64, StoreError>;

    fn exists(&self, namespace: &str) -> Result<bool, StoreError>;
}

/// In-process [`KvStore`] backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryKv {
    namespaces: DashMap<String, Fields>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of namespaces written so far.
    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

fn merge(target: &mut Fields, fields: &Fields) {
    for (key, value) in fields.iter() {
        target.insert(key, value);
    }
}

impl KvStore for MemoryKv {
    fn get_all(&self, namespace: &str) -> Result<Option<Fields>, StoreError> {
        Ok(self.namespaces.get(namespace).map(|r| r.value().clone()))
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .namespaces
            .get(namespace)
            .and_then(|r| r.value().get(key).map(str::to_string)))
    }

    fn set(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key, value);
        Ok(())
    }

    fn set_many(&self, namespace: &str, fields: &Fields) -> Result<(), StoreError> {
        let mut entry = self.namespaces.entry(namespace.to_string()).or_default();
        merge(entry.value_mut(), fields);
        Ok(())
    }

    fn create(&self, namespace: &str, fields: &Fields) -> Result<bool, StoreError> {
        match self.namespaces.entry(namespace.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(fields.clone());
                Ok(true)
            }
        }
    }

    fn update(&self, namespace: &str, fields: &Fields) -> Result<bool, StoreError> {
        match self.namespaces.get_mut(namespace) {
            Some(mut record) => {
                merge(record.value_mut(), fields);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn incr(&self, namespace: &str, key: &str) -> Result<u64, StoreError> {
        let mut entry = self.namespaces.entry(namespace.to_string()).or_default();
        let record = entry.value_mut();
        let next = match record.get(key) {
            None => 1,
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(|current| current.checked_add(1))
                .ok_or_else(|| StoreError::InvalidCounter {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    value: raw.to_string(),
                })?,
        };
        record.insert(key, next.to_string());
        Ok(next)
    }

    fn exists(&self, namespace: &str) -> Result<bool, StoreError> {
        Ok(self.namespaces.contains_key(namespace))
    }
}
