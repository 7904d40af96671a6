//! Storage seams for the Theater core.
//!
//! Two stores back the registry and the handlers:
//!
//! - [`KvStore`]: the shared key-value store holding live lobby records
//!   and the lobby id counter. Authoritative for everything live.
//! - [`DurableStore`]: the relational store holding identities and
//!   long-term stats, plus a best-effort mirror of lobby stats.
//!
//! Both come with in-process implementations ([`MemoryKv`],
//! [`MemoryDurableStore`]) for embedding and tests.

mod durable;
mod error;
mod kv;

pub use durable::{DurableStore, MemoryDurableStore, StatEntry};
pub use error::StoreError;
pub use kv::{KvStore, MemoryKv};
