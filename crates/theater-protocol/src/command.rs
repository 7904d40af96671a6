//! The command envelope: an operation code plus ordered tag-value fields.
//!
//! Everything the transport hands us, and everything we hand back, is a
//! [`Command`]. Fields keep insertion order so responses go out in the
//! order handlers wrote them.
//!
//! # Arrays
//!
//! The protocol has no native list type. Lists are spelled with a
//! count key and indexed element keys:
//!
//! ```text
//! keys.[]=2  keys.0=level  keys.1=xp
//! stats.[]=1 stats.0.key=level stats.0.value=5
//! ```
//!
//! [`Fields::insert_list`], [`Fields::insert_records`] and
//! [`Fields::list`] read and write that convention.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Op, ProtocolError};

/// Payload tag used by every command this core produces.
pub const DEFAULT_PAYLOAD: u32 = 0;

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// An insertion-ordered string map.
///
/// Commands rarely carry more than a few dozen keys, so a vector with
/// linear lookup beats hashing here and keeps wire order for free.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(Vec<(String, String)>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key` to `value`. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Writes `name.[]` and `name.N` for each item.
    pub fn insert_list<I, S>(&mut self, name: &str, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut count = 0usize;
        for item in items {
            self.insert(format!("{name}.{count}"), item);
            count += 1;
        }
        self.insert(format!("{name}.[]"), count.to_string());
    }

    /// Writes `name.N.subkey` for each record and `name.[]` for the count.
    pub fn insert_records<'a, R>(&mut self, name: &str, records: R)
    where
        R: IntoIterator<Item = &'a [(&'a str, String)]>,
    {
        let mut count = 0usize;
        for record in records {
            for (sub, value) in record {
                self.insert(format!("{name}.{count}.{sub}"), value.clone());
            }
            count += 1;
        }
        self.insert(format!("{name}.[]"), count.to_string());
    }

    /// Reads a plain list written as `name.[]` + `name.N`.
    ///
    /// A missing count means an empty list. Missing elements inside the
    /// advertised count are skipped rather than failing the command. The
    /// work is bounded by the fields present, not by the count.
    pub fn list(&self, name: &str) -> Result<Vec<String>, ParseListError> {
        let count_key = format!("{name}.[]");
        let count = match self.get(&count_key) {
            None => return Ok(Vec::new()),
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| ParseListError {
                key: count_key.clone(),
                value: raw.to_string(),
            })?,
        };
        let prefix = format!("{name}.");
        let mut items: Vec<(usize, &str)> = self
            .iter()
            .filter_map(|(k, v)| {
                let index = k.strip_prefix(&prefix)?.parse::<usize>().ok()?;
                (index < count).then_some((index, v))
            })
            .collect();
        items.sort_by_key(|&(index, _)| index);
        Ok(items.into_iter().map(|(_, v)| v.to_string()).collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// A list count key that did not hold a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseListError {
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Operation code; selects the handler.
    pub op: Op,
    /// Numeric payload tag from the packet header.
    pub payload: u32,
    /// Tag-value body.
    pub fields: Fields,
}

impl Command {
    /// An empty command for `op` with the default payload tag.
    pub fn new(op: Op) -> Self {
        Self {
            op,
            payload: DEFAULT_PAYLOAD,
            fields: Fields::new(),
        }
    }

    /// A reply to `self`: same op, `TID` echoed when present.
    pub fn reply(&self) -> Self {
        let mut out = Self::new(self.op.clone());
        out.payload = self.payload;
        if let Some(tid) = self.tid() {
            out.fields.insert("TID", tid);
        }
        out
    }

    /// Builder-style field insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key, value);
        self
    }

    /// Copies `key` from `source` when present.
    pub fn echo(mut self, source: &Command, key: &str) -> Self {
        if let Some(value) = source.get(key) {
            self.fields.insert(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key)
    }

    /// Transaction id, echoed back on most responses.
    pub fn tid(&self) -> Option<&str> {
        self.get("TID")
    }

    /// Transaction name used by the FESL side (`TXN`).
    pub fn txn(&self) -> Option<&str> {
        self.get("TXN")
    }

    /// Returns `key` or a [`ProtocolError::MissingField`].
    pub fn require(&self, key: &str) -> Result<&str, ProtocolError> {
        self.get(key).ok_or_else(|| ProtocolError::MissingField {
            op: self.op.to_string(),
            field: key.to_string(),
        })
    }

    /// Parses a required field.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<T, ProtocolError> {
        let raw = self.require(key)?;
        raw.trim().parse().map_err(|_| self.invalid(key, raw))
    }

    /// Parses an optional field; absent or blank yields `None`.
    pub fn parse_opt<T: FromStr>(&self, key: &str) -> Result<Option<T>, ProtocolError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(key, raw)),
        }
    }

    /// Reads a `name.[]`/`name.N` list.
    pub fn list(&self, name: &str) -> Result<Vec<String>, ProtocolError> {
        self.fields
            .list(name)
            .map_err(|e| self.invalid(&e.key, &e.value))
    }

    /// Fails with [`ProtocolError::UnexpectedOp`] unless `self.op == op`.
    pub fn expect_op(&self, op: Op) -> Result<(), ProtocolError> {
        if self.op == op {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedOp {
                expected: op.to_string(),
                actual: self.op.to_string(),
            })
        }
    }

    fn invalid(&self, key: &str, raw: &str) -> ProtocolError {
        ProtocolError::InvalidField {
            op: self.op.to_string(),
            field: key.to_string(),
            value: raw.to_string(),
        }
    }
}

/// Strips one pair of surrounding double quotes, as servers send them
/// around free-text attributes.
pub fn unquote(value: &str) -> &str {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}
