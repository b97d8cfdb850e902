//! Context accumulation
//!
//! A [`ContextStore`] collects metadata that is attached to every record a
//! handle emits. Keys are write-once: the first value wins and later writes
//! are reported as collisions. The store never grows past its key cap.

use crate::reserved::is_reserved;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Accumulated metadata: scalar or array-of-scalar values by key
pub type ContextRecord = BTreeMap<String, Value>;

/// A rejected overwrite of an existing key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    pub key: String,
    pub existing_value: Value,
    pub attempted_value: Value,
}

/// Outcome of [`ContextStore::add`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextValidation {
    /// Keys that already had a value (original kept)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collisions: Vec<Collision>,

    /// Reserved names that were refused
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reserved: Vec<String>,

    /// Keys refused because the store was full
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<String>,
}

impl ContextValidation {
    pub fn is_clean(&self) -> bool {
        self.collisions.is_empty() && self.reserved.is_empty() && self.dropped.is_empty()
    }

    /// Append another outcome to this one
    pub fn merge(&mut self, other: ContextValidation) {
        self.collisions.extend(other.collisions);
        self.reserved.extend(other.reserved);
        self.dropped.extend(other.dropped);
    }

    /// Total number of entries
    pub fn count(&self) -> usize {
        self.collisions.len() + self.reserved.len() + self.dropped.len()
    }

    /// Append `other` while keeping at most `limit` entries in total.
    ///
    /// Returns how many entries of `other` did not fit.
    pub fn merge_bounded(&mut self, other: ContextValidation, limit: usize) -> usize {
        let mut room = limit.saturating_sub(self.count());
        let mut discarded = 0;
        append_bounded(&mut self.collisions, other.collisions, &mut room, &mut discarded);
        append_bounded(&mut self.reserved, other.reserved, &mut room, &mut discarded);
        append_bounded(&mut self.dropped, other.dropped, &mut room, &mut discarded);
        discarded
    }
}

fn append_bounded<T>(into: &mut Vec<T>, items: Vec<T>, room: &mut usize, discarded: &mut usize) {
    for item in items {
        if *room == 0 {
            *discarded += 1;
        } else {
            *room -= 1;
            into.push(item);
        }
    }
}

/// Whether a value can be stored as context
pub fn is_context_value(value: &Value) -> bool {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
        Value::Array(items) => items
            .iter()
            .all(|v| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))),
        Value::Null | Value::Object(_) => false,
    }
}

/// Write-once metadata store with a key cap
#[derive(Debug, Clone)]
pub struct ContextStore {
    values: ContextRecord,
    max_keys: usize,
}

impl ContextStore {
    /// Create a store and run `initial` through [`add`](Self::add)
    pub fn new<I, K, V>(initial: I, max_keys: usize) -> (Self, ContextValidation)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut store = Self::empty(max_keys);
        let outcome = store.add(initial);
        (store, outcome)
    }

    pub fn empty(max_keys: usize) -> Self {
        Self {
            values: ContextRecord::new(),
            max_keys,
        }
    }

    /// Seed from a snapshot of another store.
    ///
    /// The snapshot already satisfies the store invariants, so it is taken
    /// as-is (truncated to `max_keys` in key order if it is larger).
    pub fn seeded(snapshot: ContextRecord, max_keys: usize) -> Self {
        let values = if snapshot.len() > max_keys {
            snapshot.into_iter().take(max_keys).collect()
        } else {
            snapshot
        };
        Self { values, max_keys }
    }

    /// Merge `record` into the store.
    ///
    /// Each key is checked in order: reserved names are refused, non-scalar
    /// values are skipped, existing keys (including ones accepted earlier in
    /// this same call) are collisions, and once the cap is hit remaining
    /// keys are dropped. Never fails.
    pub fn add<I, K, V>(&mut self, record: I) -> ContextValidation
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut outcome = ContextValidation::default();

        for (key, value) in record {
            let key = key.into();
            let value = value.into();

            if is_reserved(&key) {
                outcome.reserved.push(key);
                continue;
            }

            if !is_context_value(&value) {
                debug!("Skipping non-scalar context value for key: {}", key);
                continue;
            }

            if let Some(existing) = self.values.get(&key) {
                outcome.collisions.push(Collision {
                    key,
                    existing_value: existing.clone(),
                    attempted_value: value,
                });
                continue;
            }

            if self.values.len() >= self.max_keys {
                outcome.dropped.push(key);
                continue;
            }

            self.values.insert(key, value);
        }

        if !outcome.collisions.is_empty() {
            warn!(
                "Context collisions, original values kept: {:?}",
                outcome
                    .collisions
                    .iter()
                    .map(|c| c.key.as_str())
                    .collect::<Vec<_>>()
            );
        }
        if !outcome.dropped.is_empty() {
            warn!(
                "Context key limit {} reached, dropped: {:?}",
                self.max_keys, outcome.dropped
            );
        }

        outcome
    }

    /// Immutable copy of the current values
    pub fn snapshot(&self) -> ContextRecord {
        self.values.clone()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }
}

/// Build a [`ContextRecord`]
///
/// ```
/// let ctx = evtrail_core::context! { "user" => "alice", "attempt" => 2 };
/// assert_eq!(ctx.len(), 2);
/// ```
#[macro_export]
macro_rules! context {
    () => {
        $crate::context::ContextRecord::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::context::ContextRecord::new();
        $(
            map.insert(::std::string::String::from($key), $crate::serde_json::Value::from($value));
        )+
        map
    }};
}
