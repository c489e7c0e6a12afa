//! In-memory key space carried by every peer and shipped whole or in part
//! by `TRANSFER_KEYS` / `MOVE_ALL_KEYS` / overlay dumps.
//!
//! Two levels: `key_id → key → set of values`. Distinct keys can collide to
//! the same id under a small identifier space, and one key can carry many
//! values (uploader tags), hence map-of-map-of-set. Empty inner structures
//! are pruned on removal so presence of a `key_id` always means data.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Set-valued two-level map. Serializes with ids as JSON object keys and
/// value sets as arrays; deserializing an array restores the set.
///
/// Deserialization is hand-rolled because ids arrive as JSON object keys
/// (strings), and inside the `"cmd"`-tagged request envelope serde buffers
/// content without the string-to-integer key coercion serde_json applies
/// at the top level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Store(BTreeMap<u64, BTreeMap<String, BTreeSet<String>>>);

/// A key id that accepts either a JSON number or a stringified number.
struct KeyId(u64);

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyIdVisitor;

        impl Visitor<'_> for KeyIdVisitor {
            type Value = KeyId;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a key id as an integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<KeyId, E> {
                Ok(KeyId(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<KeyId, E> {
                v.parse().map(KeyId).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(KeyIdVisitor)
    }
}

impl<'de> Deserialize<'de> for Store {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StoreVisitor;

        impl<'de> Visitor<'de> for StoreVisitor {
            type Value = Store;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map from key id to key/value-set maps")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Store, A::Error> {
                let mut out = BTreeMap::new();
                while let Some((KeyId(id), inner)) =
                    map.next_entry::<KeyId, BTreeMap<String, BTreeSet<String>>>()?
                {
                    out.insert(id, inner);
                }
                Ok(Store(out))
            }
        }

        deserializer.deserialize_map(StoreVisitor)
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Union `values` into the set stored under `(key_id, key)`.
    pub fn insert<I>(&mut self, key_id: u64, key: &str, values: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.0
            .entry(key_id)
            .or_default()
            .entry(key.to_string())
            .or_default()
            .extend(values);
    }

    /// Remove one `value` from `(key_id, key)`, pruning emptied entries.
    /// Returns whether the tuple was present.
    pub fn remove(&mut self, key_id: u64, key: &str, value: &str) -> bool {
        let Some(inner) = self.0.get_mut(&key_id) else {
            return false;
        };
        let Some(set) = inner.get_mut(key) else {
            return false;
        };
        if !set.remove(value) {
            return false;
        }
        if set.is_empty() {
            inner.remove(key);
        }
        if inner.is_empty() {
            self.0.remove(&key_id);
        }
        true
    }

    /// Values stored under `(key_id, key)`, if any.
    pub fn values(&self, key_id: u64, key: &str) -> Option<Vec<String>> {
        self.0
            .get(&key_id)
            .and_then(|inner| inner.get(key))
            .map(|set| set.iter().cloned().collect())
    }

    pub fn contains(&self, key_id: u64, key: &str) -> bool {
        self.0
            .get(&key_id)
            .is_some_and(|inner| inner.contains_key(key))
    }

    /// Set-union another store into this one.
    pub fn merge(&mut self, other: Store) {
        for (key_id, inner) in other.0 {
            for (key, values) in inner {
                self.insert(key_id, &key, values);
            }
        }
    }

    /// Copy of the entries whose id satisfies `pred`.
    pub fn subset<F>(&self, pred: F) -> Store
    where
        F: Fn(u64) -> bool,
    {
        Store(
            self.0
                .iter()
                .filter(|(id, _)| pred(**id))
                .map(|(id, inner)| (*id, inner.clone()))
                .collect(),
        )
    }

    /// Remove and return the entries whose id satisfies `pred`.
    pub fn take<F>(&mut self, pred: F) -> Store
    where
        F: Fn(u64) -> bool,
    {
        let ids: Vec<u64> = self.0.keys().copied().filter(|id| pred(*id)).collect();
        let mut out = BTreeMap::new();
        for id in ids {
            if let Some(inner) = self.0.remove(&id) {
                out.insert(id, inner);
            }
        }
        Store(out)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
