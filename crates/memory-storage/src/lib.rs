//! In-memory implementation of the keyed state store.
//!
//! Used by tests and by nodes run without an external store. Expiry is
//! enforced lazily: an expired key behaves exactly like a missing one and is
//! removed the next time it is touched.

use preranker_storage::{KeyValueStore, StoreError};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

mod lock;

use lock::Lock;

#[cfg(test)]
mod tests;

/// A TTL-capable in-memory key-value store. Cheap to clone; clones share
/// state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Lock<Inner>>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

enum Value {
    Str(String),
    Set(HashSet<String>),
    List(Vec<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Set(_) => "set",
            Value::List(_) => "list",
        }
    }
}

fn wrong_type(key: &str, found: &Value, wanted: &str) -> StoreError {
    StoreError::Backend(format!(
        "key {key:?} holds a {}, expected a {wanted}",
        found.type_name()
    ))
}

impl Inner {
    /// The live entry at `key`, reaping it first if expired.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at.is_some_and(|at| at <= Instant::now()) {
                self.entries.remove(key);
                return None;
            }
        }
        self.entries.get_mut(key)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Lock::new(Inner::default())),
        }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.inner.apply(|i| {
            i.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(value),
                    expires_at: ttl.map(|t| Instant::now() + t),
                },
            );
            Ok(())
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.apply(|i| match i.live(key) {
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                other => Err(wrong_type(key, other, "string")),
            },
            None => Ok(None),
        })
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.apply(|i| {
            // Reap a stale entry first so the slot below starts clean.
            let _ = i.live(key);
            let entry = i.entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Set(HashSet::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Set(set) => Ok(set.insert(member.to_string())),
                other => Err(wrong_type(key, other, "set")),
            }
        })
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.apply(|i| match i.live(key) {
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                other => Err(wrong_type(key, other, "set")),
            },
            None => Ok(Vec::new()),
        })
    }

    async fn set_card(&self, key: &str) -> Result<u64, StoreError> {
        self.inner.apply(|i| match i.live(key) {
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.len() as u64),
                other => Err(wrong_type(key, other, "set")),
            },
            None => Ok(0),
        })
    }

    async fn list_push(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.inner.apply(|i| {
            let _ = i.live(key);
            let entry = i.entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::List(Vec::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::List(list) => {
                    list.push(value);
                    Ok(())
                }
                other => Err(wrong_type(key, other, "list")),
            }
        })
    }

    async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        self.inner.apply(|i| match i.live(key) {
            Some(entry) => match &entry.value {
                Value::List(list) => {
                    let len = list.len() as i64;
                    let resolve = |idx: i64| -> i64 {
                        if idx < 0 {
                            (len + idx).max(0)
                        } else {
                            idx
                        }
                    };
                    let start = resolve(start).min(len) as usize;
                    let stop = resolve(stop).min(len - 1);
                    if stop < start as i64 {
                        return Ok(Vec::new());
                    }
                    Ok(list[start..=stop as usize].to_vec())
                }
                other => Err(wrong_type(key, other, "list")),
            },
            None => Ok(Vec::new()),
        })
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        self.inner.apply(|i| {
            for key in keys {
                i.entries.remove(key);
            }
            Ok(())
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.apply(|i| {
            if let Some(entry) = i.live(key) {
                entry.expires_at = Some(Instant::now() + ttl);
            }
            Ok(())
        })
    }
}
