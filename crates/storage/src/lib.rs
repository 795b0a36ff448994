#![deny(missing_docs)]
//! # Storage
//!
//! The keyed, TTL-capable store contract the pre-ranking engine runs
//! against, plus the typed layers built on top of it: the event cursor,
//! the per-intent record tree and the ranking handoff queue.
//!
//! Backends implement [`KeyValueStore`]; everything else in the workspace
//! goes through the typed layers so key schema and record encoding live in
//! exactly one place.

use std::time::Duration;

use preranker_types::{
    EventCursor, FailedRecord, Intent, PassedRecord, RankingPayload, SolutionRecord,
};

pub mod keys;

/// Errors surfaced by a store backend or by record decoding.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend failed or was unreachable. Retryable at the caller's
    /// discretion.
    #[error("store backend error: {0}")]
    Backend(String),
    /// A stored record failed to decode.
    #[error("corrupt record: {0}")]
    Codec(#[from] serde_json::Error),
}

/// The keyed state store contract.
///
/// Semantics follow the conventional string/set/list command families:
/// `set` with an optional expiry, idempotent `set_add` reporting whether the
/// member was new, and an append-only `list_push`. All writes are durable
/// when the call returns `Ok`. Listing operations return every member whose
/// write succeeded, modulo expiry.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Set `key` to `value`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>)
        -> Result<(), StoreError>;

    /// Get the value at `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Add `member` to the set at `key`, creating the set if absent.
    /// Returns true iff the member was not already present.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// All members of the set at `key`. Empty if absent or expired.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Cardinality of the set at `key`. Zero if absent or expired.
    async fn set_card(&self, key: &str) -> Result<u64, StoreError>;

    /// Append `value` to the list at `key`, creating the list if absent.
    async fn list_push(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Elements of the list at `key` from `start` to `stop` inclusive,
    /// negative indices counting from the tail.
    async fn list_range(&self, key: &str, start: i64, stop: i64)
        -> Result<Vec<String>, StoreError>;

    /// Delete the given keys. Missing keys are ignored.
    async fn del(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Set or refresh the expiry of an existing key. A missing key is a
    /// no-op.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// Persists the last-consumed event position.
///
/// `store` is durable before it returns; a failed `store` leaves the cursor
/// at its previous durable value.
#[derive(Clone)]
pub struct CursorStore<S> {
    store: S,
}

impl<S: KeyValueStore> CursorStore<S> {
    /// Wrap a backend.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The last durably stored cursor, if any.
    pub async fn load(&self) -> Result<Option<EventCursor>, StoreError> {
        match self.store.get(keys::CURSOR).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Durably store `cursor`. The cursor never expires.
    pub async fn store(&self, cursor: &EventCursor) -> Result<(), StoreError> {
        let raw = serde_json::to_string(cursor)?;
        self.store.set(keys::CURSOR, raw, None).await
    }
}

/// What happened to a pass/fail record write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordWrite {
    /// The record was written and its set membership added.
    Recorded,
    /// A record for this `(intent_id, solution_id)` already existed; the
    /// write was a no-op. Normal under event replay.
    Duplicate,
    /// The intent tree no longer exists; the write was discarded.
    Discarded,
}

/// Typed per-intent record tree over a [`KeyValueStore`].
///
/// The `(intent_id, solution_id)` pair is the primary key of solution
/// records; repeated writes for the same pair are no-ops, which makes the
/// pipeline idempotent under event replay.
#[derive(Clone)]
pub struct IntentStore<S> {
    store: S,
    ttl: Duration,
}

impl<S: KeyValueStore> IntentStore<S> {
    /// Wrap a backend, applying `ttl` to every record written.
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Persist an intent body.
    pub async fn put_intent(&self, intent: &Intent) -> Result<(), StoreError> {
        let raw = serde_json::to_string(intent)?;
        self.store
            .set(&keys::intent(&intent.intent_id), raw, Some(self.ttl))
            .await
    }

    /// Fetch an intent body.
    pub async fn get_intent(&self, intent_id: &str) -> Result<Option<Intent>, StoreError> {
        match self.store.get(&keys::intent(intent_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Record a passed solution under `(intent_id, solution_id)`.
    pub async fn record_passed(
        &self,
        intent_id: &str,
        record: PassedRecord,
    ) -> Result<RecordWrite, StoreError> {
        let solution_id = record.solution_id.clone();
        self.record(
            intent_id,
            &solution_id,
            &keys::passed_set(intent_id),
            SolutionRecord::Passed(record),
        )
        .await
    }

    /// Record a failed solution under `(intent_id, solution_id)`.
    pub async fn record_failed(
        &self,
        intent_id: &str,
        record: FailedRecord,
    ) -> Result<RecordWrite, StoreError> {
        let solution_id = record.solution_id.clone();
        self.record(
            intent_id,
            &solution_id,
            &keys::failed_set(intent_id),
            SolutionRecord::Failed(record),
        )
        .await
    }

    async fn record(
        &self,
        intent_id: &str,
        solution_id: &str,
        set_key: &str,
        record: SolutionRecord,
    ) -> Result<RecordWrite, StoreError> {
        // Writes against a deleted intent tree are discarded, not errors:
        // an in-flight pipeline may complete after its intent flushed.
        if self.get_intent(intent_id).await?.is_none() {
            tracing::debug!(intent_id, solution_id, "record write after tree deletion, discarding");
            return Ok(RecordWrite::Discarded);
        }
        let added = self.store.set_add(set_key, solution_id).await?;
        if !added {
            return Ok(RecordWrite::Duplicate);
        }
        let raw = serde_json::to_string(&record)?;
        self.store
            .set(&keys::solution(intent_id, solution_id), raw, Some(self.ttl))
            .await?;
        self.store.expire(set_key, self.ttl).await?;
        Ok(RecordWrite::Recorded)
    }

    /// All passed records of an intent.
    pub async fn list_passed(&self, intent_id: &str) -> Result<Vec<PassedRecord>, StoreError> {
        let members = self.store.set_members(&keys::passed_set(intent_id)).await?;
        let mut records = Vec::with_capacity(members.len());
        for solution_id in members {
            let Some(raw) = self.store.get(&keys::solution(intent_id, &solution_id)).await?
            else {
                // Record expired out from under its set entry.
                tracing::debug!(intent_id, solution_id, "passed record missing, skipping");
                continue;
            };
            match serde_json::from_str(&raw)? {
                SolutionRecord::Passed(record) => records.push(record),
                SolutionRecord::Failed(_) => {
                    tracing::warn!(intent_id, solution_id, "failed record in passed set");
                }
            }
        }
        Ok(records)
    }

    /// Cardinality of an intent's passed set.
    pub async fn count_passed(&self, intent_id: &str) -> Result<u64, StoreError> {
        self.store.set_card(&keys::passed_set(intent_id)).await
    }

    /// Cardinality of an intent's failed set.
    pub async fn count_failed(&self, intent_id: &str) -> Result<u64, StoreError> {
        self.store.set_card(&keys::failed_set(intent_id)).await
    }

    /// Delete an intent's body, both sets and every per-solution record.
    pub async fn delete_intent_tree(&self, intent_id: &str) -> Result<(), StoreError> {
        let mut to_delete = vec![
            keys::intent(intent_id),
            keys::passed_set(intent_id),
            keys::failed_set(intent_id),
        ];
        for set_key in [keys::passed_set(intent_id), keys::failed_set(intent_id)] {
            for solution_id in self.store.set_members(&set_key).await? {
                to_delete.push(keys::solution(intent_id, &solution_id));
            }
        }
        self.store.del(&to_delete).await
    }
}

/// At-least-once handoff of flush payloads to the ranking consumer.
#[derive(Clone)]
pub struct RankingQueue<S> {
    store: S,
}

impl<S: KeyValueStore> RankingQueue<S> {
    /// Wrap a backend.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Append a payload to the consumer queue.
    pub async fn push(&self, payload: &RankingPayload) -> Result<(), StoreError> {
        let raw = serde_json::to_string(payload)?;
        self.store.list_push(keys::RANKING_QUEUE, raw).await
    }

    /// Number of payloads currently queued.
    pub async fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .store
            .list_range(keys::RANKING_QUEUE, 0, -1)
            .await?
            .len())
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// All queued payloads, oldest first.
    pub async fn snapshot(&self) -> Result<Vec<RankingPayload>, StoreError> {
        let raws = self.store.list_range(keys::RANKING_QUEUE, 0, -1).await?;
        let mut payloads = Vec::with_capacity(raws.len());
        for raw in raws {
            payloads.push(serde_json::from_str(&raw)?);
        }
        Ok(payloads)
    }
}
