#![deny(missing_docs)]
//! # Redis storage
//!
//! [`KeyValueStore`] backed by a remote Redis server. The production
//! backend: record TTLs map onto native key expiry and the ranking queue is
//! a plain list the consumer `BLPOP`s from.

use preranker_storage::{KeyValueStore, StoreError};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;

/// Redis-backed store. Safe to clone; clones share the underlying
/// connection manager, which reconnects on failure.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

fn backend_err(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// TTLs are applied with second granularity; sub-second remainders round up
/// so a short TTL never means no TTL.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisStore {
    /// Connect to the Redis server at `url` and verify it is reachable.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend_err)?;
        let mut manager = ConnectionManager::new(client).await.map_err(backend_err)?;
        redis::cmd("PING")
            .query_async::<_, ()>(&mut manager)
            .await
            .map_err(backend_err)?;
        Ok(Self { manager })
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        match ttl {
            Some(ttl) => con
                .set_ex::<_, _, ()>(key, value, ttl_secs(ttl))
                .await
                .map_err(backend_err),
            None => con.set::<_, _, ()>(key, value).await.map_err(backend_err),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.manager.clone();
        con.get(key).await.map_err(backend_err)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut con = self.manager.clone();
        let added: i64 = con.sadd(key, member).await.map_err(backend_err)?;
        Ok(added == 1)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut con = self.manager.clone();
        con.smembers(key).await.map_err(backend_err)
    }

    async fn set_card(&self, key: &str) -> Result<u64, StoreError> {
        let mut con = self.manager.clone();
        con.scard(key).await.map_err(backend_err)
    }

    async fn list_push(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        con.rpush::<_, _, ()>(key, value).await.map_err(backend_err)
    }

    async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        let mut con = self.manager.clone();
        con.lrange(key, start as isize, stop as isize)
            .await
            .map_err(backend_err)
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut con = self.manager.clone();
        con.del::<_, ()>(keys).await.map_err(backend_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        con.expire::<_, ()>(key, ttl_secs(ttl) as i64)
            .await
            .map_err(backend_err)
    }
}
