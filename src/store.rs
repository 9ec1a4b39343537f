//! Key-value storage contract for cache and rate-limit backends.
//!
//! The core never talks to storage directly — hooks do, through this trait.
//! The operation set mirrors what the framework's hooks need from a store
//! like Redis: string get/set with expiry, existence, counters, and TTL
//! introspection. [`MemoryStore`] is a TTL-aware in-memory implementation
//! for demos, tests, and single-process deployments.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::HttpError;
use crate::status::Status;

/// Error type for store operations.
#[derive(Clone, Debug)]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store: {}", self.message)
    }
}

impl std::error::Error for StoreError {}

/// A failing backend surfaces as a 500 when a hook propagates it.
impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        HttpError::new(Status::InternalServerError, err.to_string())
    }
}

/// External key-value storage semantics.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Adds `by` to the counter at `key` (creating it at zero) and returns
    /// the new value. Counters share the keyspace with string values; a
    /// non-numeric value resets to zero, like a fresh counter.
    async fn increment(&self, key: &str, by: u64) -> Result<u64, StoreError>;

    /// Sets or replaces the expiry on an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remaining time to live, or `None` for a missing or non-expiring key.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// In-memory [`KvStore`] with per-key expiry. Expired entries are dropped
/// lazily on access.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn increment(&self, key: &str, by: u64) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        let current = match entries.get(key) {
            Some(entry) if !entry.expired() => entry.value.parse::<u64>().unwrap_or(0),
            _ => 0,
        };
        let next = current + by;
        let expires_at = entries
            .get(key)
            .filter(|entry| !entry.expired())
            .and_then(|entry| entry.expires_at);
        entries.insert(key.to_owned(), Entry { value: next.to_string(), expires_at });
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.expired())
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_exists() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.exists("k").await.unwrap());
        assert!(!store.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn expired_entries_vanish() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(Duration::from_nanos(1))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn counters_accumulate_and_keep_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("hits", 1).await.unwrap(), 1);
        assert_eq!(store.increment("hits", 2).await.unwrap(), 3);

        store.expire("hits", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.increment("hits", 1).await.unwrap(), 4);
        let remaining = store.ttl("hits").await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(50));
    }

    #[tokio::test]
    async fn ttl_is_none_without_expiry() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert_eq!(store.ttl("missing").await.unwrap(), None);
    }
}
