//! Expiring record storage for codes and tokens.
//!
//! The [`ExpiringStore`] trait abstracts over storage backends so a networked
//! store can replace the in-memory one without touching the OAuth service.
//! The only current implementation is [`InMemoryStore`], backed by a
//! `DashMap`.
//!
//! # Contract
//!
//! - `take_if_valid` removes and returns in one step. For a given key, at most
//!   one concurrent caller gets `Some`.
//! - No read path ever returns an entry whose expiry has passed, whether or
//!   not a sweep has run.
//! - `Ok(None)` means "absent, expired or already consumed". `Err` is reserved
//!   for faults of the storage itself.

use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tracing::debug;

use crate::Result;

/// Keyed storage for short-lived records.
#[async_trait::async_trait]
pub trait ExpiringStore<V>: Send + Sync + 'static
where
    V: Clone + Send + Sync + 'static,
{
    /// Insert or overwrite `key`, expiring `ttl` from now.
    async fn put(&self, key: String, value: V, ttl: Duration) -> Result<()>;

    /// Remove and return the record if present and unexpired.
    async fn take_if_valid(&self, key: &str) -> Result<Option<V>>;

    /// Return a copy of the record if present and unexpired, leaving it in place.
    async fn peek_if_valid(&self, key: &str) -> Result<Option<V>>;

    /// Remove every record expiring at or before `now`. Returns the count removed.
    async fn sweep_expired(&self, now: SystemTime) -> Result<usize>;

    /// Number of records currently held (expired ones included until swept).
    async fn len(&self) -> Result<usize>;
}

/// A stored value with its expiry instant.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: SystemTime,
}

impl<V> Entry<V> {
    fn is_live_at(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }
}

/// In-memory store backed by a sharded `DashMap`.
///
/// Same-key operations serialize on the shard lock; operations on different
/// keys proceed independently.
pub struct InMemoryStore<V> {
    entries: DashMap<String, Entry<V>>,
}

impl<V> InMemoryStore<V> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<V> ExpiringStore<V> for InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn put(&self, key: String, value: V, ttl: Duration) -> Result<()> {
        let expires_at = SystemTime::now()
            .checked_add(ttl)
            .ok_or_else(|| crate::Error::Storage(format!("TTL out of range: {ttl:?}")))?;
        self.entries.insert(key, Entry { value, expires_at });
        Ok(())
    }

    async fn take_if_valid(&self, key: &str) -> Result<Option<V>> {
        // remove() holds the shard write lock for the whole lookup + delete, so
        // a concurrent take on the same key sees the entry gone.
        let Some((_, entry)) = self.entries.remove(key) else {
            return Ok(None);
        };

        if entry.is_live_at(SystemTime::now()) {
            Ok(Some(entry.value))
        } else {
            debug!("Discarded expired record on take");
            Ok(None)
        }
    }

    async fn peek_if_valid(&self, key: &str) -> Result<Option<V>> {
        let now = SystemTime::now();
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };

        if entry.is_live_at(now) {
            return Ok(Some(entry.value.clone()));
        }

        // Lazy eviction. The guard must be dropped before mutating the map,
        // and the entry re-checked in case it was overwritten meanwhile.
        drop(entry);
        self.entries.remove_if(key, |_, e| !e.is_live_at(now));
        debug!("Lazy-evicted expired record on peek");
        Ok(None)
    }

    async fn sweep_expired(&self, now: SystemTime) -> Result<usize> {
        // Counted inside retain so concurrent puts do not skew the result
        let mut removed = 0;
        self.entries.retain(|_, e| {
            let live = e.is_live_at(now);
            if !live {
                removed += 1;
            }
            live
        });
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn put_then_peek_returns_value_without_consuming() {
        // GIVEN: a store with one live record
        let store = InMemoryStore::new();
        store
            .put("k".to_string(), 42u32, Duration::from_secs(60))
            .await
            .unwrap();

        // WHEN: peeking twice
        let first = store.peek_if_valid("k").await.unwrap();
        let second = store.peek_if_valid("k").await.unwrap();

        // THEN: both see the value and it is still stored
        assert_eq!(first, Some(42));
        assert_eq!(second, Some(42));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn take_consumes_record() {
        let store = InMemoryStore::new();
        store
            .put("k".to_string(), "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.take_if_valid("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.take_if_valid("k").await.unwrap(), None);
        assert_eq!(store.peek_if_valid("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_ttl_record_is_never_readable() {
        // GIVEN: a record stored with TTL = 0
        let store = InMemoryStore::new();
        store
            .put("k".to_string(), 1u8, Duration::ZERO)
            .await
            .unwrap();

        // THEN: neither peek nor take returns it, even though no sweep ran
        assert_eq!(store.peek_if_valid("k").await.unwrap(), None);
        assert_eq!(store.take_if_valid("k").await.unwrap(), None);
        assert_eq!(store.len().await.unwrap(), 0, "expired entry must be evicted");
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let store = InMemoryStore::new();
        store.put("k".into(), 1u8, Duration::from_secs(60)).await.unwrap();
        store.put("k".into(), 2u8, Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(store.peek_if_valid("k").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_records() {
        // GIVEN: one short-lived and one long-lived record
        let store = InMemoryStore::new();
        store.put("short".into(), 1u8, Duration::from_secs(10)).await.unwrap();
        store.put("long".into(), 2u8, Duration::from_secs(3600)).await.unwrap();

        // WHEN: sweeping as of one minute from now
        let now = SystemTime::now() + Duration::from_secs(60);
        let removed = store.sweep_expired(now).await.unwrap();

        // THEN: only the short-lived record is gone
        assert_eq!(removed, 1);
        assert_eq!(store.peek_if_valid("long").await.unwrap(), Some(2));
        assert_eq!(store.peek_if_valid("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sweep_treats_expiry_boundary_as_expired() {
        let store = InMemoryStore::new();
        store.put("k".into(), 1u8, Duration::from_secs(5)).await.unwrap();

        let removed = store
            .sweep_expired(SystemTime::now() + Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sweep_count_ignores_concurrent_inserts() {
        // GIVEN: 64 records that are already expired
        let store = Arc::new(InMemoryStore::new());
        for i in 0..64 {
            store.put(format!("old-{i}"), i, Duration::ZERO).await.unwrap();
        }

        // WHEN: live records are inserted while the sweep runs
        let writer = {
            let s = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..256 {
                    s.put(format!("new-{i}"), i, Duration::from_secs(60)).await.unwrap();
                }
            })
        };
        let removed = store.sweep_expired(SystemTime::now()).await.unwrap();
        writer.await.unwrap();

        // THEN: the count reflects only the expired records
        assert_eq!(removed, 64);
        assert_eq!(store.len().await.unwrap(), 256);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_takes_yield_exactly_one_winner() {
        // GIVEN: a single record shared by many racing consumers
        let store = Arc::new(InMemoryStore::new());
        store
            .put("once".into(), "payload".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        // WHEN: 32 tasks try to take it at the same time
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let s = Arc::clone(&store);
                tokio::spawn(async move { s.take_if_valid("once").await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                winners += 1;
            }
        }

        // THEN: exactly one of them got the record
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn ttl_overflow_is_a_storage_error() {
        let store = InMemoryStore::new();
        let err = store
            .put("k".into(), 1u8, Duration::MAX)
            .await
            .expect_err("overflowing TTL must fail");
        assert!(matches!(err, crate::Error::Storage(_)));
    }
}
