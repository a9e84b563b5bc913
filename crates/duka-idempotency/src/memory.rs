//! In-memory idempotency store.
//!
//! Used by tests and by single-node deployments that run without Redis.
//! All state lives behind one mutex, which is what makes `try_lock` a
//! single atomic check-and-insert rather than a check-then-act race.
//!
//! Expiry uses `tokio::time::Instant` so tests can drive it with a paused
//! clock.

use std::collections::HashMap;

use tokio::{sync::Mutex, time::Instant};

use crate::store::{IdempotencyStore, StoreError, StoreFuture, StoredOutcome};

struct Entry {
    outcome: StoredOutcome,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    outcomes: HashMap<String, Entry>,
    locks: HashMap<String, Instant>,
}

/// In-memory implementation of [`IdempotencyStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) recorded outcomes, for test assertions.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.inner.lock().await.outcomes.values().filter(|e| e.expires_at > now).count()
    }

    /// Whether the store holds no live outcomes.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl IdempotencyStore for MemoryStore {
    fn fetch<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredOutcome>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            match inner.outcomes.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    Ok(Some(entry.outcome.clone()))
                },
                Some(_) => {
                    inner.outcomes.remove(key);
                    Ok(None)
                },
                None => Ok(None),
            }
        })
    }

    fn persist<'a>(
        &'a self,
        key: &'a str,
        outcome: &'a StoredOutcome,
        ttl: std::time::Duration,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            inner.outcomes.insert(
                key.to_string(),
                Entry { outcome: outcome.clone(), expires_at: Instant::now() + ttl },
            );
            Ok(())
        })
    }

    fn try_lock<'a>(&'a self, key: &'a str, ttl: std::time::Duration) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            let now = Instant::now();

            if let Some(expires_at) = inner.locks.get(key) {
                if *expires_at > now {
                    return Ok(false);
                }
            }

            inner.locks.insert(key.to_string(), now + ttl);
            Ok(true)
        })
    }

    fn unlock<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.inner.lock().await.locks.remove(key);
            Ok(())
        })
    }
}

/// Store double that fails every operation.
///
/// Used to verify fail-closed and fail-open behavior when the store is
/// unreachable.
pub struct UnavailableStore;

impl IdempotencyStore for UnavailableStore {
    fn fetch<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, Option<StoredOutcome>> {
        Box::pin(async { Err(StoreError::Unavailable("injected outage".into())) })
    }

    fn persist<'a>(
        &'a self,
        _key: &'a str,
        _outcome: &'a StoredOutcome,
        _ttl: std::time::Duration,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async { Err(StoreError::Unavailable("injected outage".into())) })
    }

    fn try_lock<'a>(&'a self, _key: &'a str, _ttl: std::time::Duration) -> StoreFuture<'a, bool> {
        Box::pin(async { Err(StoreError::Unavailable("injected outage".into())) })
    }

    fn unlock<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async { Err(StoreError::Unavailable("injected outage".into())) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn outcome() -> StoredOutcome {
        StoredOutcome::Success { status: 200, body: serde_json::json!({"success": true}) }
    }

    #[tokio::test]
    async fn fetch_returns_persisted_outcome() {
        let store = MemoryStore::new();
        store.persist("k1", &outcome(), Duration::from_secs(60)).await.unwrap();

        let fetched = store.fetch("k1").await.unwrap();
        assert_eq!(fetched, Some(outcome()));
    }

    #[tokio::test]
    async fn fetch_misses_for_unknown_key() {
        let store = MemoryStore::new();
        assert_eq!(store.fetch("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn outcome_expires_after_ttl() {
        let store = MemoryStore::new();
        store.persist("k1", &outcome(), Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(store.fetch("k1").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let store = MemoryStore::new();

        assert!(store.try_lock("k1", Duration::from_secs(30)).await.unwrap());
        assert!(!store.try_lock("k1", Duration::from_secs(30)).await.unwrap());

        store.unlock("k1").await.unwrap();
        assert!(store.try_lock("k1", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_lock_recoverable_after_ttl() {
        let store = MemoryStore::new();
        assert!(store.try_lock("k1", Duration::from_secs(30)).await.unwrap());

        // A crashed holder never calls unlock; expiry is the safety net.
        tokio::time::advance(Duration::from_secs(31)).await;

        assert!(store.try_lock("k1", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn locks_for_distinct_keys_are_independent() {
        let store = MemoryStore::new();
        assert!(store.try_lock("k1", Duration::from_secs(30)).await.unwrap());
        assert!(store.try_lock("k2", Duration::from_secs(30)).await.unwrap());
    }
}
