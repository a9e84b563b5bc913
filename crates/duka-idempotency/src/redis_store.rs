//! Redis-backed idempotency store.
//!
//! Outcomes live at `idem:{key}` with the long result TTL; the in-flight
//! lock lives at `idem:{key}:lock` and is acquired with a single
//! `SET NX PX` so concurrent duplicate deliveries can never both win.

use std::time::Duration;

use redis::AsyncCommands;

use crate::store::{IdempotencyStore, StoreError, StoreFuture, StoredOutcome};

/// Redis implementation of [`IdempotencyStore`].
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Creates a store from a Redis connection URL.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the URL is invalid.
    pub fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn outcome_key(key: &str) -> String {
        format!("idem:{key}")
    }

    fn lock_key(key: &str) -> String {
        format!("idem:{key}:lock")
    }
}

impl IdempotencyStore for RedisStore {
    fn fetch<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredOutcome>> {
        Box::pin(async move {
            let mut conn = self.connection().await?;
            let raw: Option<String> = conn
                .get(Self::outcome_key(key))
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;

            match raw {
                Some(raw) => Ok(Some(StoredOutcome::from_json(&raw)?)),
                None => Ok(None),
            }
        })
    }

    fn persist<'a>(
        &'a self,
        key: &'a str,
        outcome: &'a StoredOutcome,
        ttl: Duration,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let raw = outcome.to_json()?;
            let mut conn = self.connection().await?;
            conn.set_ex::<_, _, ()>(Self::outcome_key(key), raw, ttl.as_secs().max(1))
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            Ok(())
        })
    }

    fn try_lock<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.connection().await?;

            // SET NX PX is the atomic conditional set; a nil reply means the
            // lock is already held.
            let acquired: Option<String> = redis::cmd("SET")
                .arg(Self::lock_key(key))
                .arg("1")
                .arg("NX")
                .arg("PX")
                .arg(ttl.as_millis().max(1) as u64)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;

            Ok(acquired.is_some())
        })
    }

    fn unlock<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.connection().await?;
            conn.del::<_, ()>(Self::lock_key(key))
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_namespaces_are_distinct() {
        assert_eq!(RedisStore::outcome_key("wh:mpesa:ABC"), "idem:wh:mpesa:ABC");
        assert_eq!(RedisStore::lock_key("wh:mpesa:ABC"), "idem:wh:mpesa:ABC:lock");
        assert_ne!(RedisStore::outcome_key("k"), RedisStore::lock_key("k"));
    }

    #[test]
    fn invalid_url_rejected() {
        assert!(RedisStore::connect("not-a-url").is_err());
    }
}
