//! Storage abstraction for idempotency state.
//!
//! Trait-based so the guard can run against Redis in production and an
//! in-memory table in tests, without the guard logic knowing the
//! difference. Methods return boxed futures to keep the trait object-safe.

use std::{future::Future, pin::Pin, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors from the idempotency store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached.
    ///
    /// How this propagates depends on the call site's failure policy:
    /// payment mutations fail closed, non-financial paths may proceed.
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("idempotency encoding error: {0}")]
    Encoding(String),
}

/// The recorded outcome of a completed operation.
///
/// Both successes and failures are recorded, because the replay guarantee
/// covers errors too: a duplicate of a failed charge must observe the same
/// failure, not a second attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredOutcome {
    /// The operation completed; replay this response verbatim.
    Success {
        /// HTTP status the first response carried.
        status: u16,
        /// Response body as originally produced.
        body: serde_json::Value,
    },
    /// The operation failed; re-raise the original error verbatim.
    Failure {
        /// HTTP status of the original failure.
        status: u16,
        /// Error detail as originally produced.
        detail: String,
    },
}

impl StoredOutcome {
    /// Serializes the outcome for storage.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Encoding` if serialization fails.
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(|e| StoreError::Encoding(e.to_string()))
    }

    /// Deserializes a stored outcome.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Encoding` if the stored value is corrupt.
    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::Encoding(e.to_string()))
    }
}

/// Operations the guard requires from an idempotency store.
///
/// `try_lock` must be a single atomic conditional set at the store: two
/// concurrent callers for the same key must never both observe `true`, even
/// when their requests interleave on one event loop tick.
pub trait IdempotencyStore: Send + Sync + 'static {
    /// Fetches the recorded outcome for a key, if any.
    fn fetch<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredOutcome>>;

    /// Records the outcome for a key with the given time-to-live.
    fn persist<'a>(
        &'a self,
        key: &'a str,
        outcome: &'a StoredOutcome,
        ttl: Duration,
    ) -> StoreFuture<'a, ()>;

    /// Attempts to acquire the in-flight lock for a key.
    ///
    /// Returns `false` without blocking when another attempt holds the lock.
    /// The lock expires after `ttl` so a crashed holder cannot block retries
    /// forever.
    fn try_lock<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, bool>;

    /// Releases the in-flight lock for a key.
    fn unlock<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}
