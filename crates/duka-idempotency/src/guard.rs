//! The at-most-once execution guard.
//!
//! `execute_once` is the single entry point: look up the key, replay a
//! recorded outcome if one exists, otherwise take the in-flight lock, run
//! the operation exactly once, record its outcome, and release the lock.
//! Concurrent duplicates observe either the replay (winner finished) or a
//! conflict (winner still running) — never a second execution.

use std::{future::Future, sync::Arc, time::Duration};

use tracing::{error, warn};

use crate::store::{IdempotencyStore, StoreError, StoredOutcome};

/// Time-to-live settings for the guard.
#[derive(Debug, Clone, Copy)]
pub struct GuardConfig {
    /// How long recorded outcomes are replayed before the key may be reused.
    pub result_ttl: Duration,
    /// How long the in-flight lock survives a crashed holder.
    ///
    /// Must comfortably exceed one operation but stay well below the
    /// provider's retry window, so a stuck worker cannot block retries for
    /// long.
    pub lock_ttl: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self { result_ttl: Duration::from_secs(24 * 60 * 60), lock_ttl: Duration::from_secs(30) }
    }
}

/// What to do when the store itself cannot be reached.
///
/// The policy is an explicit parameter at every call site, never a global
/// default: payment mutations must fail closed, while a non-financial path
/// may accept the risk of running without deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reject the request rather than risk double execution.
    FailClosed,
    /// Run the operation without deduplication, logged.
    FailOpen,
}

/// A failed operation outcome that is recorded and replayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    /// HTTP status the failure maps to.
    pub status: u16,
    /// Human-readable detail.
    pub detail: String,
}

impl OperationFailure {
    /// Creates a failure outcome.
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into() }
    }
}

/// Successful result of `execute_once`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The operation ran in this call.
    Executed {
        /// Response body the operation produced.
        body: serde_json::Value,
    },
    /// A recorded outcome was replayed; the operation did not run.
    Replayed {
        /// Response body exactly as first produced.
        body: serde_json::Value,
    },
}

impl ExecutionOutcome {
    /// The response body, however it was obtained.
    pub fn body(&self) -> &serde_json::Value {
        match self {
            Self::Executed { body } | Self::Replayed { body } => body,
        }
    }

    /// Whether this call replayed a recorded outcome.
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replayed { .. })
    }
}

/// Failure result of `execute_once`.
#[derive(Debug)]
pub enum GuardError {
    /// Another attempt for this key is still in flight.
    ///
    /// Surfaced immediately; the guard never waits for the winner.
    Conflict,

    /// The store is unreachable and the call site runs fail-closed.
    StoreUnavailable(StoreError),

    /// The operation failed, now or on the original attempt.
    Failed {
        /// HTTP status of the failure.
        status: u16,
        /// Failure detail, verbatim from the original attempt when replayed.
        detail: String,
        /// Whether this failure was replayed from the record.
        replayed: bool,
    },
}

/// At-most-once execution guard over a pluggable store.
///
/// Composed explicitly at each call site; handlers pass the operation as a
/// closure so the at-most-once boundary is visible in the call graph.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    config: GuardConfig,
}

impl IdempotencyGuard {
    /// Creates a guard over the given store.
    pub fn new(store: Arc<dyn IdempotencyStore>, config: GuardConfig) -> Self {
        Self { store, config }
    }

    /// Executes `op` at most once for `key`.
    ///
    /// Duplicate calls with the same key observe the recorded outcome —
    /// success or failure — byte-for-byte, without `op` running again. A
    /// duplicate arriving while the first attempt is still in flight gets
    /// [`GuardError::Conflict`] immediately.
    ///
    /// # Errors
    ///
    /// - [`GuardError::Conflict`] when the key's lock is held.
    /// - [`GuardError::StoreUnavailable`] when the store is down and
    ///   `policy` is fail-closed.
    /// - [`GuardError::Failed`] when `op` fails (fresh or replayed).
    pub async fn execute_once<F, Fut>(
        &self,
        key: &str,
        policy: FailurePolicy,
        op: F,
    ) -> Result<ExecutionOutcome, GuardError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, OperationFailure>>,
    {
        match self.store.fetch(key).await {
            Ok(Some(StoredOutcome::Success { body, .. })) => {
                return Ok(ExecutionOutcome::Replayed { body });
            },
            Ok(Some(StoredOutcome::Failure { status, detail })) => {
                return Err(GuardError::Failed { status, detail, replayed: true });
            },
            Ok(None) => {},
            Err(err) => return Self::degraded(key, policy, err, op).await,
        }

        match self.store.try_lock(key, self.config.lock_ttl).await {
            Ok(true) => {},
            Ok(false) => return Err(GuardError::Conflict),
            Err(err) => return Self::degraded(key, policy, err, op).await,
        }

        // Re-check after winning the lock: a racing winner may have finished
        // between our lookup and our acquisition. It records its outcome
        // before unlocking, so whatever slipped past the first lookup is
        // visible here.
        match self.store.fetch(key).await {
            Ok(Some(StoredOutcome::Success { body, .. })) => {
                self.release(key).await;
                return Ok(ExecutionOutcome::Replayed { body });
            },
            Ok(Some(StoredOutcome::Failure { status, detail })) => {
                self.release(key).await;
                return Err(GuardError::Failed { status, detail, replayed: true });
            },
            Ok(None) => {},
            Err(err) => {
                self.release(key).await;
                return Self::degraded(key, policy, err, op).await;
            },
        }

        let result = op().await;

        let outcome = match &result {
            Ok(body) => StoredOutcome::Success { status: 200, body: body.clone() },
            Err(failure) => {
                StoredOutcome::Failure { status: failure.status, detail: failure.detail.clone() }
            },
        };

        // The operation has already run; a persist failure cannot undo its
        // side effect, so it is logged and the durable uniqueness check at
        // the business layer remains the backstop for later retries.
        if let Err(err) = self.store.persist(key, &outcome, self.config.result_ttl).await {
            error!(key, error = %err, "failed to record idempotency outcome");
        }

        // Unlock unconditionally; on failure the lock TTL bounds the damage.
        self.release(key).await;

        match result {
            Ok(body) => Ok(ExecutionOutcome::Executed { body }),
            Err(failure) => Err(GuardError::Failed {
                status: failure.status,
                detail: failure.detail,
                replayed: false,
            }),
        }
    }

    /// Best-effort lock release; the lock TTL bounds a failed release.
    async fn release(&self, key: &str) {
        if let Err(err) = self.store.unlock(key).await {
            warn!(key, error = %err, "failed to release idempotency lock; TTL will expire it");
        }
    }

    /// Store-outage path: reject or run unguarded per the call site policy.
    async fn degraded<F, Fut>(
        key: &str,
        policy: FailurePolicy,
        err: StoreError,
        op: F,
    ) -> Result<ExecutionOutcome, GuardError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, OperationFailure>>,
    {
        match policy {
            FailurePolicy::FailClosed => {
                error!(key, error = %err, "idempotency store unavailable; rejecting");
                Err(GuardError::StoreUnavailable(err))
            },
            FailurePolicy::FailOpen => {
                warn!(key, error = %err, "idempotency store unavailable; executing without dedup");
                match op().await {
                    Ok(body) => Ok(ExecutionOutcome::Executed { body }),
                    Err(failure) => Err(GuardError::Failed {
                        status: failure.status,
                        detail: failure.detail,
                        replayed: false,
                    }),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn guard() -> IdempotencyGuard {
        IdempotencyGuard::new(Arc::new(MemoryStore::new()), GuardConfig::default())
    }

    #[tokio::test]
    async fn executed_and_replayed_expose_same_body() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let guard = guard();
        let body = serde_json::json!({"success": true});
        let calls = AtomicUsize::new(0);

        let run = || {
            calls.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            async move { Ok(body) }
        };

        let first = guard.execute_once("k", FailurePolicy::FailClosed, run).await.unwrap();
        assert!(!first.is_replay());
        assert_eq!(first.body(), &body);

        let run = || {
            calls.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            async move { Ok(body) }
        };

        let second = guard.execute_once("k", FailurePolicy::FailClosed, run).await.unwrap();
        assert!(second.is_replay());
        assert_eq!(second.body(), &body);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
