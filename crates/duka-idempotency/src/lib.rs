//! At-most-once execution for mutating operations.
//!
//! Provides the idempotency guard that deduplicates retried webhook
//! deliveries and client-retried financial mutations. The guard wraps an
//! operation identified by a key, ensures it executes at most once, and
//! replays the cached result — or the cached error — to every duplicate.
//!
//! The store behind the guard is pluggable: Redis in production, an
//! in-memory table for tests and single-node deployments. The guard is
//! composed explicitly at each call site, so the at-most-once contract is
//! visible in the call graph rather than hidden behind wrappers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod guard;
pub mod key;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use guard::{
    ExecutionOutcome, FailurePolicy, GuardConfig, GuardError, IdempotencyGuard, OperationFailure,
};
pub use key::{resolve_client_key, webhook_key};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{IdempotencyStore, StoreError, StoredOutcome};
