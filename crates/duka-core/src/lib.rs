//! Core domain models and tenant-scoped storage.
//!
//! Provides strongly-typed domain primitives, the platform error taxonomy,
//! and the PostgreSQL storage layer with row-level-security tenant scoping.
//! All other crates depend on these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod tenancy;

pub use error::{CoreError, DukaError, Result};
pub use models::{
    EventId, Order, OrderId, OrderStatus, PaymentProvider, Tenant, TenantId, WebhookEvent,
};
pub use storage::Storage;
pub use tenancy::{AdminSession, TenantSession};
