//! HTTP surface for the Duka payments core.
//!
//! Wires the tenant-resolution middleware, provider webhook ingress, and
//! idempotent payment endpoints into an Axum router. Request flow:
//!
//! 1. Tenant middleware resolves and validates the caller's tenant (or lets
//!    an allow-listed public path through).
//! 2. Mutating handlers compose the idempotency guard explicitly around
//!    their operation.
//! 3. Data access runs on a tenant-bound connection; the database enforces
//!    row visibility.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod processor;
pub mod providers;
pub mod server;

pub use config::Config;
pub use processor::{OrderStatusProcessor, WebhookProcessor};
pub use server::{create_router, start_server, AppState};
