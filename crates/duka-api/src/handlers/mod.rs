//! HTTP request handlers.

pub mod health;
pub mod orders;
pub mod payments;
pub mod webhooks;

pub use health::{health_check, liveness_check, readiness_check};
pub use orders::list_orders;
pub use payments::initiate_charge;
pub use webhooks::receive_webhook;
