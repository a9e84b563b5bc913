//! Business processing behind webhook ingestion.
//!
//! The ingest handler records the delivery and then hands it to a
//! [`WebhookProcessor`]. The processor is a trait so the commerce side of
//! the platform can evolve independently of the ingestion guarantees; the
//! implementation shipped here confirms order payments.

use std::{future::Future, pin::Pin, sync::Arc};

use duka_core::{OrderStatus, Storage, WebhookEvent};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::providers;

/// Error from business processing of a recorded webhook.
#[derive(Debug, thiserror::Error)]
#[error("webhook processing failed: {0}")]
pub struct ProcessError(pub String);

/// Consumes recorded webhook events.
///
/// Implementations must be safely retryable: the idempotency layer makes a
/// second invocation for the same event unlikely, but the lock-TTL recovery
/// window makes it possible, so processing the same event twice must not
/// produce a second observable effect.
pub trait WebhookProcessor: Send + Sync + 'static {
    /// Processes one recorded delivery.
    fn process<'a>(
        &'a self,
        event: &'a WebhookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessError>> + Send + 'a>>;
}

/// Marks orders paid when a provider confirms payment.
///
/// A provider callback carries no tenant header, so the order is located
/// through the audited admin session and only then is its tenant known.
/// The status update itself is a no-op when the order is already paid,
/// which is the second line of defense behind the idempotency guard.
pub struct OrderStatusProcessor {
    storage: Storage,
}

impl OrderStatusProcessor {
    /// Creates a processor over the given storage.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

impl WebhookProcessor for OrderStatusProcessor {
    fn process<'a>(
        &'a self,
        event: &'a WebhookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessError>> + Send + 'a>> {
        Box::pin(async move {
            let payload: Value = serde_json::from_str(&event.payload)
                .map_err(|e| ProcessError(format!("unparseable recorded payload: {e}")))?;

            if !providers::is_payment_success(event.provider, &event.event_type, &payload) {
                debug!(
                    provider = %event.provider,
                    event_type = %event.event_type,
                    "event is not a payment confirmation; recorded only"
                );
                return Ok(());
            }

            let Some(reference) = providers::payment_reference(event.provider, &payload) else {
                warn!(
                    provider = %event.provider,
                    event_id = %event.event_id,
                    "payment confirmation carries no order reference"
                );
                return Ok(());
            };

            let mut session = self
                .storage
                .admin_session("webhook payment confirmation")
                .await
                .map_err(|e| ProcessError(e.to_string()))?;

            let order = self
                .storage
                .orders
                .find_by_reference(session.connection(), &reference)
                .await
                .map_err(|e| ProcessError(e.to_string()))?;

            let Some(order) = order else {
                warn!(
                    provider = %event.provider,
                    reference,
                    "no order matches the confirmed payment reference"
                );
                return Ok(());
            };

            let updated = self
                .storage
                .orders
                .update_status(session.connection(), order.id, OrderStatus::Paid)
                .await
                .map_err(|e| ProcessError(e.to_string()))?;

            if updated {
                info!(
                    order_id = %order.id,
                    tenant_id = %order.tenant_id,
                    provider = %event.provider,
                    reference,
                    "order marked paid"
                );
            } else {
                debug!(order_id = %order.id, "order already paid; no transition");
            }

            Ok(())
        })
    }
}

/// Processor that records nothing, for wiring tests.
pub struct NoOpProcessor;

impl WebhookProcessor for NoOpProcessor {
    fn process<'a>(
        &'a self,
        _event: &'a WebhookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessError>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

/// Convenience alias for shared processor handles.
pub type SharedProcessor = Arc<dyn WebhookProcessor>;
