//! Repository for recorded webhook deliveries.
//!
//! Rows are insert-only and keyed by the `(provider, event_id)` unique
//! index, which is what makes webhook processing at-most-once even when the
//! idempotency cache is cold or unavailable.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{EventId, PaymentProvider, WebhookEvent},
};

/// Outcome of attempting to record a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First delivery of this provider event; the row was inserted.
    Recorded(EventId),
    /// A row for `(provider, event_id)` already exists.
    ///
    /// The delivery is a retry and must be acknowledged as a no-op.
    AlreadyProcessed,
}

/// Repository for webhook event database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Records a webhook delivery, treating duplicates as already processed.
    ///
    /// The insert races cleanly with concurrent deliveries of the same
    /// event: exactly one insert wins the unique index, every other caller
    /// observes [`RecordOutcome::AlreadyProcessed`]. Delivery order does not
    /// matter.
    ///
    /// # Errors
    ///
    /// Returns error for any database failure other than the unique-index
    /// violation.
    pub async fn record(&self, event: &WebhookEvent) -> Result<RecordOutcome> {
        let inserted = sqlx::query_scalar(
            r"
            INSERT INTO webhook_events (id, provider, event_id, event_type, payload, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(event.id.0)
        .bind(event.provider)
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.processed_at)
        .fetch_one(&*self.pool)
        .await;

        match inserted {
            Ok(id) => Ok(RecordOutcome::Recorded(EventId(id))),
            Err(err) => {
                let core: CoreError = err.into();
                if core.is_unique_violation() {
                    Ok(RecordOutcome::AlreadyProcessed)
                } else {
                    Err(core)
                }
            },
        }
    }

    /// Finds a recorded delivery by its provider key.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_provider_event(
        &self,
        provider: PaymentProvider,
        event_id: &str,
    ) -> Result<Option<WebhookEvent>> {
        let event = sqlx::query_as::<_, WebhookEvent>(
            r"
            SELECT id, provider, event_id, event_type, payload, processed_at
            FROM webhook_events
            WHERE provider = $1 AND event_id = $2
            ",
        )
        .bind(provider)
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(event)
    }

    /// Counts recorded deliveries for a provider.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn count_for_provider(&self, provider: PaymentProvider) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM webhook_events WHERE provider = $1")
                .bind(provider)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0)
    }

    /// Lists the most recently recorded deliveries.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn recent(&self, limit: Option<i64>) -> Result<Vec<WebhookEvent>> {
        let events = sqlx::query_as::<_, WebhookEvent>(
            r"
            SELECT id, provider, event_id, event_type, payload, processed_at
            FROM webhook_events
            ORDER BY processed_at DESC
            LIMIT $1
            ",
        )
        .bind(limit.unwrap_or(100))
        .fetch_all(&*self.pool)
        .await?;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_can_be_created() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _repo = Repository::new(Arc::new(pool));
    }
}
