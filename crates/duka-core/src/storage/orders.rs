//! Repository for order operations.
//!
//! Orders are tenant-scoped: every method takes an explicit executor, which
//! in practice is a [`crate::tenancy::TenantSession`] (or, for the webhook
//! processor, an audited [`crate::tenancy::AdminSession`]). None of the
//! queries carry a `WHERE tenant_id` clause; the row-level-security policy
//! on the table confines visibility to the session's tenant, and a session
//! with no tenant bound sees nothing.

use sqlx::{Executor, Postgres};

use crate::{
    error::Result,
    models::{Order, OrderId, OrderStatus},
};

/// Repository for order database operations.
///
/// Stateless: unlike the registry repositories it holds no pool, because
/// pool-level access to a tenant-scoped table is never meaningful.
pub struct Repository;

impl Repository {
    /// Creates a new repository instance.
    pub fn new() -> Self {
        Self
    }

    /// Creates a new order.
    ///
    /// The row's `tenant_id` must match the session's bound tenant; the
    /// policy's `WITH CHECK` rejects mismatched inserts at the database.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails or the per-tenant reference is taken.
    pub async fn create<'e, E>(&self, executor: E, order: &Order) -> Result<OrderId>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO orders (id, tenant_id, reference, status, amount, currency)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(order.id.0)
        .bind(order.tenant_id.0)
        .bind(&order.reference)
        .bind(order.status)
        .bind(order.amount)
        .bind(&order.currency)
        .fetch_one(executor)
        .await?;

        Ok(OrderId(id))
    }

    /// Finds an order by its merchant reference.
    ///
    /// Under a tenant session this can only see the session tenant's order;
    /// under an admin session it resolves the reference across tenants,
    /// which is how webhook confirmations locate their order.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_reference<'e, E>(
        &self,
        executor: E,
        reference: &str,
    ) -> Result<Option<Order>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, Order>(
            r"
            SELECT id, tenant_id, reference, status, amount, currency,
                   created_at, updated_at
            FROM orders
            WHERE reference = $1
            ",
        )
        .bind(reference)
        .fetch_optional(executor)
        .await?;

        Ok(order)
    }

    /// Lists orders visible to the session, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn list<'e, E>(&self, executor: E, limit: Option<i64>) -> Result<Vec<Order>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let orders = sqlx::query_as::<_, Order>(
            r"
            SELECT id, tenant_id, reference, status, amount, currency,
                   created_at, updated_at
            FROM orders
            ORDER BY created_at DESC
            LIMIT $1
            ",
        )
        .bind(limit.unwrap_or(100))
        .fetch_all(executor)
        .await?;

        Ok(orders)
    }

    /// Updates an order's status, returning whether a row changed.
    ///
    /// The `status <> $2` guard makes the update a no-op when the order is
    /// already in the target state, so webhook retries that slip past the
    /// idempotency layer cannot produce a second observable transition.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<bool>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status <> $2
            ",
        )
        .bind(order_id.0)
        .bind(status)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Counts orders visible to the session.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn count<'e, E>(&self, executor: E) -> Result<i64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(executor)
            .await?;

        Ok(count.0)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}
