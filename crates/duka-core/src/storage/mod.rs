//! Database access layer implementing the repository pattern.
//!
//! The repository layer translates between domain models and database
//! schemas. All database operations MUST go through these repositories;
//! direct SQL outside this module is forbidden to keep tenant scoping and
//! constraint handling consistent.
//!
//! Tenant-scoped tables are read and written through [`TenantSession`]
//! connections so the database, not the application, enforces visibility.

use std::{sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod orders;
pub mod schema;
pub mod tenants;
pub mod webhook_events;

use crate::{
    error::Result,
    models::TenantId,
    tenancy::{AdminSession, TenantSession},
};

/// Connection pool sizing and timeout settings.
///
/// Kept separate from the API configuration so the storage layer has no
/// dependency on how configuration is loaded.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to keep open.
    pub min_connections: u32,
    /// How long to wait for a pooled connection before failing.
    pub acquire_timeout: Duration,
    /// Idle time before a connection is closed.
    pub idle_timeout: Duration,
    /// Maximum lifetime of a connection.
    pub max_lifetime: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// Connects a PostgreSQL pool with tenant-scope hygiene installed.
///
/// Every connection returning to the pool has its `my.tenant_id` and
/// `my.bypass_rls` session variables reset in the pool's release hook. The
/// reset is not best-effort: it runs regardless of how the request that held
/// the connection ended, so a pooled connection can never carry one
/// request's tenant scope into the next request that borrows it.
///
/// # Errors
///
/// Returns `sqlx::Error` if the pool cannot be established.
pub async fn connect(database_url: &str, settings: &PoolSettings) -> sqlx::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .max_lifetime(settings.max_lifetime)
        .after_release(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("RESET my.tenant_id").execute(&mut *conn).await?;
                sqlx::query("RESET my.bypass_rls").execute(&mut *conn).await?;
                Ok(true)
            })
        })
        .connect(database_url)
        .await
}

/// Container for all repository instances providing unified database access.
///
/// `Storage` is the entry point for all database operations. It manages a
/// shared connection pool, hands out tenant-bound sessions, and provides
/// type-safe access to each repository.
#[derive(Clone)]
pub struct Storage {
    /// Repository for tenant registry operations.
    pub tenants: Arc<tenants::Repository>,

    /// Repository for order operations (tenant-scoped).
    pub orders: Arc<orders::Repository>,

    /// Repository for recorded webhook deliveries.
    pub webhook_events: Arc<webhook_events::Repository>,

    pool: PgPool,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let shared = Arc::new(pool.clone());

        Self {
            tenants: Arc::new(tenants::Repository::new(shared.clone())),
            orders: Arc::new(orders::Repository::new()),
            webhook_events: Arc::new(webhook_events::Repository::new(shared)),
            pool,
        }
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Opens a session bound to the given tenant.
    ///
    /// Every query issued on the returned session is confined to the tenant
    /// by the row-level-security policies, with no `WHERE tenant_id` needed.
    ///
    /// # Errors
    ///
    /// Returns error if no connection can be acquired or the session
    /// variable cannot be set.
    pub async fn tenant_session(&self, tenant_id: TenantId) -> Result<TenantSession> {
        TenantSession::bind(&self.pool, tenant_id).await
    }

    /// Opens an audited session that bypasses tenant isolation.
    ///
    /// The only sanctioned cross-tenant path. Callers must supply a reason,
    /// which is written to the audit log before the session is handed out.
    ///
    /// # Errors
    ///
    /// Returns error if no connection can be acquired or the session
    /// variable cannot be set.
    pub async fn admin_session(&self, reason: &str) -> Result<AdminSession> {
        AdminSession::bind(&self.pool, reason).await
    }

    /// Performs a health check on the database connection.
    ///
    /// Executes a simple query to verify connectivity. Used by the
    /// `/ready` endpoint for readiness probes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Verifies the Storage struct can be instantiated; actual database
        // behavior is covered by the integration tests.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
