//! Tenant-bound database sessions.
//!
//! A request that has resolved its tenant checks a connection out of the
//! pool through [`TenantSession`], which binds the tenant to the connection
//! by setting the `my.tenant_id` session variable before any query runs.
//! The row-level-security policies installed by [`crate::storage::schema`]
//! key off that variable, so every query on the connection is confined to
//! the tenant without any `WHERE tenant_id` clause — and a query whose
//! author forgot scoping entirely returns nothing rather than leaking rows.
//!
//! Per request the session moves through: unresolved -> resolving ->
//! bound | rejected -> released. Release is guaranteed twice over: dropping
//! the session returns the connection to the pool, and the pool's release
//! hook (see [`crate::storage::connect`]) resets the session variables
//! before the connection can be reused.

use sqlx::{pool::PoolConnection, PgConnection, PgPool, Postgres};

use crate::{error::Result, models::TenantId};

/// A pooled connection bound to a single tenant's scope.
///
/// Holds the connection for the remainder of the request; repositories
/// accept it wherever an executor is expected via [`Self::connection`].
pub struct TenantSession {
    conn: PoolConnection<Postgres>,
    tenant_id: TenantId,
}

impl TenantSession {
    /// Acquires a connection and binds it to `tenant_id`.
    ///
    /// Issues `set_config('my.tenant_id', ...)` on the connection before
    /// handing it out, which is the single point where tenant scope attaches
    /// to data access.
    ///
    /// # Errors
    ///
    /// Returns error if the pool is exhausted or the variable cannot be set.
    pub async fn bind(pool: &PgPool, tenant_id: TenantId) -> Result<Self> {
        let mut conn = pool.acquire().await?;

        sqlx::query("SELECT set_config('my.tenant_id', $1, false)")
            .bind(tenant_id.0.to_string())
            .execute(&mut *conn)
            .await?;

        Ok(Self { conn, tenant_id })
    }

    /// The tenant this session is bound to.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The underlying connection, for use as a query executor.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

impl std::ops::Deref for TenantSession {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for TenantSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

/// An audited cross-tenant session.
///
/// The only sanctioned way to read or write across tenant boundaries.
/// Binding one emits an audit log line with the caller's reason; the
/// `my.bypass_rls` variable it sets is matched by a dedicated policy rather
/// than by role ownership, so ordinary sessions can never drift into this
/// scope.
///
/// Used by the webhook processor (a provider callback carries no tenant, so
/// the order must be located before its tenant is known) and by operator
/// tooling.
pub struct AdminSession {
    conn: PoolConnection<Postgres>,
}

impl AdminSession {
    /// Acquires a connection with tenant isolation bypassed.
    ///
    /// # Errors
    ///
    /// Returns error if the pool is exhausted or the variable cannot be set.
    pub async fn bind(pool: &PgPool, reason: &str) -> Result<Self> {
        tracing::warn!(target: "duka::audit", reason, "opening cross-tenant admin session");

        let mut conn = pool.acquire().await?;

        sqlx::query("SELECT set_config('my.bypass_rls', 'on', false)")
            .execute(&mut *conn)
            .await?;

        Ok(Self { conn })
    }

    /// The underlying connection, for use as a query executor.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}
