//! Schema bootstrap and row-level-security policy installation.
//!
//! Executed at startup before the server accepts requests, so handlers can
//! assume the schema and policies exist. Statements are idempotent and safe
//! to re-run on every boot.

use sqlx::PgPool;

use crate::error::Result;

/// Creates tables, indexes, and row-level-security policies.
///
/// Tenant-scoped tables get two permissive policies:
///
/// - `tenant_isolation_policy` keys off the `my.tenant_id` session variable
///   bound by [`crate::tenancy::TenantSession`]. `current_setting(..., true)`
///   with `NULLIF` makes an unbound or reset variable yield zero rows
///   instead of a cast error, so a query issued outside any tenant session
///   fails safe and empty.
/// - `admin_bypass_policy` opens visibility only when `my.bypass_rls` is set
///   by the audited [`crate::tenancy::AdminSession`] path.
///
/// `FORCE ROW LEVEL SECURITY` subjects even the table owner to the policies.
/// Note that PostgreSQL superusers bypass RLS entirely; the service role
/// must not be a superuser.
///
/// # Errors
///
/// Returns error if any DDL statement fails.
pub async fn bootstrap(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhook_events (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The durability guarantee for at-most-once webhook processing. The
    // idempotency cache in front of this index is an optimization only.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_webhook_events_provider_event
        ON webhook_events(provider, event_id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            reference TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            amount BIGINT NOT NULL,
            currency TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (tenant_id, reference)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_orders_reference
        ON orders(reference)
        "#,
    )
    .execute(pool)
    .await?;

    install_tenant_policies(pool, "orders").await?;

    Ok(())
}

/// Installs row-level-security policies on a tenant-scoped table.
async fn install_tenant_policies(pool: &PgPool, table: &str) -> Result<()> {
    // `table` comes from the fixed set of tenant-scoped tables named in
    // `bootstrap`; never pass user input here.
    sqlx::query(&format!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY"))
        .execute(pool)
        .await?;

    sqlx::query(&format!("DROP POLICY IF EXISTS tenant_isolation_policy ON {table}"))
        .execute(pool)
        .await?;

    sqlx::query(&format!(
        r#"
        CREATE POLICY tenant_isolation_policy ON {table}
        USING (tenant_id = NULLIF(current_setting('my.tenant_id', true), '')::uuid)
        "#,
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!("DROP POLICY IF EXISTS admin_bypass_policy ON {table}"))
        .execute(pool)
        .await?;

    sqlx::query(&format!(
        r#"
        CREATE POLICY admin_bypass_policy ON {table}
        USING (NULLIF(current_setting('my.bypass_rls', true), '') = 'on')
        "#,
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!("ALTER TABLE {table} FORCE ROW LEVEL SECURITY"))
        .execute(pool)
        .await?;

    Ok(())
}
