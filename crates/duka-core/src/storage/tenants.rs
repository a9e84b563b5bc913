//! Repository for tenant registry operations.
//!
//! The tenant registry is the root of request resolution and is not itself
//! row-level-security scoped: middleware must be able to look a tenant up
//! before any scoped session exists.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Tenant, TenantId},
};

/// Repository for tenant registry operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Creates a new tenant.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails or the slug is already taken.
    pub async fn create(&self, tenant: &Tenant) -> Result<TenantId> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO tenants (id, name, slug, is_active)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(tenant.id.0)
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.is_active)
        .fetch_one(&*self.pool)
        .await?;

        Ok(TenantId(id))
    }

    /// Finds a tenant by ID.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, tenant_id: TenantId) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r"
            SELECT id, name, slug, is_active, created_at, updated_at
            FROM tenants
            WHERE id = $1
            ",
        )
        .bind(tenant_id.0)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(tenant)
    }

    /// Finds a tenant by its subdomain slug.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r"
            SELECT id, name, slug, is_active, created_at, updated_at
            FROM tenants
            WHERE slug = $1
            ",
        )
        .bind(slug)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(tenant)
    }

    /// Checks if a tenant exists.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn exists(&self, tenant_id: TenantId) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM tenants WHERE id = $1)")
                .bind(tenant_id.0)
                .fetch_one(&*self.pool)
                .await?;

        Ok(exists.0)
    }

    /// Activates or deactivates a tenant.
    ///
    /// Deactivated tenants still resolve but are rejected with a forbidden
    /// error by the tenant middleware.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn set_active(&self, tenant_id: TenantId, is_active: bool) -> Result<()> {
        sqlx::query(
            r"
            UPDATE tenants
            SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(tenant_id.0)
        .bind(is_active)
        .execute(&*self.pool)
        .await?;

        Ok(())
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
