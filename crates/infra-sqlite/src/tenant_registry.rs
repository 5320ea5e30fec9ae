// SQLite TenantRegistry Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use nfse_core::domain::{Tenant, TenantCredential};
use nfse_core::error::{AppError, Result};
use nfse_core::port::TenantRegistry;
use sqlx::SqlitePool;
use tracing::info;

pub struct SqliteTenantRegistry {
    pool: SqlitePool,
}

impl SqliteTenantRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a tenant row (seeding / registry sync)
    pub async fn upsert_tenant(&self, tenant: &Tenant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenants (
                id, external_id, name, active, auto_sync, sync_interval_minutes, last_sync_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                external_id = excluded.external_id,
                name = excluded.name,
                active = excluded.active,
                auto_sync = excluded.auto_sync,
                sync_interval_minutes = excluded.sync_interval_minutes,
                last_sync_at = excluded.last_sync_at
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.external_id)
        .bind(&tenant.name)
        .bind(tenant.active)
        .bind(tenant.auto_sync)
        .bind(tenant.sync_interval_minutes)
        .bind(tenant.last_sync_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    /// Store a credential for an existing tenant
    pub async fn store_credential(&self, credential: &TenantCredential) -> Result<()> {
        sqlx::query(
            "INSERT INTO tenant_credentials (tenant_id, access_token, expires_at) VALUES (?, ?, ?)",
        )
        .bind(&credential.tenant_id)
        .bind(&credential.access_token)
        .bind(credential.expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let rows = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Tenant::from).collect())
    }
}

#[async_trait]
impl TenantRegistry for SqliteTenantRegistry {
    async fn active_tenants_due_for_sync(&self, now_millis: i64) -> Result<Vec<Tenant>> {
        let rows = sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT * FROM tenants
            WHERE active = 1 AND auto_sync = 1
              AND (last_sync_at IS NULL
                   OR ? - last_sync_at >= sync_interval_minutes * 60000)
            ORDER BY id
            "#,
        )
        .bind(now_millis)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Tenant::from).collect())
    }

    async fn find(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = ?")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Tenant::from))
    }

    async fn update_last_sync(&self, tenant_id: &str, at_millis: i64) -> Result<()> {
        let result = sqlx::query("UPDATE tenants SET last_sync_at = ? WHERE id = ?")
            .bind(at_millis)
            .bind(tenant_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Tenant {} not found", tenant_id)));
        }
        Ok(())
    }

    async fn credential_for(
        &self,
        tenant_id: &str,
        now_millis: i64,
    ) -> Result<Option<TenantCredential>> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT tenant_id, access_token, expires_at FROM tenant_credentials
            WHERE tenant_id = ? AND expires_at > ?
            ORDER BY expires_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|(tenant_id, access_token, expires_at)| TenantCredential {
            tenant_id,
            access_token,
            expires_at,
        }))
    }

    async fn purge_expired_credentials(&self, now_millis: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tenant_credentials WHERE expires_at <= ?")
            .bind(now_millis)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged = purged, "Deleted expired tenant credentials");
        }
        Ok(purged)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: String,
    external_id: String,
    name: String,
    active: bool,
    auto_sync: bool,
    sync_interval_minutes: i64,
    last_sync_at: Option<i64>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            id: row.id,
            external_id: row.external_id,
            name: row.name,
            active: row.active,
            auto_sync: row.auto_sync,
            sync_interval_minutes: row.sync_interval_minutes,
            last_sync_at: row.last_sync_at,
        }
    }
}
