use crate::{DbExecutor, DbResult, models::tenant::TenantId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::prelude::FromRow;

/// Ledger row recording a migration applied to a tenant schema
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TenantMigration {
    pub tenant_id: TenantId,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub struct CreateTenantMigration {
    pub tenant_id: TenantId,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

impl TenantMigration {
    /// Record a migration as applied for a tenant
    pub async fn create(db: impl DbExecutor<'_>, create: CreateTenantMigration) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "public"."nimbus_tenant_migrations" (
                "tenant_id",
                "name",
                "applied_at"
            )
            VALUES ($1, $2, $3)
        "#,
        )
        .bind(create.tenant_id)
        .bind(create.name)
        .bind(create.applied_at)
        .execute(db)
        .await?;

        Ok(())
    }

    /// Find all migrations recorded as applied for a tenant
    pub async fn find_by_tenant(
        db: impl DbExecutor<'_>,
        tenant_id: TenantId,
    ) -> DbResult<Vec<TenantMigration>> {
        sqlx::query_as(
            r#"SELECT * FROM "public"."nimbus_tenant_migrations" WHERE "tenant_id" = $1 ORDER BY "applied_at""#,
        )
        .bind(tenant_id)
        .fetch_all(db)
        .await
    }
}
