use crate::{DbExecutor, DbResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use std::str::FromStr;
use uuid::Uuid;

pub type TenantId = Uuid;

/// Lifecycle state of a tenant. Only [TenantStatus::Active] tenants
/// receive traffic and migrations
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    Deserialize,
    Serialize,
)]
pub enum TenantStatus {
    /// Tenant is live and serving traffic
    Active,
    /// Tenant access is paused (billing, abuse), data is retained
    Suspended,
    /// Tenant is being provisioned and is not ready for traffic
    Pending,
    /// Tenant is marked for removal
    Deleted,
}

impl TryFrom<String> for TenantStatus {
    type Error = strum::ParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        TenantStatus::from_str(&value)
    }
}

/// One isolated customer of the platform, mapped to one database schema
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Tenant {
    /// Unique ID for the tenant
    pub id: TenantId,
    /// Human readable unique key, also the tenant's subdomain
    pub subdomain: String,
    /// Name of the database schema holding the tenant's data
    pub schema_name: String,
    /// Lifecycle status of the tenant
    #[sqlx(try_from = "String")]
    pub status: TenantStatus,
    /// When the tenant was created
    pub created_at: DateTime<Utc>,
}

pub struct CreateTenant {
    pub id: TenantId,
    pub subdomain: String,
    pub schema_name: String,
    pub status: TenantStatus,
}

impl Tenant {
    /// Create a new tenant directory entry
    pub async fn create(db: impl DbExecutor<'_>, create: CreateTenant) -> DbResult<Tenant> {
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO "public"."nimbus_tenants" (
                "id",
                "subdomain",
                "schema_name",
                "status",
                "created_at"
            )
            VALUES ($1, $2, $3, $4, $5)
        "#,
        )
        .bind(create.id)
        .bind(create.subdomain.as_str())
        .bind(create.schema_name.as_str())
        .bind(create.status.to_string())
        .bind(created_at)
        .execute(db)
        .await?;

        Ok(Tenant {
            id: create.id,
            subdomain: create.subdomain,
            schema_name: create.schema_name,
            status: create.status,
            created_at,
        })
    }

    /// Find a tenant by `id`
    pub async fn find_by_id(db: impl DbExecutor<'_>, id: TenantId) -> DbResult<Option<Tenant>> {
        sqlx::query_as(r#"SELECT * FROM "public"."nimbus_tenants" WHERE "id" = $1"#)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Find a tenant by its `subdomain`
    pub async fn find_by_subdomain(
        db: impl DbExecutor<'_>,
        subdomain: &str,
    ) -> DbResult<Option<Tenant>> {
        sqlx::query_as(r#"SELECT * FROM "public"."nimbus_tenants" WHERE "subdomain" = $1"#)
            .bind(subdomain)
            .fetch_optional(db)
            .await
    }

    /// Finds all active tenants, ordered by subdomain so runs process and
    /// log tenants in a deterministic order
    pub async fn find_active(db: impl DbExecutor<'_>) -> DbResult<Vec<Tenant>> {
        sqlx::query_as(
            r#"SELECT * FROM "public"."nimbus_tenants" WHERE "status" = $1 ORDER BY "subdomain""#,
        )
        .bind(TenantStatus::Active.to_string())
        .fetch_all(db)
        .await
    }

    /// Finds all tenants regardless of status
    pub async fn all(db: impl DbExecutor<'_>) -> DbResult<Vec<Tenant>> {
        sqlx::query_as(r#"SELECT * FROM "public"."nimbus_tenants" ORDER BY "subdomain""#)
            .fetch_all(db)
            .await
    }
}
