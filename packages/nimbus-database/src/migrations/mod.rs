use crate::{
    DbPool, DbResult,
    models::{
        tenant::Tenant,
        tenant_migration::{CreateTenantMigration, TenantMigration},
    },
};
use chrono::Utc;
use std::ops::DerefMut;

/// Ordered catalog of tenant schema migrations. Every tenant schema is
/// brought up to date by applying the entries missing from its ledger,
/// strictly in this order.
pub const TENANT_MIGRATIONS: &[(&str, &str)] = &[
    (
        "m1_create_customers_table",
        include_str!("./tenant/m1_create_customers_table.sql"),
    ),
    (
        "m2_create_products_table",
        include_str!("./tenant/m2_create_products_table.sql"),
    ),
    (
        "m3_create_invoices_table",
        include_str!("./tenant/m3_create_invoices_table.sql"),
    ),
    (
        "m4_create_documents_table",
        include_str!("./tenant/m4_create_documents_table.sql"),
    ),
];

/// Find the SQL for a catalog migration by name
pub fn find_tenant_migration(name: &str) -> Option<&'static str> {
    TENANT_MIGRATIONS
        .iter()
        .find(|(migration_name, _migration)| *migration_name == name)
        .map(|(_migration_name, migration)| *migration)
}

/// Catalog migrations not present in the provided set of applied
/// ledger rows, in catalog order
pub fn pending_migration_names(applied: &[TenantMigration]) -> Vec<String> {
    TENANT_MIGRATIONS
        .iter()
        .filter(|(migration_name, _migration)| {
            // Skip already applied migrations
            !applied
                .iter()
                .any(|migration| migration.name.eq(migration_name))
        })
        .map(|(migration_name, _migration)| migration_name.to_string())
        .collect()
}

/// Get all pending migrations for a tenant that have not been applied yet
pub async fn get_pending_tenant_migrations(
    db: impl crate::DbExecutor<'_>,
    tenant: &Tenant,
) -> DbResult<Vec<String>> {
    let applied = TenantMigration::find_by_tenant(db, tenant.id).await?;
    Ok(pending_migration_names(&applied))
}

/// Apply a single catalog migration to the tenant's schema and record it
/// in the ledger.
///
/// The statements and the ledger insert share one transaction, a failure
/// part way leaves the schema exactly as it was before this migration.
///
/// `db` - Pool scoped to the tenant's schema
pub async fn apply_tenant_migration(
    db: &DbPool,
    tenant: &Tenant,
    migration_name: &str,
    migration: &str,
) -> DbResult<()> {
    let mut t = db.begin().await?;

    // Split the SQL queries into multiple queries
    let queries = migration
        .split(';')
        .map(|query| query.trim())
        .filter(|query| !query.is_empty());

    for query in queries {
        let result = sqlx::query(query)
            .execute(t.deref_mut())
            .await
            .inspect_err(|error| {
                tracing::error!(?error, ?migration_name, "failed to perform migration")
            })?;
        let rows_affected = result.rows_affected();

        tracing::debug!(?migration_name, ?rows_affected, "applied migration query");
    }

    // Record the applied migration, qualified so the tenant-scoped
    // connection reaches the control-plane ledger
    TenantMigration::create(
        t.deref_mut(),
        CreateTenantMigration {
            tenant_id: tenant.id,
            name: migration_name.to_string(),
            applied_at: Utc::now(),
        },
    )
    .await?;

    t.commit().await?;

    Ok(())
}
