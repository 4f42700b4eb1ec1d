//! # Setup
//!
//! Control-plane bootstrap logic

use crate::{DbPool, DbResult};

/// Setup the control-plane tables (tenant directory and migration ledger)
/// in the shared database. Safe to run repeatedly.
pub async fn create_control_tables(db: &DbPool) -> DbResult<()> {
    sqlx::raw_sql(include_str!(
        "./migrations/control/m1_create_tenants_table.sql"
    ))
    .execute(db)
    .await?;

    sqlx::raw_sql(include_str!(
        "./migrations/control/m2_create_tenant_migrations_table.sql"
    ))
    .execute(db)
    .await?;

    Ok(())
}

/// Check whether the control-plane tables have been created yet
pub async fn is_control_initialized(db: &DbPool) -> DbResult<bool> {
    use crate::{models::tenant::Tenant, utils::DatabaseErrorExt};

    if let Err(error) = Tenant::find_by_id(db, uuid::Uuid::nil()).await {
        if error.is_table_does_not_exist() {
            return Ok(false);
        }

        return Err(error);
    }

    Ok(true)
}
