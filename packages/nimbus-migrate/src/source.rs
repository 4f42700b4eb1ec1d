use nimbus_database::{
    DatabasePoolCache, DbConnectErr, DbErr, migrations,
    models::tenant::Tenant,
    utils::DatabaseErrorExt,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown migration: {0:?}")]
    UnknownMigration(String),

    #[error(transparent)]
    Connect(#[from] DbConnectErr),

    #[error(transparent)]
    Db(#[from] DbErr),
}

impl SourceError {
    /// Whether retrying the operation could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::UnknownMigration(_) => false,
            SourceError::Connect(error) => error.is_retryable(),
            SourceError::Db(error) => error.is_retryable(),
        }
    }
}

/// The migration framework boundary: knows, per tenant, which migrations
/// are still pending and how to atomically apply one and record it as
/// applied
pub trait MigrationSource: Send + Sync + 'static {
    /// Names of the migrations not yet applied for the tenant, in
    /// application order
    fn pending(&self, tenant: &Tenant)
    -> impl Future<Output = Result<Vec<String>, SourceError>> + Send;

    /// Apply one migration to the tenant's schema and record it, as a
    /// single atomic unit
    fn apply(
        &self,
        tenant: &Tenant,
        name: &str,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// Migration source backed by the compiled-in migration catalog and the
/// control-plane ledger table
pub struct CatalogMigrationSource {
    pools: Arc<DatabasePoolCache>,
}

impl CatalogMigrationSource {
    pub fn new(pools: Arc<DatabasePoolCache>) -> Self {
        Self { pools }
    }
}

impl MigrationSource for CatalogMigrationSource {
    async fn pending(&self, tenant: &Tenant) -> Result<Vec<String>, SourceError> {
        let db = self.pools.get_control_pool().await?;

        let pending = migrations::get_pending_tenant_migrations(&db, tenant).await?;
        Ok(pending)
    }

    async fn apply(&self, tenant: &Tenant, name: &str) -> Result<(), SourceError> {
        let migration = migrations::find_tenant_migration(name)
            .ok_or_else(|| SourceError::UnknownMigration(name.to_string()))?;

        let db = self.pools.get_tenant_pool(tenant).await?;

        migrations::apply_tenant_migration(&db, tenant, name, migration).await?;
        Ok(())
    }
}
