use nimbus_database::{
    DatabasePoolCache, DbConnectErr, DbErr,
    models::tenant::{Tenant, TenantId},
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("error connecting to control-plane database: {0}")]
    Connect(DbConnectErr),

    #[error("tenant directory unavailable: {0}")]
    Unavailable(DbErr),
}

/// Read access to the tenant directory
///
/// A run takes a materialized snapshot of the directory up front, tenants
/// created while a run is in flight are picked up by the next run
pub trait TenantDirectory: Send + Sync + 'static {
    /// List all Active tenants, ordered by subdomain
    fn active_tenants(&self) -> impl Future<Output = Result<Vec<Tenant>, DirectoryError>> + Send;

    /// Look up a single tenant by id, regardless of status
    fn tenant(
        &self,
        id: TenantId,
    ) -> impl Future<Output = Result<Option<Tenant>, DirectoryError>> + Send;
}

/// Directory backed by the control-plane tenants table
pub struct PgTenantDirectory {
    pools: Arc<DatabasePoolCache>,
}

impl PgTenantDirectory {
    pub fn new(pools: Arc<DatabasePoolCache>) -> Self {
        Self { pools }
    }
}

impl TenantDirectory for PgTenantDirectory {
    async fn active_tenants(&self) -> Result<Vec<Tenant>, DirectoryError> {
        let db = self
            .pools
            .get_control_pool()
            .await
            .map_err(DirectoryError::Connect)?;

        Tenant::find_active(&db)
            .await
            .map_err(DirectoryError::Unavailable)
    }

    async fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, DirectoryError> {
        let db = self
            .pools
            .get_control_pool()
            .await
            .map_err(DirectoryError::Connect)?;

        Tenant::find_by_id(&db, id)
            .await
            .map_err(DirectoryError::Unavailable)
    }
}
