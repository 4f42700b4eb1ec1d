use nimbus_database::models::tenant::{Tenant, TenantId};
use serde::Serialize;
use std::time::Duration;

/// Final outcome of migrating one tenant, either from a batch run or a
/// single-tenant remediation run
#[derive(Debug, Clone, Serialize)]
pub struct TenantMigrationResult {
    pub tenant_id: TenantId,
    pub outcome: TenantOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TenantOutcome {
    /// Every pending migration was applied (zero when the schema was
    /// already up to date)
    Applied { migrations_applied: u64 },
    /// Terminal failure, retries exhausted or the error was not retryable
    Failed {
        migrations_applied: u64,
        message: String,
    },
    /// The run was cancelled before this tenant finished. Migrations
    /// already applied have committed and stay applied
    Cancelled { migrations_applied: u64 },
}

impl TenantMigrationResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TenantOutcome::Applied { .. })
    }
}

/// Failure record retained in the run summary for one tenant
#[derive(Debug, Clone, Serialize)]
pub struct TenantMigrationError {
    pub tenant_id: TenantId,
    pub subdomain: String,
    pub schema_name: String,
    pub message: String,
}

impl TenantMigrationError {
    pub fn new(tenant: &Tenant, message: String) -> Self {
        Self {
            tenant_id: tenant.id,
            subdomain: tenant.subdomain.clone(),
            schema_name: tenant.schema_name.clone(),
            message,
        }
    }
}

/// Outcome of one orchestration run across all active tenants
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRunSummary {
    /// Number of active tenants the run set out to migrate
    pub total_tenants: u64,
    /// Tenants fully migrated
    pub success_count: u64,
    /// Tenants that terminally failed
    pub failed_count: u64,
    /// Wall clock duration of the run
    pub duration: Duration,
    /// Whether the run was cancelled. Tenants not started by then are
    /// counted in `total_tenants` but in neither success nor failure
    pub cancelled: bool,
    /// Failure records for every terminally failed tenant
    pub errors: Vec<TenantMigrationError>,
    /// Run-level error when the run aborted before processing any tenant
    /// (directory unavailable, invalid configuration)
    pub error: Option<String>,
}

impl MigrationRunSummary {
    /// True only when every tenant migrated and the run neither aborted
    /// nor was cancelled
    pub fn overall_success(&self) -> bool {
        self.error.is_none() && !self.cancelled && self.failed_count == 0
    }
}
