use crate::results::{
    MigrationRunSummary, TenantMigrationError, TenantMigrationResult, TenantOutcome,
};
use nimbus_database::models::tenant::Tenant;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Concurrency-safe accumulation of per-tenant outcomes into one run
/// summary. Passive data structure consumed only by the orchestrator,
/// the duration timer starts when the aggregator is created at run entry.
pub struct ResultAggregator {
    started: Instant,
    success: AtomicU64,
    failed: AtomicU64,
    errors: Mutex<Vec<TenantMigrationError>>,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Record one tenant's terminal outcome. Cancelled tenants count as
    /// neither success nor failure, the summary's cancelled flag covers
    /// them.
    ///
    /// Also emits the per-tenant outcome log event for operators.
    pub fn record(&self, tenant: &Tenant, result: &TenantMigrationResult) {
        match &result.outcome {
            TenantOutcome::Applied { migrations_applied } => {
                self.success.fetch_add(1, Ordering::AcqRel);

                tracing::info!(
                    tenant_id = %tenant.id,
                    subdomain = %tenant.subdomain,
                    schema = %tenant.schema_name,
                    migrations_applied,
                    "tenant migrated"
                );
            }
            TenantOutcome::Failed {
                migrations_applied,
                message,
            } => {
                self.failed.fetch_add(1, Ordering::AcqRel);

                let mut errors = self
                    .errors
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                errors.push(TenantMigrationError::new(tenant, message.clone()));

                tracing::error!(
                    tenant_id = %tenant.id,
                    subdomain = %tenant.subdomain,
                    schema = %tenant.schema_name,
                    migrations_applied,
                    error = %message,
                    "tenant migration failed"
                );
            }
            TenantOutcome::Cancelled { migrations_applied } => {
                tracing::warn!(
                    tenant_id = %tenant.id,
                    subdomain = %tenant.subdomain,
                    schema = %tenant.schema_name,
                    migrations_applied,
                    "tenant migration interrupted by cancellation"
                );
            }
        }
    }

    /// Assemble the summary once every scheduled task has completed
    pub fn finish(self, total_tenants: u64, cancelled: bool) -> MigrationRunSummary {
        let errors = self
            .errors
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        MigrationRunSummary {
            total_tenants,
            success_count: self.success.into_inner(),
            failed_count: self.failed.into_inner(),
            duration: self.started.elapsed(),
            cancelled,
            errors,
            error: None,
        }
    }

    /// Summary for a run that aborted before processing any tenant
    pub fn finish_aborted(self, error: String) -> MigrationRunSummary {
        MigrationRunSummary {
            total_tenants: 0,
            success_count: 0,
            failed_count: 0,
            duration: self.started.elapsed(),
            cancelled: false,
            errors: Vec::new(),
            error: Some(error),
        }
    }
}
