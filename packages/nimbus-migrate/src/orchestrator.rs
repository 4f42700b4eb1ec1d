use crate::{
    aggregate::ResultAggregator,
    config::OrchestratorConfig,
    directory::{DirectoryError, TenantDirectory},
    executor::MigrationExecutor,
    results::{MigrationRunSummary, TenantMigrationResult},
    retry::RetryingExecutor,
    source::MigrationSource,
};
use futures::StreamExt;
use nimbus_database::models::tenant::TenantId;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RunTenantError {
    #[error("no tenant found with id {0}")]
    UnknownTenant(TenantId),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Fans the active tenant list out across a bounded pool of concurrent
/// workers and collects every outcome into one [MigrationRunSummary]
///
/// All collaborators are passed in explicitly at construction, tasks
/// receive the tenant value and borrowed handles, there is no ambient
/// service lookup.
pub struct MigrationOrchestrator<D, S> {
    directory: D,
    executor: RetryingExecutor<S>,
    config: OrchestratorConfig,
}

impl<D, S> MigrationOrchestrator<D, S>
where
    D: TenantDirectory,
    S: MigrationSource,
{
    pub fn new(directory: D, source: S, config: OrchestratorConfig) -> Self {
        let executor = RetryingExecutor::new(MigrationExecutor::new(source), config.retry.clone());

        Self {
            directory,
            executor,
            config,
        }
    }

    /// Migrate every active tenant, with at most `config.concurrency`
    /// tenants in flight at once.
    ///
    /// One tenant's failure never aborts its siblings, failures are
    /// converted into summary entries at the task boundary. A run-level
    /// failure (configuration, tenant directory) aborts before any
    /// tenant is contacted.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: &CancellationToken) -> MigrationRunSummary {
        let aggregator = ResultAggregator::new();

        // Fail fast before the directory is queried
        if let Err(error) = self.config.validate() {
            tracing::error!(%error, "invalid orchestrator configuration");
            return aggregator.finish_aborted(error.to_string());
        }

        let tenants = match self.directory.active_tenants().await {
            Ok(tenants) => tenants,
            Err(error) => {
                tracing::error!(%error, "failed to list active tenants");
                return aggregator.finish_aborted(error.to_string());
            }
        };

        let total_tenants = tenants.len() as u64;

        tracing::info!(
            total_tenants,
            concurrency = self.config.concurrency,
            "starting tenant migration run"
        );

        let executor = &self.executor;
        let aggregator_ref = &aggregator;

        futures::stream::iter(tenants)
            .map(|tenant| {
                let cancel = cancel.clone();

                async move {
                    // Tenants not yet started when the run is cancelled are
                    // skipped entirely, they show up in neither the success
                    // nor the failure counts
                    if cancel.is_cancelled() {
                        tracing::warn!(
                            tenant_id = %tenant.id,
                            subdomain = %tenant.subdomain,
                            "run cancelled, tenant skipped"
                        );
                        return;
                    }

                    let result = executor.apply_with_retry(&tenant, &cancel).await;
                    aggregator_ref.record(&tenant, &result);
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect::<Vec<()>>()
            .await;

        let summary = aggregator.finish(total_tenants, cancel.is_cancelled());

        tracing::info!(
            total_tenants = summary.total_tenants,
            success_count = summary.success_count,
            failed_count = summary.failed_count,
            cancelled = summary.cancelled,
            duration = ?summary.duration,
            "tenant migration run complete"
        );

        summary
    }

    /// Migrate a single tenant through the same retrying per-tenant path
    /// as [run](Self::run), for operator remediation after a batch run
    /// reports isolated failures
    #[tracing::instrument(skip(self, cancel))]
    pub async fn run_one(
        &self,
        tenant_id: TenantId,
        cancel: &CancellationToken,
    ) -> Result<TenantMigrationResult, RunTenantError> {
        let tenant = self
            .directory
            .tenant(tenant_id)
            .await?
            .ok_or(RunTenantError::UnknownTenant(tenant_id))?;

        let result = self.executor.apply_with_retry(&tenant, cancel).await;

        match &result.outcome {
            crate::results::TenantOutcome::Applied { migrations_applied } => {
                tracing::info!(
                    tenant_id = %tenant.id,
                    subdomain = %tenant.subdomain,
                    migrations_applied,
                    "tenant migrated"
                );
            }
            outcome => {
                tracing::warn!(
                    tenant_id = %tenant.id,
                    subdomain = %tenant.subdomain,
                    ?outcome,
                    "tenant migration did not complete"
                );
            }
        }

        Ok(result)
    }
}
