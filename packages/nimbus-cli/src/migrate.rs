use crate::CliConfiguration;
use eyre::Context;
use nimbus_database::DatabasePoolCache;
use nimbus_migrate::{
    MigrationOrchestrator, MigrationRunSummary, OrchestratorConfig,
    config::DEFAULT_CONCURRENCY,
    directory::PgTenantDirectory,
    retry::RetryPolicy,
    source::CatalogMigrationSource,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn migrate(
    config: &CliConfiguration,
    concurrency: Option<usize>,
    max_attempts: Option<u32>,
) -> eyre::Result<()> {
    let pools = Arc::new(
        DatabasePoolCache::from_config(config.database.clone())
            .context("failed to connect to database")?,
    );

    let orchestrator_config = OrchestratorConfig {
        concurrency: concurrency
            .or(config.migrate.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY),
        retry: max_attempts
            .or(config.migrate.max_attempts)
            .map(RetryPolicy::new)
            .unwrap_or_default(),
    };

    let orchestrator = MigrationOrchestrator::new(
        PgTenantDirectory::new(pools.clone()),
        CatalogMigrationSource::new(pools.clone()),
        orchestrator_config,
    );

    let cancel = CancellationToken::new();

    // Cancel the run gracefully on ctrl-c, in-flight migrations finish
    // their current atomic unit and unstarted tenants are skipped
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling migration run");
                cancel.cancel();
            }
        }
    });

    let summary = orchestrator.run(&cancel).await;

    print_summary(&summary);

    pools.close_all().await;

    if !summary.overall_success() {
        eyre::bail!("migration run did not complete successfully");
    }

    Ok(())
}

fn print_summary(summary: &MigrationRunSummary) {
    if summary.cancelled {
        println!("migration run cancelled");
    } else {
        println!("migration run complete");
    }

    println!("  tenants:   {}", summary.total_tenants);
    println!("  succeeded: {}", summary.success_count);
    println!("  failed:    {}", summary.failed_count);
    println!("  duration:  {:.2?}", summary.duration);

    if let Some(error) = &summary.error {
        println!("run aborted: {error}");
    }

    if !summary.errors.is_empty() {
        println!("failed tenants:");
        for error in &summary.errors {
            println!(
                "  {} ({}) schema={}: {}",
                error.subdomain, error.tenant_id, error.schema_name, error.message
            );
        }
        println!("re-run failed tenants individually with `nimbus-cli migrate-tenant`");
    }
}
