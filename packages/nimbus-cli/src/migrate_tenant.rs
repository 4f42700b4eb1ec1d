use crate::CliConfiguration;
use eyre::Context;
use nimbus_database::DatabasePoolCache;
use nimbus_migrate::{
    MigrationOrchestrator, OrchestratorConfig,
    directory::PgTenantDirectory,
    results::TenantOutcome,
    retry::RetryPolicy,
    source::CatalogMigrationSource,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub async fn migrate_tenant(
    config: &CliConfiguration,
    tenant_id: Uuid,
    max_attempts: Option<u32>,
) -> eyre::Result<()> {
    let pools = Arc::new(
        DatabasePoolCache::from_config(config.database.clone())
            .context("failed to connect to database")?,
    );

    let orchestrator_config = OrchestratorConfig {
        retry: max_attempts
            .or(config.migrate.max_attempts)
            .map(RetryPolicy::new)
            .unwrap_or_default(),
        ..Default::default()
    };

    let orchestrator = MigrationOrchestrator::new(
        PgTenantDirectory::new(pools.clone()),
        CatalogMigrationSource::new(pools.clone()),
        orchestrator_config,
    );

    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling migration");
                cancel.cancel();
            }
        }
    });

    let result = orchestrator.run_one(tenant_id, &cancel).await?;

    pools.close_all().await;

    match result.outcome {
        TenantOutcome::Applied { migrations_applied } => {
            println!("tenant migrated, {migrations_applied} migrations applied");
            Ok(())
        }
        TenantOutcome::Failed {
            migrations_applied,
            message,
        } => {
            println!("tenant migration failed after applying {migrations_applied} migrations");
            Err(eyre::eyre!(message))
        }
        TenantOutcome::Cancelled { migrations_applied } => {
            println!("tenant migration cancelled after applying {migrations_applied} migrations");
            Err(eyre::eyre!("migration cancelled"))
        }
    }
}
