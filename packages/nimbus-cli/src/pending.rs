use crate::CliConfiguration;
use eyre::Context;
use nimbus_database::{DatabasePoolCache, migrations, models::tenant::Tenant};
use uuid::Uuid;

pub async fn pending(config: &CliConfiguration, tenant_id: Uuid) -> eyre::Result<()> {
    let pools = DatabasePoolCache::from_config(config.database.clone())
        .context("failed to connect to database")?;

    let db = pools
        .get_control_pool()
        .await
        .context("failed to connect to control-plane database")?;

    let tenant = Tenant::find_by_id(&db, tenant_id)
        .await
        .context("failed to get tenant")?
        .ok_or_else(|| eyre::eyre!("no tenant found with id {tenant_id}"))?;

    let pending = migrations::get_pending_tenant_migrations(&db, &tenant)
        .await
        .context("failed to get pending migrations")?;

    if pending.is_empty() {
        println!("{} is up to date", tenant.subdomain);
    } else {
        println!("{} has {} pending migrations:", tenant.subdomain, pending.len());
        for name in pending {
            println!("  {name}");
        }
    }

    pools.close_all().await;

    Ok(())
}
