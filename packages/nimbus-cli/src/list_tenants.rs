use crate::CliConfiguration;
use eyre::Context;
use nimbus_database::{DatabasePoolCache, models::tenant::Tenant};

pub async fn list_tenants(config: &CliConfiguration) -> eyre::Result<()> {
    let pools = DatabasePoolCache::from_config(config.database.clone())
        .context("failed to connect to database")?;

    let db = pools
        .get_control_pool()
        .await
        .context("failed to connect to control-plane database")?;

    let tenants = Tenant::all(&db).await.context("failed to get tenants")?;

    if tenants.is_empty() {
        println!("no tenants found");
    }

    for tenant in tenants {
        println!(
            "{} ({}) schema={} status={}",
            tenant.subdomain, tenant.id, tenant.schema_name, tenant.status
        );
    }

    pools.close_all().await;

    Ok(())
}
