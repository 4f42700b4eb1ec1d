use crate::CliConfiguration;
use eyre::Context;
use nimbus_database::{DatabasePoolCache, setup};

pub async fn init(config: &CliConfiguration) -> eyre::Result<()> {
    let pools = DatabasePoolCache::from_config(config.database.clone())
        .context("failed to connect to database")?;

    let db = pools
        .get_control_pool()
        .await
        .context("failed to connect to control-plane database")?;

    if setup::is_control_initialized(&db).await? {
        println!("control-plane tables already exist");
    } else {
        setup::create_control_tables(&db)
            .await
            .context("failed to create control-plane tables")?;

        println!("created control-plane tables");
    }

    pools.close_all().await;

    Ok(())
}
