use clap::{Parser, Subcommand};
use eyre::Context;
use nimbus_database::pool::DatabasePoolCacheConfig;
use serde::Deserialize;
use std::path::PathBuf;
use uuid::Uuid;

mod init;
mod list_tenants;
mod migrate;
mod migrate_tenant;
mod pending;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the cli configuration file. When omitted the database
    /// configuration is read from NIMBUS_* environment variables
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Deserialize)]
pub struct CliConfiguration {
    pub database: DatabasePoolCacheConfig,

    #[serde(default)]
    pub migrate: MigrateSettings,
}

#[derive(Clone, Default, Deserialize)]
pub struct MigrateSettings {
    /// Worker pool size for batch migration runs
    pub concurrency: Option<usize>,
    /// Attempt ceiling per tenant
    pub max_attempts: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the control-plane tables in the shared database
    Init {},

    /// List all tenants in the directory
    ListTenants {},

    /// Show migrations not yet applied for a tenant
    Pending {
        /// ID of the tenant to inspect
        #[arg(short, long)]
        tenant_id: Uuid,
    },

    /// Apply pending migrations to every active tenant
    Migrate {
        /// Number of tenants to migrate concurrently
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Maximum migration attempts per tenant
        #[arg(short, long)]
        max_attempts: Option<u32>,
    },

    /// Apply pending migrations to a single tenant
    MigrateTenant {
        /// ID of the tenant to migrate
        #[arg(short, long)]
        tenant_id: Uuid,

        /// Maximum migration attempts for the tenant
        #[arg(short, long)]
        max_attempts: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Load environment variables
    _ = dotenvy::dotenv();

    // Setup colorful error logging
    color_eyre::install()?;

    // Start configuring a `fmt` subscriber
    let subscriber = tracing_subscriber::fmt()
        // Use the logging options from env variables
        .with_env_filter("sqlx=warn,info")
        // Display source code file paths
        .with_file(true)
        // Display source code line numbers
        .with_line_number(true)
        // Don't display the event's target (module path)
        .with_target(false)
        // Build the subscriber
        .finish();

    // use that subscriber to process traces emitted after this point
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let command = match args.command {
        Some(command) => command,
        None => {
            return Err(eyre::eyre!("please specify a command"));
        }
    };

    let config = load_configuration(args.config).await?;

    match command {
        Commands::Init {} => {
            init::init(&config).await?;
            Ok(())
        }
        Commands::ListTenants {} => {
            list_tenants::list_tenants(&config).await?;
            Ok(())
        }
        Commands::Pending { tenant_id } => {
            pending::pending(&config, tenant_id).await?;
            Ok(())
        }
        Commands::Migrate {
            concurrency,
            max_attempts,
        } => {
            migrate::migrate(&config, concurrency, max_attempts).await?;
            Ok(())
        }
        Commands::MigrateTenant {
            tenant_id,
            max_attempts,
        } => {
            migrate_tenant::migrate_tenant(&config, tenant_id, max_attempts).await?;
            Ok(())
        }
    }
}

/// Load the cli configuration from the provided file, falling back to the
/// environment when no file is given. A missing connection string fails
/// here, before any command starts work
async fn load_configuration(path: Option<PathBuf>) -> eyre::Result<CliConfiguration> {
    match path {
        Some(path) => {
            let config_raw = tokio::fs::read(path).await?;
            let config: CliConfiguration =
                serde_json::from_slice(&config_raw).context("failed to parse config")?;
            Ok(config)
        }
        None => {
            let database = DatabasePoolCacheConfig::from_env()
                .context("failed to load database config from environment")?;

            Ok(CliConfiguration {
                database,
                migrate: MigrateSettings::default(),
            })
        }
    }
}
