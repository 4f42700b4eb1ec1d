#![forbid(unsafe_code)]

pub mod aggregate;
pub mod config;
pub mod directory;
pub mod executor;
pub mod orchestrator;
pub mod results;
pub mod retry;
pub mod source;

pub use config::OrchestratorConfig;
pub use orchestrator::MigrationOrchestrator;
pub use results::{MigrationRunSummary, TenantMigrationError, TenantMigrationResult};

/// nimbus-database re-exports
pub mod database {
    pub use nimbus_database::*;
}
