use sqlx::{PgPool, Postgres, Transaction};

pub use sqlx;
pub use sqlx::PgExecutor as DbExecutor;

pub mod migrations;
pub mod models;
pub mod pool;
pub mod router;
pub mod setup;
pub mod utils;

pub use pool::{DatabasePoolCache, DatabasePoolCacheConfig, DbConnectErr};

/// Type of the database connection pool
pub type DbPool = PgPool;

/// Short type alias for a database error
pub type DbErr = sqlx::Error;

/// Type alias for a result where the error is a [DbErr]
pub type DbResult<T> = Result<T, DbErr>;

/// Type of a database transaction
pub type DbTransaction<'c> = Transaction<'c, Postgres>;

/// Schema that holds the control-plane tables (tenant directory and
/// migration ledger). Tenant schemas never shadow it since control-plane
/// queries are always schema qualified.
pub const CONTROL_SCHEMA: &str = "public";
