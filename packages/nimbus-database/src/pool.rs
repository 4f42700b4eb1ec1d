//! # Database Pool
//!
//! Connection pool management for the shared multi-tenant database.
//!
//! One pool exists per tenant schema (plus one for the control-plane schema),
//! each built from the same base connection string with the tenant schema
//! applied as the connection `search_path` by the [router](crate::router).
//!
//! Pools are held in a cache with an expiry time to ensure they don't
//! hog too many database connections.
//!
//! ## Environment Variables
//!
//! * `NIMBUS_DATABASE_URL` - Connection string for the shared database server
//! * `NIMBUS_DB_MAX_CONNECTIONS` - Max connections each tenant pool can contain
//! * `NIMBUS_DB_MAX_CONTROL_CONNECTIONS` - Max connections the control-plane pool can contain
//! * `NIMBUS_DB_ACQUIRE_TIMEOUT` - Timeout before acquiring a connection fails
//! * `NIMBUS_DB_IDLE_TIMEOUT` - Timeout before an idle connection is closed to save resources
//! * `NIMBUS_DB_CACHE_DURATION` - Duration idle pools should be maintained for before closing
//! * `NIMBUS_DB_CACHE_CAPACITY` - Maximum database pools to hold at once

use crate::{
    CONTROL_SCHEMA, DbErr, DbPool,
    models::tenant::Tenant,
    router::{InvalidSchemaName, schema_connect_options},
};
use moka::{future::Cache, policy::EvictionPolicy};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::num::ParseIntError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Config for the database pool cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabasePoolCacheConfig {
    /// Connection string for the shared database server hosting every
    /// tenant schema and the control-plane schema
    pub connection_string: String,

    /// Max number of active connections per tenant schema pool
    ///
    /// Ensure a reasonable amount of connections are allocated but make
    /// sure that `max_connections` * your number of tenants stays
    /// within the limits for your database
    ///
    /// Default: 10
    pub max_connections: Option<u32>,

    /// Max number of active connections for the control-plane pool
    ///
    /// Control-plane queries (listing tenants, reading the migration
    /// ledger) are short lived and complete fast, they don't need a huge
    /// amount of resources allocated to them
    ///
    /// Default: 2
    pub max_connections_control: Option<u32>,

    /// Timeout in seconds before acquiring a database connection is
    /// considered a failure
    ///
    /// Default: 60s
    pub acquire_timeout: Option<u64>,

    /// If a connection has been idle for this duration in seconds the
    /// connection will be closed and released back to the database for
    /// other consumers
    ///
    /// Default: 10min
    pub idle_timeout: Option<u64>,

    /// Duration in seconds idle database pools are allowed to be cached
    /// before they are closed
    ///
    /// Default: 48h
    pub cache_duration: Option<u64>,

    /// Maximum database pools to maintain in the cache at once. If the
    /// cache capacity is exceeded old pools will be closed and removed
    /// from the cache
    ///
    /// This capacity should be aligned with your expected number of
    /// tenants along with your `max_connections` to ensure your database
    /// has enough connections to accommodate all tenants.
    ///
    /// Default: 50
    pub cache_capacity: Option<u64>,
}

#[derive(Debug, Error)]
pub enum DatabasePoolCacheConfigError {
    #[error("missing NIMBUS_DATABASE_URL environment variable")]
    MissingDatabaseUrl,
    #[error("invalid NIMBUS_DB_MAX_CONNECTIONS environment variable")]
    InvalidMaxConnections(ParseIntError),
    #[error("invalid NIMBUS_DB_MAX_CONTROL_CONNECTIONS environment variable")]
    InvalidMaxControlConnections(ParseIntError),
    #[error("invalid NIMBUS_DB_ACQUIRE_TIMEOUT environment variable")]
    InvalidAcquireTimeout(ParseIntError),
    #[error("invalid NIMBUS_DB_IDLE_TIMEOUT environment variable")]
    InvalidIdleTimeout(ParseIntError),
    #[error("invalid NIMBUS_DB_CACHE_DURATION environment variable")]
    InvalidCacheDuration(ParseIntError),
    #[error("invalid NIMBUS_DB_CACHE_CAPACITY environment variable")]
    InvalidCacheCapacity(ParseIntError),
}

impl DatabasePoolCacheConfig {
    pub fn from_env() -> Result<DatabasePoolCacheConfig, DatabasePoolCacheConfigError> {
        let connection_string = std::env::var("NIMBUS_DATABASE_URL")
            .map_err(|_| DatabasePoolCacheConfigError::MissingDatabaseUrl)?;

        let max_connections: Option<u32> = match std::env::var("NIMBUS_DB_MAX_CONNECTIONS") {
            Ok(value) => Some(
                value
                    .parse()
                    .map_err(DatabasePoolCacheConfigError::InvalidMaxConnections)?,
            ),
            Err(_) => None,
        };

        let max_connections_control: Option<u32> =
            match std::env::var("NIMBUS_DB_MAX_CONTROL_CONNECTIONS") {
                Ok(value) => Some(
                    value
                        .parse()
                        .map_err(DatabasePoolCacheConfigError::InvalidMaxControlConnections)?,
                ),
                Err(_) => None,
            };

        let acquire_timeout: Option<u64> = match std::env::var("NIMBUS_DB_ACQUIRE_TIMEOUT") {
            Ok(value) => Some(
                value
                    .parse()
                    .map_err(DatabasePoolCacheConfigError::InvalidAcquireTimeout)?,
            ),
            Err(_) => None,
        };

        let idle_timeout: Option<u64> = match std::env::var("NIMBUS_DB_IDLE_TIMEOUT") {
            Ok(value) => Some(
                value
                    .parse()
                    .map_err(DatabasePoolCacheConfigError::InvalidIdleTimeout)?,
            ),
            Err(_) => None,
        };

        let cache_duration: Option<u64> = match std::env::var("NIMBUS_DB_CACHE_DURATION") {
            Ok(value) => Some(
                value
                    .parse()
                    .map_err(DatabasePoolCacheConfigError::InvalidCacheDuration)?,
            ),
            Err(_) => None,
        };

        let cache_capacity: Option<u64> = match std::env::var("NIMBUS_DB_CACHE_CAPACITY") {
            Ok(value) => Some(
                value
                    .parse()
                    .map_err(DatabasePoolCacheConfigError::InvalidCacheCapacity)?,
            ),
            Err(_) => None,
        };

        Ok(DatabasePoolCacheConfig {
            connection_string,
            max_connections,
            max_connections_control,
            acquire_timeout,
            idle_timeout,
            cache_duration,
            cache_capacity,
        })
    }
}

#[derive(Debug, Error)]
pub enum DbConnectErr {
    #[error(transparent)]
    InvalidSchema(#[from] InvalidSchemaName),

    #[error(transparent)]
    Db(#[from] DbErr),

    #[error(transparent)]
    Shared(#[from] Arc<DbConnectErr>),
}

impl DbConnectErr {
    /// Whether the connection failure is worth retrying (transient
    /// connectivity rather than a bad schema name or credentials)
    pub fn is_retryable(&self) -> bool {
        use crate::utils::DatabaseErrorExt;

        match self {
            DbConnectErr::InvalidSchema(_) => false,
            DbConnectErr::Db(error) => error.is_retryable(),
            DbConnectErr::Shared(error) => error.is_retryable(),
        }
    }
}

/// Cache for database pools
pub struct DatabasePoolCache {
    /// Base connection options every schema-scoped pool derives from
    base_options: PgConnectOptions,

    /// Cache from the schema name to the pool scoped to that schema
    cache: Cache<String, DbPool>,

    /// Max connections per tenant schema pool
    max_connections: u32,
    /// Max connections for the control-plane pool
    max_connections_control: u32,

    acquire_timeout: Duration,
    idle_timeout: Duration,
}

impl DatabasePoolCache {
    pub fn from_config(config: DatabasePoolCacheConfig) -> Result<Self, DbErr> {
        let base_options: PgConnectOptions = config.connection_string.parse()?;

        let cache_duration = Duration::from_secs(config.cache_duration.unwrap_or(60 * 60 * 48));
        let cache_capacity = config.cache_capacity.unwrap_or(50);

        let cache = Cache::builder()
            .time_to_idle(cache_duration)
            .max_capacity(cache_capacity)
            .eviction_policy(EvictionPolicy::tiny_lfu())
            .async_eviction_listener(|schema: Arc<String>, pool: DbPool, _cause| {
                Box::pin(async move {
                    tracing::debug!(?schema, "database pool is no longer in use, closing");
                    pool.close().await
                })
            })
            .build();

        Ok(Self {
            base_options,
            cache,
            max_connections: config.max_connections.unwrap_or(10),
            max_connections_control: config.max_connections_control.unwrap_or(2),
            acquire_timeout: Duration::from_secs(config.acquire_timeout.unwrap_or(60)),
            idle_timeout: Duration::from_secs(config.idle_timeout.unwrap_or(60 * 10)),
        })
    }

    /// Request a database pool for the control-plane schema
    pub async fn get_control_pool(&self) -> Result<DbPool, DbConnectErr> {
        self.get_pool(CONTROL_SCHEMA).await
    }

    /// Request a database pool scoped to a specific tenant schema
    pub async fn get_tenant_pool(&self, tenant: &Tenant) -> Result<DbPool, DbConnectErr> {
        self.get_pool(&tenant.schema_name).await
    }

    /// Closes the database pool for the specific tenant if one is
    /// available and removes the pool from the cache
    pub async fn close_tenant_pool(&self, tenant: &Tenant) {
        if let Some(pool) = self.cache.remove(&tenant.schema_name).await {
            pool.close().await;
        }

        // Run cache async shutdown jobs
        self.cache.run_pending_tasks().await;
    }

    /// Empties the pool cache
    pub async fn flush(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Close all connections in the pool and invalidate the cache
    pub async fn close_all(&self) {
        for (_, value) in self.cache.iter() {
            value.close().await;
        }

        self.flush().await;
    }

    /// Obtains a database pool scoped to the provided schema
    async fn get_pool(&self, schema: &str) -> Result<DbPool, DbConnectErr> {
        let pool = self
            .cache
            .try_get_with(schema.to_string(), async {
                tracing::debug!(?schema, "acquiring database pool");

                let pool = self.create_pool(schema).await.map_err(Arc::new)?;

                Ok(pool)
            })
            .await?;

        Ok(pool)
    }

    /// Creates a database pool scoped to the provided schema
    async fn create_pool(&self, schema: &str) -> Result<DbPool, DbConnectErr> {
        tracing::debug!(?schema, "creating db pool connection");

        // Control-plane connections use the base options untouched, tenant
        // connections are confined to their schema by the router
        let options = match schema {
            CONTROL_SCHEMA => self.base_options.clone(),
            schema => schema_connect_options(&self.base_options, schema)?,
        };

        let max_connections = match schema {
            CONTROL_SCHEMA => self.max_connections_control,
            _ => self.max_connections,
        };

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(self.acquire_timeout)
            // Close any connections that have been idle to release them
            // back to the shared server
            .idle_timeout(self.idle_timeout)
            .connect_with(options)
            .await?;

        Ok(pool)
    }
}
