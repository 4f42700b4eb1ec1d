use crate::source::{MigrationSource, SourceError};
use nimbus_database::models::tenant::Tenant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("run cancelled before tenant finished migrating")]
    Cancelled { migrations_applied: u64 },

    #[error("{source}")]
    Source {
        migrations_applied: u64,
        #[source]
        source: SourceError,
    },
}

impl ExecuteError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecuteError::Cancelled { .. } => false,
            ExecuteError::Source { source, .. } => source.is_retryable(),
        }
    }

    pub fn migrations_applied(&self) -> u64 {
        match self {
            ExecuteError::Cancelled {
                migrations_applied,
            }
            | ExecuteError::Source {
                migrations_applied, ..
            } => *migrations_applied,
        }
    }
}

/// Applies all pending migrations for exactly one tenant
///
/// Does not retry, retry is the concern of
/// [RetryingExecutor](crate::retry::RetryingExecutor). Never touches any
/// other tenant's state.
pub struct MigrationExecutor<S> {
    source: S,
}

impl<S: MigrationSource> MigrationExecutor<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Apply every pending migration for the tenant in source order,
    /// returning the number applied.
    ///
    /// Re-running against an up-to-date schema is a cheap no-op.
    ///
    /// Cancellation is honored between migrations, never mid-migration,
    /// so an interrupted tenant is always at a migration boundary.
    #[tracing::instrument(
        skip(self, tenant, cancel),
        fields(tenant_id = %tenant.id, schema = %tenant.schema_name)
    )]
    pub async fn apply_pending(
        &self,
        tenant: &Tenant,
        cancel: &CancellationToken,
    ) -> Result<u64, ExecuteError> {
        let pending =
            self.source
                .pending(tenant)
                .await
                .map_err(|source| ExecuteError::Source {
                    migrations_applied: 0,
                    source,
                })?;

        if pending.is_empty() {
            tracing::debug!("tenant schema already up to date");
            return Ok(0);
        }

        let mut applied = 0u64;

        for name in pending {
            if cancel.is_cancelled() {
                return Err(ExecuteError::Cancelled {
                    migrations_applied: applied,
                });
            }

            self.source
                .apply(tenant, &name)
                .await
                .map_err(|source| ExecuteError::Source {
                    migrations_applied: applied,
                    source,
                })?;

            applied += 1;

            tracing::debug!(migration = %name, "applied tenant migration");
        }

        Ok(applied)
    }
}
