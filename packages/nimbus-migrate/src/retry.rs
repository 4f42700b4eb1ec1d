use crate::{
    executor::{ExecuteError, MigrationExecutor},
    results::{TenantMigrationResult, TenantOutcome},
    source::MigrationSource,
};
use nimbus_database::models::tenant::Tenant;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounded-retry policy for per-tenant migration attempts
///
/// Migrations can fail transiently (lock timeouts, brief connectivity
/// loss) but a broken migration should not be retried forever, the
/// attempt ceiling bounds worst-case latency per tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per tenant, including the first
    pub max_attempts: u32,

    /// Base duration for exponential backoff
    pub base_backoff: Duration,

    /// Ceiling applied to the computed backoff
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay inserted after the given 1-based failed attempt,
    /// `base * 2^attempt` capped at `max_backoff`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            .min(self.max_backoff)
    }
}

/// Wraps [MigrationExecutor] with the bounded-retry/backoff policy,
/// converting the attempt loop into a single terminal
/// [TenantMigrationResult]
pub struct RetryingExecutor<S> {
    executor: MigrationExecutor<S>,
    policy: RetryPolicy,
}

impl<S: MigrationSource> RetryingExecutor<S> {
    pub fn new(executor: MigrationExecutor<S>, policy: RetryPolicy) -> Self {
        Self { executor, policy }
    }

    /// Attempt the tenant's migrations, sleeping an exponential backoff
    /// between retryable failures. Exactly one terminal result is
    /// produced per tenant no matter how many attempts were made.
    ///
    /// Cancellation observed during a backoff sleep aborts immediately,
    /// mid-attempt cancellation is honored by the executor at the next
    /// migration boundary.
    pub async fn apply_with_retry(
        &self,
        tenant: &Tenant,
        cancel: &CancellationToken,
    ) -> TenantMigrationResult {
        let mut attempt = 1u32;

        loop {
            let error = match self.executor.apply_pending(tenant, cancel).await {
                Ok(migrations_applied) => {
                    return TenantMigrationResult {
                        tenant_id: tenant.id,
                        outcome: TenantOutcome::Applied { migrations_applied },
                    };
                }
                Err(error) => error,
            };

            if let ExecuteError::Cancelled { migrations_applied } = error {
                return TenantMigrationResult {
                    tenant_id: tenant.id,
                    outcome: TenantOutcome::Cancelled { migrations_applied },
                };
            }

            if attempt >= self.policy.max_attempts || !error.is_retryable() {
                tracing::error!(
                    tenant_id = %tenant.id,
                    schema = %tenant.schema_name,
                    %error,
                    attempt,
                    "tenant migration failed terminally"
                );

                return TenantMigrationResult {
                    tenant_id: tenant.id,
                    outcome: TenantOutcome::Failed {
                        migrations_applied: error.migrations_applied(),
                        message: error.to_string(),
                    },
                };
            }

            let backoff = self.policy.backoff(attempt);

            tracing::warn!(
                tenant_id = %tenant.id,
                schema = %tenant.schema_name,
                %error,
                attempt,
                ?backoff,
                "tenant migration attempt failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return TenantMigrationResult {
                        tenant_id: tenant.id,
                        outcome: TenantOutcome::Cancelled {
                            migrations_applied: error.migrations_applied(),
                        },
                    };
                }
                _ = tokio::time::sleep(backoff) => {}
            }

            attempt += 1;
        }
    }
}
