use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of tenants migrated concurrently
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Error)]
#[error("worker concurrency must be at least 1")]
pub struct InvalidConcurrency;

/// Tuning for one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Size of the bounded worker pool, one in-flight tenant per slot
    ///
    /// Default: 10
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-tenant retry/backoff policy
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Reject configurations that could never make progress
    pub fn validate(&self) -> Result<(), InvalidConcurrency> {
        if self.concurrency == 0 {
            return Err(InvalidConcurrency);
        }

        Ok(())
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
