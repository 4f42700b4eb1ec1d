use chrono::Utc;
use nimbus_migrate::{
    MigrationOrchestrator, OrchestratorConfig,
    database::{
        DbErr,
        models::tenant::{Tenant, TenantId, TenantStatus},
    },
    directory::{DirectoryError, TenantDirectory},
    executor::MigrationExecutor,
    orchestrator::RunTenantError,
    results::TenantOutcome,
    retry::RetryPolicy,
    source::{MigrationSource, SourceError},
};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Make a test tenant with a schema derived from its subdomain
fn make_tenant(subdomain: &str) -> Tenant {
    Tenant {
        id: Uuid::new_v4(),
        subdomain: subdomain.to_string(),
        schema_name: format!("tenant_{subdomain}"),
        status: TenantStatus::Active,
        created_at: Utc::now(),
    }
}

/// In-memory tenant directory
struct FakeDirectory {
    tenants: Vec<Tenant>,
    fail: bool,
    queried: Arc<AtomicBool>,
}

impl FakeDirectory {
    fn new(tenants: Vec<Tenant>) -> Self {
        Self {
            tenants,
            fail: false,
            queried: Arc::new(AtomicBool::new(false)),
        }
    }

    fn unavailable() -> Self {
        Self {
            tenants: Vec::new(),
            fail: true,
            queried: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl TenantDirectory for FakeDirectory {
    async fn active_tenants(&self) -> Result<Vec<Tenant>, DirectoryError> {
        self.queried.store(true, Ordering::SeqCst);

        if self.fail {
            return Err(DirectoryError::Unavailable(DbErr::PoolTimedOut));
        }

        Ok(self.tenants.clone())
    }

    async fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, DirectoryError> {
        self.queried.store(true, Ordering::SeqCst);

        if self.fail {
            return Err(DirectoryError::Unavailable(DbErr::PoolTimedOut));
        }

        Ok(self.tenants.iter().find(|tenant| tenant.id == id).cloned())
    }
}

#[derive(Default)]
struct FakeSourceState {
    /// Migrations not yet applied, per tenant
    pending: HashMap<TenantId, Vec<String>>,
    /// Number of leading apply calls that fail with a transient error
    transient_failures: HashMap<TenantId, u32>,
    /// Tenants whose apply calls always fail non-retryably
    broken: HashSet<TenantId>,
    /// Apply invocations per tenant
    attempts: HashMap<TenantId, u32>,
    /// Clock readings of every apply invocation per tenant
    attempted_at: HashMap<TenantId, Vec<Instant>>,
    /// Successfully applied migrations in application order
    applied: Vec<(TenantId, String)>,
    /// Cancel this token on the first apply call for the tenant
    cancel_on_apply: Option<(TenantId, CancellationToken)>,
}

/// In-memory migration source with scriptable failures
#[derive(Default)]
struct FakeSource {
    state: Mutex<FakeSourceState>,
}

impl FakeSource {
    fn new() -> SharedSource {
        SharedSource(Arc::new(Self::default()))
    }

    fn with_pending(&self, tenant: &Tenant, migrations: &[&str]) {
        self.state.lock().unwrap().pending.insert(
            tenant.id,
            migrations.iter().map(|name| name.to_string()).collect(),
        );
    }

    fn fail_transiently(&self, tenant: &Tenant, times: u32) {
        self.state
            .lock()
            .unwrap()
            .transient_failures
            .insert(tenant.id, times);
    }

    fn fail_always(&self, tenant: &Tenant) {
        self.state.lock().unwrap().broken.insert(tenant.id);
    }

    fn cancel_on_apply(&self, tenant: &Tenant, cancel: &CancellationToken) {
        self.state.lock().unwrap().cancel_on_apply = Some((tenant.id, cancel.clone()));
    }

    fn attempts(&self, tenant: &Tenant) -> u32 {
        self.state
            .lock()
            .unwrap()
            .attempts
            .get(&tenant.id)
            .copied()
            .unwrap_or(0)
    }

    fn attempted_at(&self, tenant: &Tenant) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .attempted_at
            .get(&tenant.id)
            .cloned()
            .unwrap_or_default()
    }

    fn applied(&self, tenant: &Tenant) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .applied
            .iter()
            .filter(|(tenant_id, _name)| tenant_id == &tenant.id)
            .map(|(_tenant_id, name)| name.clone())
            .collect()
    }
}

/// Shared handle to a [FakeSource] the test keeps a clone of while the
/// orchestrator owns another — an integration test cannot implement the
/// foreign trait directly on `Arc<FakeSource>` (orphan rule), so this
/// local newtype carries the impl and derefs to the inner source for the
/// scripting helpers.
#[derive(Clone)]
struct SharedSource(Arc<FakeSource>);

impl std::ops::Deref for SharedSource {
    type Target = FakeSource;

    fn deref(&self) -> &FakeSource {
        &self.0
    }
}

impl MigrationSource for SharedSource {
    async fn pending(&self, tenant: &Tenant) -> Result<Vec<String>, SourceError> {
        let state = self.state.lock().unwrap();
        Ok(state.pending.get(&tenant.id).cloned().unwrap_or_default())
    }

    async fn apply(&self, tenant: &Tenant, name: &str) -> Result<(), SourceError> {
        let mut state = self.state.lock().unwrap();

        *state.attempts.entry(tenant.id).or_insert(0) += 1;
        state
            .attempted_at
            .entry(tenant.id)
            .or_default()
            .push(Instant::now());

        if let Some((tenant_id, cancel)) = &state.cancel_on_apply {
            if tenant_id == &tenant.id {
                cancel.cancel();
            }
        }

        if state.broken.contains(&tenant.id) {
            return Err(SourceError::UnknownMigration(name.to_string()));
        }

        if let Some(remaining) = state.transient_failures.get_mut(&tenant.id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SourceError::Db(DbErr::PoolTimedOut));
            }
        }

        if let Some(pending) = state.pending.get_mut(&tenant.id) {
            pending.retain(|pending_name| pending_name != name);
        }
        state.applied.push((tenant.id, name.to_string()));

        Ok(())
    }
}

fn orchestrator(
    directory: FakeDirectory,
    source: SharedSource,
    concurrency: usize,
) -> MigrationOrchestrator<FakeDirectory, SharedSource> {
    MigrationOrchestrator::new(
        directory,
        source,
        OrchestratorConfig {
            concurrency,
            retry: RetryPolicy::default(),
        },
    )
}

/// With no faults injected every tenant succeeds and the summary counts
/// line up with the tenant list
#[tokio::test]
async fn test_run_migrates_all_tenants() {
    let tenants = vec![make_tenant("acme"), make_tenant("beta"), make_tenant("casa")];

    let source = FakeSource::new();
    for tenant in &tenants {
        source.with_pending(tenant, &["m1_create_customers_table", "m2_create_products_table"]);
    }

    let orchestrator = orchestrator(FakeDirectory::new(tenants.clone()), source.clone(), 4);
    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert_eq!(summary.total_tenants, 3);
    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.failed_count, 0);
    assert!(summary.errors.is_empty());
    assert!(!summary.cancelled);
    assert!(summary.overall_success());

    // Within each tenant migrations were applied in source order
    for tenant in &tenants {
        assert_eq!(
            source.applied(tenant),
            vec![
                "m1_create_customers_table".to_string(),
                "m2_create_products_table".to_string()
            ]
        );
    }
}

/// An up-to-date system reports success with zero applied migrations,
/// re-running is always safe and cheap
#[tokio::test]
async fn test_apply_pending_is_idempotent() {
    let tenant = make_tenant("acme");
    let source = FakeSource::new();
    source.with_pending(&tenant, &["m1_create_customers_table"]);

    let executor = MigrationExecutor::new(source.clone());
    let cancel = CancellationToken::new();

    let applied = executor.apply_pending(&tenant, &cancel).await.unwrap();
    assert_eq!(applied, 1);

    // Second run has nothing left to do
    let applied = executor.apply_pending(&tenant, &cancel).await.unwrap();
    assert_eq!(applied, 0);
}

/// Zero active tenants is a successful no-op run
#[tokio::test]
async fn test_run_with_no_tenants_succeeds() {
    let orchestrator = orchestrator(FakeDirectory::new(Vec::new()), FakeSource::new(), 4);
    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert_eq!(summary.total_tenants, 0);
    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.failed_count, 0);
    assert!(summary.overall_success());
}

/// A transient failure on the first attempt is absorbed by the retry
/// policy and the tenant still ends up successful
#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_on_retry() {
    let tenant = make_tenant("acme");
    let source = FakeSource::new();
    source.with_pending(&tenant, &["m1_create_customers_table"]);
    source.fail_transiently(&tenant, 1);

    let orchestrator = orchestrator(FakeDirectory::new(vec![tenant.clone()]), source.clone(), 2);
    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.failed_count, 0);
    assert!(summary.overall_success());

    // First attempt failed, second succeeded
    assert_eq!(source.attempts(&tenant), 2);
}

/// A tenant failing on every attempt produces exactly one error record,
/// and the backoff before each retry never shrinks
#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_record_one_error_with_growing_backoff() {
    let tenant = make_tenant("acme");
    let source = FakeSource::new();
    source.with_pending(&tenant, &["m1_create_customers_table"]);
    source.fail_transiently(&tenant, u32::MAX);

    let orchestrator = orchestrator(FakeDirectory::new(vec![tenant.clone()]), source.clone(), 2);
    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].tenant_id, tenant.id);
    assert_eq!(summary.errors[0].schema_name, tenant.schema_name);

    // Attempt ceiling respected
    let attempts = source.attempted_at(&tenant);
    assert_eq!(attempts.len(), 3);

    // Delays between attempts are non-decreasing
    let first_delay = attempts[1] - attempts[0];
    let second_delay = attempts[2] - attempts[1];
    assert!(first_delay >= Duration::from_secs(2));
    assert!(second_delay >= first_delay);
}

/// Non-retryable errors fail immediately without burning the remaining
/// attempts on a migration that can never succeed
#[tokio::test]
async fn test_non_retryable_failure_is_terminal_on_first_attempt() {
    let tenant = make_tenant("acme");
    let source = FakeSource::new();
    source.with_pending(&tenant, &["m1_create_customers_table"]);
    source.fail_always(&tenant);

    let orchestrator = orchestrator(FakeDirectory::new(vec![tenant.clone()]), source.clone(), 2);
    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert_eq!(summary.failed_count, 1);
    assert_eq!(source.attempts(&tenant), 1);
}

/// One tenant's persistent failure never affects its siblings
#[tokio::test(start_paused = true)]
async fn test_failing_tenant_does_not_block_others() {
    let tenants = vec![
        make_tenant("acme"),
        make_tenant("beta"),
        make_tenant("casa"),
        make_tenant("dune"),
        make_tenant("echo"),
    ];

    let source = FakeSource::new();
    for tenant in &tenants {
        source.with_pending(tenant, &["m1_create_customers_table"]);
    }
    // beta's connection drops on every attempt
    source.fail_transiently(&tenants[1], u32::MAX);

    let orchestrator = orchestrator(FakeDirectory::new(tenants.clone()), source.clone(), 3);
    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert_eq!(summary.total_tenants, 5);
    assert_eq!(summary.success_count, 4);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].tenant_id, tenants[1].id);
    assert!(!summary.overall_success());
}

/// The worked example: A(ok), B(fails 3x), C(ok) with concurrency 2
#[tokio::test(start_paused = true)]
async fn test_mixed_outcome_summary() {
    let tenant_a = make_tenant("acme");
    let tenant_b = make_tenant("beta");
    let tenant_c = make_tenant("casa");

    let source = FakeSource::new();
    source.with_pending(&tenant_a, &["m1_create_customers_table"]);
    source.with_pending(&tenant_b, &["m1_create_customers_table"]);
    source.with_pending(&tenant_c, &["m1_create_customers_table"]);
    source.fail_transiently(&tenant_b, u32::MAX);

    let orchestrator = orchestrator(
        FakeDirectory::new(vec![tenant_a.clone(), tenant_b.clone(), tenant_c.clone()]),
        source.clone(),
        2,
    );
    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert_eq!(summary.total_tenants, 3);
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].tenant_id, tenant_b.id);
    assert_eq!(summary.errors[0].subdomain, "beta");
}

/// Cancelling mid-run: finished tenants stay migrated, unstarted tenants
/// are skipped, and the summary never claims full success
#[tokio::test]
async fn test_cancellation_skips_unstarted_tenants() {
    let tenants = vec![make_tenant("acme"), make_tenant("beta"), make_tenant("casa")];

    let cancel = CancellationToken::new();

    let source = FakeSource::new();
    for tenant in &tenants {
        source.with_pending(tenant, &["m1_create_customers_table"]);
    }
    // The first tenant's only migration applies cleanly and then the
    // operator pulls the plug
    source.cancel_on_apply(&tenants[0], &cancel);

    let orchestrator = orchestrator(FakeDirectory::new(tenants.clone()), source.clone(), 1);
    let summary = orchestrator.run(&cancel).await;

    assert!(summary.cancelled);
    assert!(!summary.overall_success());
    assert_eq!(summary.total_tenants, 3);

    // The in-flight tenant committed before the signal was observed
    assert_eq!(summary.success_count, 1);
    assert_eq!(
        source.applied(&tenants[0]),
        vec!["m1_create_customers_table".to_string()]
    );

    // Skipped tenants were never attempted and are not failures
    assert_eq!(summary.failed_count, 0);
    assert_eq!(source.attempts(&tenants[1]), 0);
    assert_eq!(source.attempts(&tenants[2]), 0);
}

/// Cancellation observed during a backoff sleep aborts retrying
/// immediately instead of waiting the sleep out
#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_backoff() {
    let tenant = make_tenant("acme");
    let cancel = CancellationToken::new();

    let source = FakeSource::new();
    source.with_pending(&tenant, &["m1_create_customers_table"]);
    source.fail_transiently(&tenant, u32::MAX);
    source.cancel_on_apply(&tenant, &cancel);

    let orchestrator = orchestrator(FakeDirectory::new(vec![tenant.clone()]), source.clone(), 1);
    let summary = orchestrator.run(&cancel).await;

    assert!(summary.cancelled);
    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.failed_count, 0);

    // No retry was attempted after the cancellation
    assert_eq!(source.attempts(&tenant), 1);
}

/// Invalid concurrency is rejected before the directory is ever queried
#[tokio::test]
async fn test_zero_concurrency_rejected_before_directory_query() {
    let directory = FakeDirectory::new(vec![make_tenant("acme")]);
    let queried = directory.queried.clone();

    let orchestrator = orchestrator(directory, FakeSource::new(), 0);
    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert!(!summary.overall_success());
    assert!(summary.error.is_some());
    assert_eq!(summary.total_tenants, 0);
    assert!(!queried.load(Ordering::SeqCst));
}

/// An unreachable tenant directory aborts the run with a top-level error
/// rather than per-tenant failures
#[tokio::test]
async fn test_directory_unavailable_aborts_run() {
    let orchestrator = orchestrator(FakeDirectory::unavailable(), FakeSource::new(), 4);
    let summary = orchestrator.run(&CancellationToken::new()).await;

    assert!(!summary.overall_success());
    assert_eq!(summary.total_tenants, 0);
    assert_eq!(summary.failed_count, 0);

    let error = summary.error.unwrap();
    assert!(error.contains("tenant directory unavailable"));
}

/// Single-tenant remediation reuses the same retrying path
#[tokio::test]
async fn test_run_one_migrates_tenant() {
    let tenant = make_tenant("acme");
    let source = FakeSource::new();
    source.with_pending(
        &tenant,
        &["m1_create_customers_table", "m2_create_products_table"],
    );

    let orchestrator = orchestrator(FakeDirectory::new(vec![tenant.clone()]), source.clone(), 4);
    let result = orchestrator
        .run_one(tenant.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(matches!(
        result.outcome,
        TenantOutcome::Applied {
            migrations_applied: 2
        }
    ));
}

#[tokio::test]
async fn test_run_one_unknown_tenant() {
    let orchestrator = orchestrator(
        FakeDirectory::new(vec![make_tenant("acme")]),
        FakeSource::new(),
        4,
    );

    let error = orchestrator
        .run_one(Uuid::new_v4(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, RunTenantError::UnknownTenant(_)));
}
