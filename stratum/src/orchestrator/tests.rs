//! Apply runs against in-memory stores and the scripted backend.

use std::sync::Arc;

use rstest::{fixture, rstest};

use super::*;
use crate::backend::{MemoryBackend, ScriptedFailure};
use crate::declaration::ResourceDeclaration;
use crate::gate::{AuthorizationToken, BootstrapGate, ExecutionContext};
use crate::state::{MemoryStateStore, StateReader, StateStore};

struct Env {
    topology: Topology,
    stores: StateStores,
    store: Arc<MemoryStateStore>,
    backend: MemoryBackend,
}

impl Env {
    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.topology, &self.stores, &self.backend, "app").expect("known layer")
    }

    fn token(&self) -> AuthorizationToken {
        BootstrapGate::new(&self.topology, &self.stores)
            .authorize("app", ExecutionContext::non_interactive())
            .expect("application layer without upstream")
    }

    fn apply(&self) -> StratumResult<ApplyOutcome> {
        let mut run = self.orchestrator();
        let plan = run.plan()?;
        run.apply(&plan, Confirmation::Confirmed(self.token()))
    }
}

fn env_with(layer: Layer) -> Env {
    let store = Arc::new(MemoryStateStore::new("mem://app"));
    Env {
        topology: Topology::new("3.2", vec![layer, Layer::new("other")]).expect("valid topology"),
        stores: StateStores::new()
            .with("app", store.clone())
            .with("other", Arc::new(MemoryStateStore::new("mem://other"))),
        store,
        backend: MemoryBackend::new(),
    }
}

fn bucket(id: &str) -> ResourceDeclaration {
    ResourceDeclaration::new("bucket", id).with_attribute("location", "eu")
}

#[fixture]
fn env() -> Env {
    env_with(
        Layer::new("app")
            .with_declaration(bucket("a"))
            .with_declaration(bucket("b").depends_on("a")),
    )
}

fn report(outcome: ApplyOutcome) -> ApplyReport {
    match outcome {
        ApplyOutcome::Applied(report) => report,
        ApplyOutcome::DryRun(_) => panic!("expected an applied outcome"),
    }
}

#[rstest]
fn dry_run_returns_the_plan_untouched(env: Env) {
    let mut run = env.orchestrator();
    let plan = run.plan().expect("plan");
    let outcome = run.apply(&plan, Confirmation::DryRun).expect("dry run");
    assert_eq!(outcome, ApplyOutcome::DryRun(plan));
    assert_eq!(run.phase(), RunPhase::Planned);
    assert_eq!(env.backend.mutation_count(), 0);
    assert_eq!(env.store.snapshot().version, 0);
}

#[rstest]
fn successful_apply_commits_entries_and_marker(env: Env) {
    let report = report(env.apply().expect("apply"));
    assert_eq!(report.created, ["a", "b"]);
    assert_eq!(report.version, 1);

    let snapshot = env.store.load().expect("load");
    assert!(snapshot.get("a").is_some());
    assert!(snapshot.get("b").is_some());
    let marker = snapshot.completion_marker().expect("marker written");
    assert_eq!(marker.version, "3.2");
    assert_eq!(snapshot.entries, report.entries);
}

#[rstest]
fn reapplying_after_success_plans_nothing(env: Env) {
    env.apply().expect("first apply");
    let mut run = env.orchestrator();
    assert!(run.plan().expect("plan").is_empty());
}

#[rstest]
fn provider_failure_persists_only_completed_operations(env: Env) {
    env.backend
        .fail_on("b", ScriptedFailure::Reject("quota exceeded".to_owned()));
    let mut run = env.orchestrator();
    let plan = run.plan().expect("plan");
    let err = run
        .apply(&plan, Confirmation::Confirmed(env.token()))
        .expect_err("b fails");

    let failure = err.as_partial_apply().expect("partial apply");
    assert_eq!(failure.completed, ["a"]);
    assert_eq!(failure.failed, "b");
    assert!(matches!(failure.cause, ProviderError::Rejected { .. }));
    assert_eq!(failure.persisted_version, Some(1));
    assert_eq!(run.phase(), RunPhase::PartiallyFailed);

    let snapshot = env.store.snapshot();
    assert!(snapshot.get("a").is_some());
    assert!(snapshot.get("b").is_none());
    assert!(snapshot.completion_marker().is_none());
}

#[rstest]
fn next_plan_reconciles_a_partial_apply(env: Env) {
    env.backend
        .fail_on("b", ScriptedFailure::Timeout(std::time::Duration::from_secs(30)));
    env.apply().expect_err("b times out");
    env.backend.clear_failures();

    let mut run = env.orchestrator();
    let plan = run.plan().expect("plan");
    let ids: Vec<_> = plan.to_create.iter().map(|decl| decl.id.as_str()).collect();
    assert_eq!(ids, ["b"]);
    assert!(plan.to_update.is_empty());
}

#[rstest]
fn first_operation_failure_writes_nothing(env: Env) {
    env.backend
        .fail_on("a", ScriptedFailure::Reject("denied".to_owned()));
    let err = env.apply().expect_err("a fails");
    let failure = err.as_partial_apply().expect("partial apply");
    assert!(failure.completed.is_empty());
    assert_eq!(failure.persisted_version, None);
    assert_eq!(env.store.snapshot().version, 0);
}

#[rstest]
fn stale_plan_loses_the_race(env: Env) {
    let mut run = env.orchestrator();
    let plan = run.plan().expect("plan");
    env.store
        .compare_and_swap(0, BTreeMap::new())
        .expect("concurrent writer");
    let err = run
        .apply(&plan, Confirmation::Confirmed(env.token()))
        .expect_err("stale");
    assert!(matches!(
        err,
        StratumError::ApplyRaceLost {
            expected: 0,
            actual: 1,
            ..
        }
    ));
    assert_eq!(run.phase(), RunPhase::PlanFailed);
    assert_eq!(env.backend.mutation_count(), 0);
}

#[rstest]
fn tokens_and_plans_are_bound_to_their_layer(env: Env) {
    let other_token = BootstrapGate::new(&env.topology, &env.stores)
        .authorize("other", ExecutionContext::non_interactive())
        .expect("other layer");
    let mut run = env.orchestrator();
    let plan = run.plan().expect("plan");
    assert!(matches!(
        run.apply(&plan, Confirmation::Confirmed(other_token)),
        Err(StratumError::AuthorizationMismatch { .. })
    ));

    let foreign = ApplyPlan {
        layer: "other".to_owned(),
        ..plan
    };
    assert!(matches!(
        run.apply(&foreign, Confirmation::DryRun),
        Err(StratumError::PlanMismatch { .. })
    ));
}

#[rstest]
fn a_run_executes_at_most_once(env: Env) {
    let mut run = env.orchestrator();
    let plan = run.plan().expect("plan");
    run.apply(&plan, Confirmation::Confirmed(env.token()))
        .expect("first apply");
    assert_eq!(run.phase(), RunPhase::Succeeded);
    assert!(matches!(
        run.apply(&plan, Confirmation::Confirmed(env.token())),
        Err(StratumError::InvalidTransition { .. })
    ));
    assert!(matches!(
        run.plan(),
        Err(StratumError::InvalidTransition { .. })
    ));
}

#[rstest]
fn protected_removal_fails_planning() {
    let env = env_with(Layer::new("app").with_declaration(bucket("secret").protected()));
    env.apply().expect("create protected resource");

    let stripped = env_with(Layer::new("app"));
    let stores = StateStores::new()
        .with("app", env.store.clone())
        .with("other", Arc::new(MemoryStateStore::new("mem://other")));
    let mut run = Orchestrator::new(&stripped.topology, &stores, &env.backend, "app")
        .expect("known layer");
    assert!(matches!(
        run.plan(),
        Err(StratumError::ProtectedResourceWouldBeDeleted { .. })
    ));
    assert_eq!(run.phase(), RunPhase::PlanFailed);
    assert_eq!(env.backend.resource_count(), 1);
}

#[rstest]
fn removed_declarations_are_deleted_and_missing_ones_tolerated(env: Env) {
    env.apply().expect("first apply");
    let handle = env
        .store
        .snapshot()
        .get("a")
        .map(|entry| entry.provider_id.clone())
        .expect("entry for a");

    let shrunk = env_with(Layer::new("app"));
    let stores = StateStores::new()
        .with("app", env.store.clone())
        .with("other", Arc::new(MemoryStateStore::new("mem://other")));
    let mut run = Orchestrator::new(&shrunk.topology, &stores, &env.backend, "app")
        .expect("known layer")
        .with_refresh(false);
    let plan = run.plan().expect("plan");
    let order: Vec<_> = plan
        .to_delete
        .iter()
        .map(|entry| entry.declaration_id.as_str())
        .collect();
    assert_eq!(order, ["b", "a"]);

    env.backend.remove_out_of_band(&handle);
    let token = BootstrapGate::new(&shrunk.topology, &stores)
        .authorize("app", ExecutionContext::non_interactive())
        .expect("authorised");
    let report = report(run.apply(&plan, Confirmation::Confirmed(token)).expect("apply"));
    assert_eq!(report.deleted, ["b", "a"]);
    assert_eq!(env.backend.resource_count(), 0);
    assert!(env.store.snapshot().resources().next().is_none());
}
