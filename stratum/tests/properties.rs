//! Behavioural laws of planning, resolution and concurrent applies.

use std::sync::{Arc, Barrier};
use std::thread;

use anyhow::{Result, anyhow};
use rstest::rstest;
use stratum::{
    ApplyOutcome, BootstrapGate, Confirmation, ExecutionContext, Layer, MemoryBackend,
    MemoryStateStore, Orchestrator, Planner, ResourceDeclaration, Resolver, StateStores,
    StratumError, Topology,
};
use test_helpers::Sandbox;

struct Single {
    topology: Topology,
    stores: StateStores,
    backend: MemoryBackend,
}

fn single(layer: Layer) -> Result<Single> {
    Ok(Single {
        topology: Topology::new("1.0", vec![layer])?,
        stores: StateStores::new().with("app", Arc::new(MemoryStateStore::new("mem://app"))),
        backend: MemoryBackend::new(),
    })
}

/// A chain `n0 <- n1 <- ... <- n{len-1}`, optionally closed into a cycle.
fn chain(len: usize, closed: bool) -> Layer {
    (0..len).fold(Layer::new("app"), |layer, index| {
        let mut decl = ResourceDeclaration::new("node", format!("n{index}"));
        if index > 0 {
            decl = decl.depends_on(format!("n{}", index - 1));
        } else if closed {
            decl = decl.depends_on(format!("n{}", len - 1));
        }
        layer.with_declaration(decl)
    })
}

#[rstest]
fn planning_is_deterministic() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.apply("bootstrap", ExecutionContext::interactive())?;
    let first = sandbox.plan("deploy")?;
    let second = sandbox.plan("deploy")?;
    assert_eq!(first, second);
    assert_eq!(serde_json::to_string(&first)?, serde_json::to_string(&second)?);
    Ok(())
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(6)]
fn cycles_fail_exactly_when_present(#[case] len: usize) -> Result<()> {
    let acyclic = single(chain(len, false))?;
    let plan = Planner::new(&acyclic.topology, &acyclic.stores, &acyclic.backend).plan("app")?;
    assert_eq!(plan.to_create.len(), len);

    let cyclic = single(chain(len, true))?;
    let result = Planner::new(&cyclic.topology, &cyclic.stores, &cyclic.backend).plan("app");
    assert!(matches!(result, Err(StratumError::CyclicDependency { .. })));
    Ok(())
}

#[rstest]
fn apply_then_plan_is_empty() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.apply_all()?;
    assert!(sandbox.plan("bootstrap")?.is_empty());
    assert!(sandbox.plan("deploy")?.is_empty());
    Ok(())
}

#[rstest]
fn resolution_requires_a_completion_marker() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let mut run = sandbox.orchestrator("bootstrap")?;
    let plan = run.plan()?;
    let token = sandbox.authorize("bootstrap", ExecutionContext::interactive())?;
    sandbox
        .backend
        .fail_on("runtime", stratum::ScriptedFailure::Reject("denied".to_owned()));
    run.apply(&plan, Confirmation::Confirmed(token))
        .expect_err("runtime fails");
    assert!(sandbox.bootstrap.snapshot().get("deployer").is_some());

    let resolver = Resolver::new(&sandbox.topology, &sandbox.stores);
    for output in ["deployer_email", "runtime_email", "not_an_output"] {
        assert!(
            matches!(
                resolver.resolve("deploy", "bootstrap", output),
                Err(StratumError::UpstreamNotBootstrapped { .. })
            ),
            "{output} resolved without a marker"
        );
    }
    Ok(())
}

#[rstest]
fn protected_resources_are_never_planned_for_deletion() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.apply("bootstrap", ExecutionContext::interactive())?;

    let mut without_secret = test_helpers::topology::bootstrap_layer();
    without_secret
        .declarations
        .retain(|decl| decl.id != "db_password");
    let edited = Sandbox::with_layers(without_secret, test_helpers::topology::deploy_layer())?;
    let stores = StateStores::new()
        .with("bootstrap", sandbox.bootstrap.clone())
        .with("deploy", sandbox.deploy.clone());
    let result = Planner::new(&edited.topology, &stores, &sandbox.backend).plan("bootstrap");
    match result {
        Err(StratumError::ProtectedResourceWouldBeDeleted { declaration, .. }) => {
            assert_eq!(declaration, "db_password");
        }
        other => return Err(anyhow!("expected protection error, got {other:?}")),
    }
    Ok(())
}

#[rstest]
fn concurrent_applies_have_exactly_one_winner() -> Result<()> {
    let world = single(
        Layer::new("app")
            .with_declaration(ResourceDeclaration::new("bucket", "a"))
            .with_declaration(ResourceDeclaration::new("bucket", "b")),
    )?;
    let barrier = Barrier::new(2);
    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    let mut run =
                        Orchestrator::new(&world.topology, &world.stores, &world.backend, "app")?;
                    let plan = run.plan()?;
                    let token = BootstrapGate::new(&world.topology, &world.stores)
                        .authorize("app", ExecutionContext::non_interactive())?;
                    barrier.wait();
                    run.apply(&plan, Confirmation::Confirmed(token))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("apply thread panicked"))
            .collect()
    });

    let winners = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Ok(ApplyOutcome::Applied(_))))
        .count();
    let losers = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Err(StratumError::ApplyRaceLost { .. })))
        .count();
    assert_eq!((winners, losers), (1, 1), "outcomes: {outcomes:?}");
    assert_eq!(world.stores.get("app")?.load()?.version, 1);
    Ok(())
}
