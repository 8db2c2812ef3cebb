//! Applies against on-disk state stores and the local backend.

use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;

use anyhow::{Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use stratum::{
    BootstrapGate, Confirmation, ExecutionContext, FileStateStore, Layer, LocalBackend,
    Orchestrator, ProviderError, ResourceDeclaration, StateReader, StateStore, StateStores,
    StratumError, Topology,
};
use tempfile::TempDir;
use test_helpers::topology::{bootstrap_layer, deploy_layer};

#[fixture]
fn workdir() -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    (dir, root)
}

fn stores_under(root: &Utf8Path) -> Result<StateStores> {
    Ok(StateStores::new()
        .with(
            "bootstrap",
            Arc::new(FileStateStore::open(&root.join("state/bootstrap.json"))?),
        )
        .with(
            "deploy",
            Arc::new(FileStateStore::open(&root.join("state/deploy.json"))?),
        ))
}

fn apply(
    topology: &Topology,
    stores: &StateStores,
    backend: &LocalBackend,
    layer: &str,
    context: ExecutionContext,
) -> Result<()> {
    let token = BootstrapGate::new(topology, stores).authorize(layer, context)?;
    let mut run = Orchestrator::new(topology, stores, backend, layer)?;
    let plan = run.plan()?;
    run.apply(&plan, Confirmation::Confirmed(token))?;
    Ok(())
}

#[rstest]
fn state_persists_across_processes(workdir: (TempDir, Utf8PathBuf)) -> Result<()> {
    let (_guard, root) = workdir;
    let topology = Topology::new("2.0", vec![bootstrap_layer(), deploy_layer()])?;
    let backend = LocalBackend::open(&root.join("resources"))?;

    let stores = stores_under(&root)?;
    apply(&topology, &stores, &backend, "bootstrap", ExecutionContext::interactive())?;
    apply(&topology, &stores, &backend, "deploy", ExecutionContext::non_interactive())?;

    let reopened = stores_under(&root)?;
    let snapshot = reopened.get("deploy")?.load()?;
    let marker = snapshot
        .completion_marker()
        .ok_or_else(|| anyhow!("deploy marker missing"))?;
    assert_eq!(marker.version, "2.0");
    assert!(root.join("resources/cloud_run_service/api.json").is_file());

    let mut run = Orchestrator::new(&topology, &reopened, &backend, "deploy")?;
    assert!(run.plan()?.is_empty());
    Ok(())
}

fn single_layer(root: &Utf8Path, declaration: ResourceDeclaration) -> Result<(Topology, StateStores)> {
    let topology = Topology::new("2.0", vec![Layer::new("app").with_declaration(declaration)])?;
    let stores = StateStores::new().with(
        "app",
        Arc::new(FileStateStore::open(&root.join("state/app.json"))?),
    );
    Ok((topology, stores))
}

#[rstest]
fn local_resources_settle_after_one_apply(workdir: (TempDir, Utf8PathBuf)) -> Result<()> {
    let (_guard, root) = workdir;
    let bucket = ResourceDeclaration::new("bucket", "logs")
        .with_attribute("location", "eu")
        .with_attribute("retention_days", 7);
    let (topology, stores) = single_layer(&root, bucket)?;
    let backend = LocalBackend::open(&root.join("resources"))?;

    apply(&topology, &stores, &backend, "app", ExecutionContext::non_interactive())?;
    for _ in 0..2 {
        let mut run = Orchestrator::new(&topology, &stores, &backend, "app")?;
        let plan = run.plan()?;
        assert!(plan.is_empty(), "unexpected changes: {}", plan.summary());
    }
    Ok(())
}

#[rstest]
fn declared_provider_metadata_is_refused(workdir: (TempDir, Utf8PathBuf)) -> Result<()> {
    let (_guard, root) = workdir;
    let bucket = ResourceDeclaration::new("bucket", "logs").with_attribute("generation", 7);
    let (topology, stores) = single_layer(&root, bucket)?;
    let backend = LocalBackend::open(&root.join("resources"))?;

    let err = apply(&topology, &stores, &backend, "app", ExecutionContext::non_interactive())
        .expect_err("generation is provider metadata")
        .downcast::<StratumError>()?;
    let failure = err
        .as_partial_apply()
        .ok_or_else(|| anyhow!("expected a partial apply, got {err}"))?;
    assert!(matches!(failure.cause, ProviderError::Rejected { .. }));
    assert_eq!(failure.persisted_version, None);
    assert_eq!(stores.get("app")?.load()?.version, 0);
    Ok(())
}

#[rstest]
fn concurrent_writers_on_disk_have_one_winner(workdir: (TempDir, Utf8PathBuf)) -> Result<()> {
    let (_guard, root) = workdir;
    let path = root.join("state/app.json");
    let barrier = Barrier::new(4);
    let results: Vec<Result<u64, StratumError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let store = FileStateStore::open(&path)?;
                    barrier.wait();
                    store.compare_and_swap(0, BTreeMap::new())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("writer thread panicked"))
            .collect()
    });

    let winners = results.iter().filter(|result| result.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|result| matches!(result, Err(StratumError::ConcurrentModification { .. })))
        .count();
    assert_eq!((winners, conflicts), (1, 3), "results: {results:?}");
    assert_eq!(FileStateStore::open(&path)?.load()?.version, 1);
    Ok(())
}
