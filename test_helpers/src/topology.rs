//! A two-layer sample topology wired to in-memory stores and backend.
//!
//! `bootstrap` is privileged and exposes service-account emails; `deploy`
//! reads them for its workload. The same topology is available as TOML in
//! [`SAMPLE_CONFIG`] for command-line tests.

use std::sync::Arc;

use anyhow::Result;
use stratum::{
    ApplyOutcome, ApplyPlan, AuthorizationToken, BootstrapGate, Confirmation, ExecutionContext,
    Layer, MemoryBackend, MemoryStateStore, Orchestrator, OutputSpec, ResourceDeclaration,
    StateStores, StratumResult, Topology, UpstreamRef,
};

/// Release label of the sample topology.
pub const SAMPLE_RELEASE: &str = "1.0";

/// The sample topology in `stratum.toml` form.
pub const SAMPLE_CONFIG: &str = r#"
release = "1.0"
state_root = "state"
backend_root = "resources"

[[layers]]
name = "bootstrap"
trust = "privileged"
outputs.deployer_email = { resource = "deployer", attribute = "email" }
outputs.runtime_email = { resource = "runtime", attribute = "email" }

[[layers.resources]]
kind = "project_service"
id = "iam_api"

[[layers.resources]]
kind = "service_account"
id = "deployer"
depends_on = ["iam_api"]
attributes = { email = "deployer@sample.iam.test" }

[[layers.resources]]
kind = "service_account"
id = "runtime"
depends_on = ["iam_api"]
attributes = { email = "runtime@sample.iam.test" }

[[layers.resources]]
kind = "secret"
id = "db_password"
prevent_destroy = true

[[layers]]
name = "deploy"
upstream = ["bootstrap"]

[[layers.resources]]
kind = "artifact_repository"
id = "images"
attributes = { format = "docker" }

[[layers.resources]]
kind = "cloud_run_service"
id = "api"
depends_on = ["images"]
attributes = { image = "images/api:1", service_account = { "$upstream" = { layer = "bootstrap", output = "runtime_email" } } }
"#;

/// The privileged layer of the sample topology.
#[must_use]
pub fn bootstrap_layer() -> Layer {
    Layer::new("bootstrap")
        .privileged()
        .with_declaration(ResourceDeclaration::new("project_service", "iam_api"))
        .with_declaration(
            ResourceDeclaration::new("service_account", "deployer")
                .depends_on("iam_api")
                .with_attribute("email", "deployer@sample.iam.test"),
        )
        .with_declaration(
            ResourceDeclaration::new("service_account", "runtime")
                .depends_on("iam_api")
                .with_attribute("email", "runtime@sample.iam.test"),
        )
        .with_declaration(ResourceDeclaration::new("secret", "db_password").protected())
        .with_output("deployer_email", OutputSpec::new("deployer", "email"))
        .with_output("runtime_email", OutputSpec::new("runtime", "email"))
}

/// The application layer of the sample topology.
#[must_use]
pub fn deploy_layer() -> Layer {
    Layer::new("deploy")
        .reading_from("bootstrap")
        .with_declaration(
            ResourceDeclaration::new("artifact_repository", "images")
                .with_attribute("format", "docker"),
        )
        .with_declaration(
            ResourceDeclaration::new("cloud_run_service", "api")
                .depends_on("images")
                .with_attribute("image", "images/api:1")
                .with_attribute(
                    "service_account",
                    UpstreamRef::new("bootstrap", "runtime_email").to_value(),
                ),
        )
}

/// Sample topology with in-memory state and backend.
#[derive(Debug)]
pub struct Sandbox {
    /// The validated topology.
    pub topology: Topology,
    /// Store registry holding both layers' stores.
    pub stores: StateStores,
    /// Store of the `bootstrap` layer.
    pub bootstrap: Arc<MemoryStateStore>,
    /// Store of the `deploy` layer.
    pub deploy: Arc<MemoryStateStore>,
    /// Shared backend.
    pub backend: MemoryBackend,
}

impl Sandbox {
    /// Build the sample topology.
    ///
    /// # Errors
    ///
    /// Returns an error if the topology fails validation.
    pub fn new() -> Result<Self> {
        Self::with_layers(bootstrap_layer(), deploy_layer())
    }

    /// Build a sandbox from replacement `bootstrap` and `deploy` layers.
    ///
    /// # Errors
    ///
    /// Returns an error if the topology fails validation.
    pub fn with_layers(bootstrap: Layer, deploy: Layer) -> Result<Self> {
        let topology = Topology::new(SAMPLE_RELEASE, vec![bootstrap, deploy])?;
        let bootstrap_store = Arc::new(MemoryStateStore::new("mem://bootstrap"));
        let deploy_store = Arc::new(MemoryStateStore::new("mem://deploy"));
        let stores = StateStores::new()
            .with("bootstrap", bootstrap_store.clone())
            .with("deploy", deploy_store.clone());
        Ok(Self {
            topology,
            stores,
            bootstrap: bootstrap_store,
            deploy: deploy_store,
            backend: MemoryBackend::new(),
        })
    }

    /// Start a run for `layer`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown layers.
    pub fn orchestrator(&self, layer: &str) -> StratumResult<Orchestrator<'_>> {
        Orchestrator::new(&self.topology, &self.stores, &self.backend, layer)
    }

    /// Ask the gate for `layer` in `context`.
    ///
    /// # Errors
    ///
    /// Returns the gate's rejection.
    pub fn authorize(
        &self,
        layer: &str,
        context: ExecutionContext,
    ) -> StratumResult<AuthorizationToken> {
        BootstrapGate::new(&self.topology, &self.stores).authorize(layer, context)
    }

    /// Plan `layer` without applying it.
    ///
    /// # Errors
    ///
    /// Returns any planning error.
    pub fn plan(&self, layer: &str) -> StratumResult<ApplyPlan> {
        self.orchestrator(layer)?.plan()
    }

    /// Authorise, plan and apply `layer` in `context`.
    ///
    /// # Errors
    ///
    /// Returns the first gate, planning or apply error.
    pub fn apply(&self, layer: &str, context: ExecutionContext) -> StratumResult<ApplyOutcome> {
        let token = self.authorize(layer, context)?;
        let mut run = self.orchestrator(layer)?;
        let plan = run.plan()?;
        run.apply(&plan, Confirmation::Confirmed(token))
    }

    /// Apply `bootstrap` as an operator, then `deploy` as automation.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub fn apply_all(&self) -> StratumResult<()> {
        self.apply("bootstrap", ExecutionContext::interactive())?;
        self.apply("deploy", ExecutionContext::non_interactive())?;
        Ok(())
    }
}
