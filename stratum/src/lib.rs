//! Layered infrastructure provisioning with isolated state.
//!
//! A [`Topology`] groups resource declarations into [`Layer`]s. Each layer
//! owns one [`StateStore`], may read outputs of the layers listed as its
//! upstream, and is applied on its own: the [`BootstrapGate`] authorises the
//! run, a [`Planner`] diffs declarations against recorded state and the
//! [`Orchestrator`] executes the plan against a [`ProvisioningBackend`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use stratum::{
//!     ApplyOutcome, BootstrapGate, Confirmation, ExecutionContext, Layer, MemoryBackend,
//!     MemoryStateStore, Orchestrator, ResourceDeclaration, StateStores, Topology,
//! };
//!
//! # fn main() -> Result<(), stratum::StratumError> {
//! let layer = Layer::new("app")
//!     .with_declaration(ResourceDeclaration::new("bucket", "assets").with_attribute("location", "eu"));
//! let topology = Topology::new("1.0", vec![layer])?;
//! let stores = StateStores::new().with("app", Arc::new(MemoryStateStore::new("mem://app")));
//! let backend = MemoryBackend::new();
//!
//! let token = BootstrapGate::new(&topology, &stores)
//!     .authorize("app", ExecutionContext::non_interactive())?;
//! let mut run = Orchestrator::new(&topology, &stores, &backend, "app")?;
//! let plan = run.plan()?;
//! assert_eq!(plan.to_create.len(), 1);
//! let outcome = run.apply(&plan, Confirmation::Confirmed(token))?;
//! assert!(matches!(outcome, ApplyOutcome::Applied(_)));
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod declaration;
mod error;
pub mod gate;
mod graph;
mod layer;
pub mod orchestrator;
pub mod plan;
pub mod resolver;
pub mod state;

pub use backend::{
    BackendCall, LocalBackend, MemoryBackend, PROVIDER_METADATA_KEYS, ProviderError,
    ProviderHandle, ProvisioningBackend, ScriptedFailure,
};
pub use declaration::{Attributes, ResourceDeclaration, UPSTREAM_KEY, UpstreamRef};
pub use error::{ErrorClass, PartialApplyFailure, StratumError, StratumResult};
pub use gate::{AuthorizationToken, BootstrapGate, Confirmation, ExecutionContext};
pub use layer::{Layer, OutputSpec, Topology, TrustLevel};
pub use orchestrator::{ApplyOutcome, ApplyReport, Orchestrator, RunPhase};
pub use plan::{ApplyPlan, PlanSummary, PlannedUpdate, Planner};
pub use resolver::{ResolvedInput, ResolvedInputs, Resolver};
pub use state::{
    COMPLETION_MARKER_ID, CompletionMarker, EntryRole, FileStateStore, MemoryStateStore,
    StateEntry, StateReader, StateSnapshot, StateStore, StateStores,
};
