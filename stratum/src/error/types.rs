//! Primary error enum for provisioning flows.

use thiserror::Error;

use crate::backend::ProviderError;

/// Errors that can occur while planning, applying or authorising a layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StratumError {
    /// The backing location of a state store could not be reached.
    #[error("state store '{location}' is unavailable: {source}")]
    StoreUnavailable {
        /// Opaque locator of the store.
        location: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The persisted state could not be decoded.
    #[error("state store '{location}' holds unreadable state: {message}")]
    CorruptState {
        /// Opaque locator of the store.
        location: String,
        /// Description of the decoding failure.
        message: String,
    },

    /// A compare-and-swap observed a different version than expected.
    #[error(
        "state store '{location}' was modified concurrently (expected version {expected}, found {actual})"
    )]
    ConcurrentModification {
        /// Opaque locator of the store.
        location: String,
        /// Version the writer based its changes on.
        expected: u64,
        /// Version currently held by the store.
        actual: u64,
    },

    /// Another apply committed first; the caller must re-plan.
    #[error("apply for layer '{layer}' lost the race against a concurrent writer; re-plan and retry")]
    ApplyRaceLost {
        /// Layer whose commit was rejected.
        layer: String,
        /// Version the plan was computed against.
        expected: u64,
        /// Version found at commit time.
        actual: u64,
    },

    /// The upstream layer has not completed a successful apply.
    #[error("upstream layer '{layer}' is not bootstrapped: {reason}")]
    UpstreamNotBootstrapped {
        /// Upstream layer that was read.
        layer: String,
        /// Why the output could not be produced.
        reason: String,
    },

    /// The upstream layer exposes no output with this name.
    #[error("upstream layer '{layer}' exposes no output named '{output}'")]
    UpstreamOutputMissing {
        /// Upstream layer that was read.
        layer: String,
        /// Output that was requested.
        output: String,
    },

    /// A layer name did not match any layer in the topology.
    #[error("unknown layer '{0}'")]
    UnknownLayer(String),

    /// Two layers share a name.
    #[error("layer '{0}' is defined more than once")]
    DuplicateLayer(String),

    /// Two declarations in one layer share an id.
    #[error("declaration '{id}' is defined more than once in layer '{layer}'")]
    DuplicateDeclaration {
        /// Layer holding the declarations.
        layer: String,
        /// Duplicated declaration id.
        id: String,
    },

    /// A declaration used an identifier reserved for bookkeeping entries.
    #[error("declaration id '{id}' in layer '{layer}' is reserved")]
    ReservedIdentifier {
        /// Layer holding the declaration.
        layer: String,
        /// Reserved id.
        id: String,
    },

    /// A declaration depends on an id that is not declared in its layer.
    #[error("declaration '{declaration}' in layer '{layer}' depends on unknown '{dependency}'")]
    UnknownDependency {
        /// Layer holding the declaration.
        layer: String,
        /// Declaration with the dangling edge.
        declaration: String,
        /// Missing dependency id.
        dependency: String,
    },

    /// The `depends_on` graph of a layer contains a cycle.
    #[error("cyclic dependency in layer '{layer}': {cycle}")]
    CyclicDependency {
        /// Layer holding the declarations.
        layer: String,
        /// Declarations participating in the cycle.
        cycle: String,
    },

    /// The upstream relation between layers contains a cycle.
    #[error("cyclic layer dependency: {cycle}")]
    CyclicLayers {
        /// Layers participating in the cycle.
        cycle: String,
    },

    /// The topology is structurally invalid.
    #[error("invalid topology: {message}")]
    InvalidTopology {
        /// Human-readable explanation.
        message: String,
    },

    /// Removing a declaration would destroy a protected resource.
    #[error(
        "declaration '{declaration}' in layer '{layer}' has prevent_destroy set and cannot be deleted"
    )]
    ProtectedResourceWouldBeDeleted {
        /// Layer holding the state entry.
        layer: String,
        /// Protected declaration id.
        declaration: String,
    },

    /// Reading provider state while planning failed.
    #[error("refreshing '{declaration}' in layer '{layer}' failed: {source}")]
    RefreshFailed {
        /// Layer being planned.
        layer: String,
        /// Declaration whose handle could not be described.
        declaration: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },

    /// Execution stopped after a provider operation failed.
    #[error("{0}")]
    PartialApply(Box<PartialApplyFailure>),

    /// The plan was computed for a different layer.
    #[error("plan for layer '{plan}' cannot be applied to layer '{layer}'")]
    PlanMismatch {
        /// Layer named by the plan.
        plan: String,
        /// Layer the orchestrator manages.
        layer: String,
    },

    /// Privileged layers may only be applied after interactive confirmation.
    #[error("layer '{layer}' is privileged and requires interactive confirmation")]
    InteractiveConfirmationRequired {
        /// Privileged layer.
        layer: String,
    },

    /// An upstream layer has not recorded its completion marker.
    #[error("layer '{layer}' cannot run before upstream layer '{upstream}' completes")]
    UpstreamIncomplete {
        /// Layer requesting authorisation.
        layer: String,
        /// Upstream layer without a completion marker.
        upstream: String,
    },

    /// An authorisation token was presented for a different layer.
    #[error("authorisation granted for layer '{granted}' cannot be used for layer '{layer}'")]
    AuthorizationMismatch {
        /// Layer named in the token.
        granted: String,
        /// Layer being applied.
        layer: String,
    },

    /// An apply run attempted an illegal phase transition.
    #[error("illegal apply phase transition from {from} to {to}")]
    InvalidTransition {
        /// Phase the run was in.
        from: &'static str,
        /// Phase that was requested.
        to: &'static str,
    },
}

/// Details of an apply that stopped part-way through its plan.
#[derive(Debug, Error)]
#[error(
    "apply for layer '{layer}' failed at '{failed}' after completing [{}]: {cause}",
    .completed.join(", ")
)]
pub struct PartialApplyFailure {
    /// Layer being applied.
    pub layer: String,
    /// Declarations whose operations the provider confirmed, in execution order.
    pub completed: Vec<String>,
    /// Declaration whose operation failed.
    pub failed: String,
    /// Provider failure.
    #[source]
    pub cause: ProviderError,
    /// Store version holding the completed operations, when they were persisted.
    pub persisted_version: Option<u64>,
}
