//! Authorisation of apply runs.
//!
//! Privileged layers hold identity and permission resources, so they are
//! only applied by an operator at an interactive terminal. Every other layer
//! is applied by automation, but only once each of its upstream layers and
//! every privileged layer has recorded a completion marker. An [`AuthorizationToken`] can only be
//! obtained from [`BootstrapGate::authorize`], and
//! [`crate::Orchestrator::apply`] executes nothing without one.

use std::io::IsTerminal;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{StratumError, StratumResult};
use crate::layer::{Layer, Topology, TrustLevel};
use crate::state::StateStores;

/// Whether a human is present to confirm a privileged apply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExecutionContext {
    interactive: bool,
}

impl ExecutionContext {
    /// A context with an operator at the terminal.
    #[must_use]
    pub const fn interactive() -> Self {
        Self { interactive: true }
    }

    /// An automated context such as a CI job.
    #[must_use]
    pub const fn non_interactive() -> Self {
        Self { interactive: false }
    }

    /// Combine terminal and CI signals; any CI signal wins.
    #[must_use]
    pub const fn from_signals(stdin_is_terminal: bool, ci_detected: bool) -> Self {
        Self {
            interactive: stdin_is_terminal && !ci_detected,
        }
    }

    /// Inspect the current process.
    ///
    /// The context is non-interactive when stdin is not a terminal or any of
    /// `ci_vars` is set to a non-empty value.
    #[must_use]
    pub fn detect<S: AsRef<str>>(ci_vars: &[S]) -> Self {
        let ci_detected = ci_vars.iter().any(|name| {
            std::env::var_os(name.as_ref()).is_some_and(|value| !value.is_empty())
        });
        Self::from_signals(std::io::stdin().is_terminal(), ci_detected)
    }

    /// Returns `true` when an operator is present.
    #[must_use]
    pub const fn is_interactive(self) -> bool {
        self.interactive
    }
}

/// Proof that a layer passed the gate.
///
/// Tokens cannot be constructed or deserialised outside this module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationToken {
    layer: String,
    trust: TrustLevel,
    granted_at: DateTime<Utc>,
}

impl AuthorizationToken {
    /// Layer the token authorises.
    #[must_use]
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Trust level the layer was authorised under.
    #[must_use]
    pub const fn trust(&self) -> TrustLevel {
        self.trust
    }

    /// When the gate granted the token.
    #[must_use]
    pub const fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }
}

/// How [`crate::Orchestrator::apply`] should treat a plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Confirmation {
    /// Return the plan without executing it.
    DryRun,
    /// Execute the plan under the given authorisation.
    Confirmed(AuthorizationToken),
}

/// Decides whether a layer may be applied.
#[derive(Clone, Copy, Debug)]
pub struct BootstrapGate<'a> {
    topology: &'a Topology,
    stores: &'a StateStores,
}

impl<'a> BootstrapGate<'a> {
    /// Create a gate over `topology` reading markers from `stores`.
    #[must_use]
    pub const fn new(topology: &'a Topology, stores: &'a StateStores) -> Self {
        Self { topology, stores }
    }

    /// Authorise an apply of `layer` in `context`.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::InteractiveConfirmationRequired`] for a
    /// privileged layer outside an interactive context,
    /// [`StratumError::UpstreamIncomplete`] when an upstream layer, or any
    /// privileged layer for an application layer, has no completion marker,
    /// [`StratumError::UnknownLayer`] for unknown layers, and store errors
    /// from reading markers.
    pub fn authorize(
        &self,
        layer: &str,
        context: ExecutionContext,
    ) -> StratumResult<AuthorizationToken> {
        let target = self.topology.layer(layer)?;
        if target.is_privileged() && !context.is_interactive() {
            warn!(layer, "privileged apply refused outside an interactive context");
            return Err(StratumError::InteractiveConfirmationRequired {
                layer: target.name.clone(),
            });
        }
        for upstream in self.prerequisites(target) {
            let snapshot = self.stores.get(upstream)?.load()?;
            if snapshot.completion_marker().is_none() {
                warn!(layer, upstream = %upstream, "upstream layer has not completed");
                return Err(StratumError::UpstreamIncomplete {
                    layer: target.name.clone(),
                    upstream: upstream.to_owned(),
                });
            }
        }
        info!(layer, trust = target.trust.as_str(), "apply authorised");
        Ok(AuthorizationToken {
            layer: target.name.clone(),
            trust: target.trust,
            granted_at: Utc::now(),
        })
    }

    /// Layers whose completion markers must exist before `target` runs.
    ///
    /// An application layer waits for its declared upstream layers and for
    /// every privileged layer, whether or not it reads from them.
    fn prerequisites<'t>(&self, target: &'t Layer) -> Vec<&'t str>
    where
        'a: 't,
    {
        let mut required: Vec<&str> = target.upstream.iter().map(String::as_str).collect();
        if !target.is_privileged() {
            for layer in self.topology.apply_order() {
                if layer.is_privileged() && !required.contains(&layer.name.as_str()) {
                    required.push(&layer.name);
                }
            }
        }
        required
    }
}
