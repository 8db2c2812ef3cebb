//! Plan and apply runs for a single layer.
//!
//! An [`Orchestrator`] drives one invocation through the [`RunPhase`]
//! lifecycle: it computes a plan, then either hands the plan back (dry run)
//! or executes it one operation at a time and commits the resulting state
//! with a single compare-and-swap. Nothing is rolled back on failure; the
//! entries the provider confirmed are persisted and the next plan
//! reconciles the rest.

mod executor;
mod phase;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{ProviderError, ProvisioningBackend};
use crate::error::{PartialApplyFailure, StratumError, StratumResult};
use crate::gate::Confirmation;
use crate::layer::{Layer, Topology};
use crate::plan::{ApplyPlan, Planner};
use crate::state::{COMPLETION_MARKER_ID, CompletionMarker, StateEntry, StateStores};

use executor::{Execution, Step};
pub use phase::RunPhase;

/// Result of a successful apply.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApplyReport {
    /// Layer that was applied.
    pub layer: String,
    /// Store version holding the new state.
    pub version: u64,
    /// Declarations created, in execution order.
    pub created: Vec<String>,
    /// Declarations updated, in execution order.
    pub updated: Vec<String>,
    /// Declarations deleted, in execution order.
    pub deleted: Vec<String>,
    /// Entries dropped without a provider call.
    pub forgotten: Vec<String>,
    /// Time recorded in the completion marker.
    pub completed_at: DateTime<Utc>,
    /// Entries now held by the store.
    pub entries: BTreeMap<String, StateEntry>,
}

/// What [`Orchestrator::apply`] did with a plan.
#[derive(Clone, Debug, PartialEq)]
pub enum ApplyOutcome {
    /// Nothing was executed; the plan is returned for review.
    DryRun(ApplyPlan),
    /// The plan was executed and committed.
    Applied(ApplyReport),
}

/// Runs plan and apply for one layer.
pub struct Orchestrator<'a> {
    topology: &'a Topology,
    stores: &'a StateStores,
    backend: &'a dyn ProvisioningBackend,
    layer: &'a Layer,
    refresh: bool,
    phase: RunPhase,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator for `layer`.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::UnknownLayer`] when `layer` is not part of
    /// `topology` or has no registered store.
    pub fn new(
        topology: &'a Topology,
        stores: &'a StateStores,
        backend: &'a dyn ProvisioningBackend,
        layer: &str,
    ) -> StratumResult<Self> {
        let target = topology.layer(layer)?;
        stores.get(layer)?;
        Ok(Self {
            topology,
            stores,
            backend,
            layer: target,
            refresh: true,
            phase: RunPhase::Planning,
        })
    }

    /// Enable or disable the provider refresh while planning.
    #[must_use]
    pub const fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Current phase of the run.
    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Layer this orchestrator manages.
    #[must_use]
    pub const fn layer(&self) -> &'a Layer {
        self.layer
    }

    fn enter(&mut self, next: RunPhase) -> StratumResult<()> {
        let from = self.phase;
        self.phase = from.transition(next)?;
        debug!(layer = %self.layer.name, from = from.as_str(), to = next.as_str(), "apply phase changed");
        Ok(())
    }

    /// Compute the plan for the layer.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::InvalidTransition`] when the run already
    /// planned, otherwise any error from [`Planner::plan`]; the run is then
    /// in [`RunPhase::PlanFailed`].
    pub fn plan(&mut self) -> StratumResult<ApplyPlan> {
        self.phase.transition(RunPhase::Planned)?;
        let planned = Planner::new(self.topology, self.stores, self.backend)
            .with_refresh(self.refresh)
            .plan(&self.layer.name);
        match planned {
            Ok(plan) => {
                self.enter(RunPhase::Planned)?;
                Ok(plan)
            }
            Err(err) => {
                self.enter(RunPhase::PlanFailed)?;
                warn!(layer = %self.layer.name, error = %err, "planning failed");
                Err(err)
            }
        }
    }

    /// Execute `plan`, or return it untouched for [`Confirmation::DryRun`].
    ///
    /// Operations run sequentially: creates, then updates, then deletes.
    /// After the last operation the new entries and a fresh completion marker
    /// are committed against [`ApplyPlan::base_version`].
    ///
    /// # Errors
    ///
    /// - [`StratumError::PlanMismatch`] or
    ///   [`StratumError::AuthorizationMismatch`] when the plan or token
    ///   belongs to another layer.
    /// - [`StratumError::ApplyRaceLost`] when the store moved past the plan's
    ///   base version, before or after execution.
    /// - [`StratumError::PartialApply`] when a provider operation failed; the
    ///   confirmed operations are persisted first.
    /// - [`StratumError::InvalidTransition`] when the run has no fresh plan.
    pub fn apply(
        &mut self,
        plan: &ApplyPlan,
        confirmation: Confirmation,
    ) -> StratumResult<ApplyOutcome> {
        let layer = self.layer.name.clone();
        if plan.layer != layer {
            return Err(StratumError::PlanMismatch {
                plan: plan.layer.clone(),
                layer,
            });
        }
        let token = match confirmation {
            Confirmation::DryRun => {
                info!(layer = %layer, summary = %plan.summary(), "dry run; nothing executed");
                return Ok(ApplyOutcome::DryRun(plan.clone()));
            }
            Confirmation::Confirmed(token) => token,
        };
        if token.layer() != layer {
            return Err(StratumError::AuthorizationMismatch {
                granted: token.layer().to_owned(),
                layer,
            });
        }
        self.phase.transition(RunPhase::Executing)?;

        let store = self.stores.get(&layer)?;
        let snapshot = store.load()?;
        if snapshot.version != plan.base_version {
            self.enter(RunPhase::PlanFailed)?;
            warn!(layer = %layer, expected = plan.base_version, actual = snapshot.version, "plan is stale");
            return Err(StratumError::ApplyRaceLost {
                layer,
                expected: plan.base_version,
                actual: snapshot.version,
            });
        }
        self.enter(RunPhase::Executing)?;
        info!(layer = %layer, summary = %plan.summary(), "executing plan");

        let mut execution = Execution::new(self.backend, &layer, snapshot.entries);
        execution.forget(&plan.to_forget);
        let steps = plan
            .to_create
            .iter()
            .map(Step::Create)
            .chain(plan.to_update.iter().map(Step::Update))
            .chain(plan.to_delete.iter().map(Step::Delete));
        for step in steps {
            if let Err(cause) = execution.run(&step) {
                return Err(self.fail(plan, execution, step.id(), cause));
            }
        }
        self.commit(plan, execution)
    }

    fn fail(
        &mut self,
        plan: &ApplyPlan,
        execution: Execution<'_>,
        failed: &str,
        cause: ProviderError,
    ) -> StratumError {
        let layer = self.layer.name.clone();
        let completed = execution.completed().to_vec();
        let persisted_version = if execution.has_progress() {
            let persisted = self.stores.get(&layer).and_then(|store| {
                store.compare_and_swap(plan.base_version, execution.into_entries())
            });
            match persisted {
                Ok(version) => Some(version),
                Err(err) => {
                    warn!(layer = %layer, error = %err, "could not persist completed operations");
                    None
                }
            }
        } else {
            None
        };
        if let Err(err) = self.enter(RunPhase::PartiallyFailed) {
            return err;
        }
        warn!(
            layer = %layer,
            failed,
            completed = completed.len(),
            error = %cause,
            "apply stopped"
        );
        StratumError::partial_apply(PartialApplyFailure {
            layer,
            completed,
            failed: failed.to_owned(),
            cause,
            persisted_version,
        })
    }

    fn commit(&mut self, plan: &ApplyPlan, execution: Execution<'_>) -> StratumResult<ApplyOutcome> {
        let layer = self.layer.name.clone();
        let completed_at = Utc::now();
        let marker = CompletionMarker {
            completed_at,
            version: self.topology.release().to_owned(),
        };
        let summary = execution.summary();
        let mut entries = execution.into_entries();
        entries.insert(COMPLETION_MARKER_ID.to_owned(), marker.to_entry());

        let committed = self
            .stores
            .get(&layer)
            .and_then(|store| store.compare_and_swap(plan.base_version, entries.clone()));
        match committed {
            Ok(version) => {
                self.enter(RunPhase::Succeeded)?;
                info!(layer = %layer, version, "apply committed");
                Ok(ApplyOutcome::Applied(ApplyReport {
                    layer,
                    version,
                    created: summary.created,
                    updated: summary.updated,
                    deleted: summary.deleted,
                    forgotten: summary.forgotten,
                    completed_at,
                    entries,
                }))
            }
            Err(err) => {
                self.enter(RunPhase::PartiallyFailed)?;
                warn!(layer = %layer, error = %err, "commit rejected");
                Err(err.into_race_lost(&layer))
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("layer", &self.layer.name)
            .field("refresh", &self.refresh)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
