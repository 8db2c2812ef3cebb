//! Apply plans: the diff between declared and recorded state.
//!
//! A plan is a plain value. It can be rendered for review, serialised to
//! JSON and handed to [`crate::Orchestrator::apply`] later; execution only
//! trusts the plan if the layer's store is still at
//! [`ApplyPlan::base_version`].

mod diff;
mod planner;

use serde::{Deserialize, Serialize};

use crate::declaration::ResourceDeclaration;
use crate::resolver::ResolvedInput;
use crate::state::StateEntry;

pub use planner::Planner;

/// A declaration that exists in state but needs changing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedUpdate {
    /// Desired declaration with upstream references substituted.
    pub declaration: ResourceDeclaration,
    /// Entry currently recorded for the declaration.
    pub current: StateEntry,
    /// Attribute keys (or `kind`, `depends_on`, `prevent_destroy`) that differ.
    pub changed: Vec<String>,
}

/// Operations needed to bring a layer to its declared state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplyPlan {
    /// Layer the plan was computed for.
    pub layer: String,
    /// Store version the plan was computed against.
    pub base_version: u64,
    /// Upstream values captured while planning.
    #[serde(default)]
    pub inputs: Vec<ResolvedInput>,
    /// Declarations to create, dependencies first.
    pub to_create: Vec<ResourceDeclaration>,
    /// Declarations to update, dependencies first.
    pub to_update: Vec<PlannedUpdate>,
    /// Entries with no declaration, dependents first.
    pub to_delete: Vec<StateEntry>,
    /// Undeclared entries whose resources already vanished; dropped from
    /// state without a provider call.
    #[serde(default)]
    pub to_forget: Vec<String>,
}

/// Operation counts of a plan.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Resources to create.
    pub create: usize,
    /// Resources to update.
    pub update: usize,
    /// Resources to delete.
    pub delete: usize,
    /// Entries to forget.
    pub forget: usize,
}

impl ApplyPlan {
    /// Returns `true` when applying would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty()
            && self.to_update.is_empty()
            && self.to_delete.is_empty()
            && self.to_forget.is_empty()
    }

    /// Count operations by type.
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.to_create.len(),
            update: self.to_update.len(),
            delete: self.to_delete.len(),
            forget: self.to_forget.len(),
        }
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete",
            self.create, self.update, self.delete
        )?;
        if self.forget > 0 {
            write!(f, ", {} to forget", self.forget)?;
        }
        Ok(())
    }
}
