//! Lifecycle of a single plan-and-apply invocation.

use serde::Serialize;

use crate::error::{StratumError, StratumResult};

/// Phase of an apply invocation.
///
/// ```text
/// Planning -> Planned -> Executing -> Succeeded
///    |           |            \----> PartiallyFailed
///    \-----------+-> PlanFailed
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Computing the plan.
    #[default]
    Planning,
    /// A plan is ready for review or execution.
    Planned,
    /// Provider operations are running.
    Executing,
    /// Every operation ran and the new state was committed.
    Succeeded,
    /// Execution stopped part-way or its commit was rejected.
    PartiallyFailed,
    /// No plan could be produced, or the plan went stale before execution.
    PlanFailed,
}

impl RunPhase {
    /// Returns the lower-case name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Planned => "planned",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::PartiallyFailed => "partially_failed",
            Self::PlanFailed => "plan_failed",
        }
    }

    /// Returns `true` once no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::PartiallyFailed | Self::PlanFailed
        )
    }

    /// Returns `true` when moving to `next` is legal.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Planning, Self::Planned | Self::PlanFailed)
                | (Self::Planned, Self::Executing | Self::PlanFailed)
                | (Self::Executing, Self::Succeeded | Self::PartiallyFailed)
        )
    }

    /// Validate a move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::InvalidTransition`] for illegal moves.
    pub fn transition(self, next: Self) -> StratumResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StratumError::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
