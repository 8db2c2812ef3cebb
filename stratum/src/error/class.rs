//! Coarse classification of errors for operators and pipelines.

use super::StratumError;

/// How an operator or pipeline should react to a [`StratumError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorClass {
    /// The store could not be reached; retrying the whole cycle may help.
    Transient,
    /// Another writer won; re-plan against fresh state.
    Replan,
    /// An upstream layer must be completed by an operator first.
    UpstreamPending,
    /// The topology or declarations are wrong; never retried.
    Configuration,
    /// A protected resource blocks the plan until its flag is lifted.
    Protected,
    /// Execution stopped part-way; the next plan reconciles.
    Partial,
    /// The gate rejected the run.
    Authorization,
}

impl ErrorClass {
    /// Returns a short, stable label for logs and machine output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Replan => "replan",
            Self::UpstreamPending => "upstream-pending",
            Self::Configuration => "configuration",
            Self::Protected => "protected",
            Self::Partial => "partial",
            Self::Authorization => "authorization",
        }
    }
}

impl StratumError {
    /// Classifies the error for exit-code and retry decisions.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::StoreUnavailable { .. } | Self::RefreshFailed { .. } => ErrorClass::Transient,
            Self::ConcurrentModification { .. } | Self::ApplyRaceLost { .. } => ErrorClass::Replan,
            Self::UpstreamNotBootstrapped { .. } | Self::UpstreamOutputMissing { .. } => {
                ErrorClass::UpstreamPending
            }
            Self::ProtectedResourceWouldBeDeleted { .. } => ErrorClass::Protected,
            Self::PartialApply(_) => ErrorClass::Partial,
            Self::InteractiveConfirmationRequired { .. }
            | Self::UpstreamIncomplete { .. }
            | Self::AuthorizationMismatch { .. } => ErrorClass::Authorization,
            Self::CorruptState { .. }
            | Self::UnknownLayer(_)
            | Self::DuplicateLayer(_)
            | Self::DuplicateDeclaration { .. }
            | Self::ReservedIdentifier { .. }
            | Self::UnknownDependency { .. }
            | Self::CyclicDependency { .. }
            | Self::CyclicLayers { .. }
            | Self::InvalidTopology { .. }
            | Self::PlanMismatch { .. }
            | Self::InvalidTransition { .. } => ErrorClass::Configuration,
        }
    }
}
