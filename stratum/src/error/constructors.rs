//! Constructors for `StratumError` variants with boxed or derived payloads.

use super::{PartialApplyFailure, StratumError};

impl StratumError {
    /// Construct a [`StratumError::StoreUnavailable`] for `location`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratum::StratumError;
    /// let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    /// let err = StratumError::store_unavailable("state/bootstrap.json", io);
    /// assert!(matches!(err, StratumError::StoreUnavailable { .. }));
    /// ```
    #[must_use]
    pub fn store_unavailable(
        location: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::StoreUnavailable {
            location: location.into(),
            source: source.into(),
        }
    }

    /// Construct a [`StratumError::CorruptState`] for `location`.
    #[must_use]
    pub fn corrupt_state(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptState {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Construct a [`StratumError::InvalidTopology`].
    #[must_use]
    pub fn invalid_topology(message: impl Into<String>) -> Self {
        Self::InvalidTopology {
            message: message.into(),
        }
    }

    /// Construct a [`StratumError::UpstreamNotBootstrapped`].
    #[must_use]
    pub fn not_bootstrapped(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamNotBootstrapped {
            layer: layer.into(),
            reason: reason.into(),
        }
    }

    /// Wrap partial-apply details.
    #[must_use]
    pub fn partial_apply(failure: PartialApplyFailure) -> Self {
        Self::PartialApply(Box::new(failure))
    }

    /// Re-label a store-level [`StratumError::ConcurrentModification`] as an
    /// [`StratumError::ApplyRaceLost`] for `layer`; other errors pass through.
    #[must_use]
    pub fn into_race_lost(self, layer: &str) -> Self {
        match self {
            Self::ConcurrentModification {
                expected, actual, ..
            } => Self::ApplyRaceLost {
                layer: layer.to_owned(),
                expected,
                actual,
            },
            other => other,
        }
    }

    /// Returns the partial-apply details when this error carries them.
    #[must_use]
    pub fn as_partial_apply(&self) -> Option<&PartialApplyFailure> {
        match self {
            Self::PartialApply(failure) => Some(failure),
            _ => None,
        }
    }
}
