//! The boundary to the system that actually creates resources.
//!
//! The orchestrator and planner only ever talk to a [`ProvisioningBackend`].
//! Resource-kind specific behaviour lives behind it; the core treats
//! attributes as opaque JSON and handles as opaque strings.

mod local;
mod memory;

use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::declaration::{Attributes, ResourceDeclaration};

pub use local::LocalBackend;
pub use memory::{BackendCall, MemoryBackend, ScriptedFailure};

/// Provider-assigned identity of a created resource.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderHandle(String);

impl ProviderHandle {
    /// Wrap a provider identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failures reported by a provisioning backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// The provider refused the operation.
    #[error("provider rejected the operation: {message}")]
    Rejected {
        /// Provider supplied reason.
        message: String,
    },

    /// The provider did not answer in time.
    #[error("provider timed out after {}ms", .after.as_millis())]
    Timeout {
        /// How long the caller waited.
        after: Duration,
    },

    /// The handle does not name an existing resource.
    #[error("resource '{0}' does not exist")]
    NotFound(ProviderHandle),

    /// Local I/O failed while talking to the provider.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The provider returned data that could not be understood.
    #[error("malformed provider response: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },
}

impl ProviderError {
    /// Construct a [`ProviderError::Rejected`].
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Construct a [`ProviderError::Malformed`].
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attribute keys the bundled backends report as provider metadata.
///
/// Declarations may not set them; a declared value would be overwritten on
/// every describe and surface as drift on every plan.
pub const PROVIDER_METADATA_KEYS: [&str; 2] = ["self_link", "generation"];

/// Reject a declaration that sets one of [`PROVIDER_METADATA_KEYS`].
fn check_metadata_keys(declaration: &ResourceDeclaration) -> Result<(), ProviderError> {
    PROVIDER_METADATA_KEYS
        .iter()
        .find(|key| declaration.attributes.contains_key(**key))
        .map_or(Ok(()), |key| {
            Err(ProviderError::rejected(format!(
                "'{key}' on {}/{} is reserved for provider metadata",
                declaration.kind, declaration.id
            )))
        })
}

/// Creates, updates, inspects and deletes resources.
///
/// Implementations must be safe to call from several threads; concurrent
/// applies of different layers may share one backend.
pub trait ProvisioningBackend: Send + Sync {
    /// Create the resource, or update it in place when `existing` is given.
    ///
    /// `declaration` has every upstream reference already substituted.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the provider refuses or fails.
    fn create_or_update(
        &self,
        declaration: &ResourceDeclaration,
        existing: Option<&ProviderHandle>,
    ) -> Result<ProviderHandle, ProviderError>;

    /// Delete the resource named by `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the resource is already gone,
    /// or another [`ProviderError`] when deletion fails.
    fn delete(&self, handle: &ProviderHandle) -> Result<(), ProviderError>;

    /// Report the live attributes of `handle`, or `None` when it no longer
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the provider cannot be queried.
    fn describe(&self, handle: &ProviderHandle) -> Result<Option<Attributes>, ProviderError>;
}
