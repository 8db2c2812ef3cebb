//! Scriptable in-process backend.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::{ProviderError, ProviderHandle, ProvisioningBackend, check_metadata_keys};
use crate::declaration::{Attributes, ResourceDeclaration};

/// A failure to inject for a declaration id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Fail with [`ProviderError::Rejected`].
    Reject(String),
    /// Fail with [`ProviderError::Timeout`].
    Timeout(Duration),
}

impl ScriptedFailure {
    fn to_error(&self) -> ProviderError {
        match self {
            Self::Reject(message) => ProviderError::rejected(message.clone()),
            Self::Timeout(after) => ProviderError::Timeout { after: *after },
        }
    }
}

/// An operation received by a [`MemoryBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    /// `create_or_update` for a declaration id.
    CreateOrUpdate {
        /// Declaration id.
        id: String,
        /// Whether an existing handle was supplied.
        update: bool,
    },
    /// `delete` of a handle.
    Delete(ProviderHandle),
    /// `describe` of a handle.
    Describe(ProviderHandle),
}

#[derive(Debug, Default)]
struct Inner {
    resources: BTreeMap<ProviderHandle, Attributes>,
    owners: BTreeMap<ProviderHandle, String>,
    failures: BTreeMap<String, ScriptedFailure>,
    calls: Vec<BackendCall>,
}

impl Inner {
    fn scripted(&self, id: &str) -> Result<(), ProviderError> {
        self.failures
            .get(id)
            .map_or(Ok(()), |failure| Err(failure.to_error()))
    }

    fn owner_failure(&self, handle: &ProviderHandle) -> Result<(), ProviderError> {
        self.owners
            .get(handle)
            .map_or(Ok(()), |id| self.scripted(id))
    }
}

/// Backend keeping resources in memory.
///
/// Handles take the form `mem://<kind>/<id>` and observed attributes are the
/// applied attributes plus a `self_link`. Failures can be scripted per
/// declaration id and then apply to every operation targeting that
/// declaration until cleared.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    /// Create a backend with no resources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make operations on declaration `id` fail with `failure`.
    pub fn fail_on(&self, id: impl Into<String>, failure: ScriptedFailure) {
        self.inner.lock().failures.insert(id.into(), failure);
    }

    /// Remove all scripted failures.
    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// Operations received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().calls.clone()
    }

    /// Number of `create_or_update` and `delete` calls received so far.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|call| !matches!(call, BackendCall::Describe(_)))
            .count()
    }

    /// Live attributes of `handle`, if it exists.
    #[must_use]
    pub fn resource(&self, handle: &ProviderHandle) -> Option<Attributes> {
        self.inner.lock().resources.get(handle).cloned()
    }

    /// Number of live resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.inner.lock().resources.len()
    }

    /// Delete `handle` behind the orchestrator's back.
    pub fn remove_out_of_band(&self, handle: &ProviderHandle) {
        let mut inner = self.inner.lock();
        inner.resources.remove(handle);
        inner.owners.remove(handle);
    }

    /// Change a live attribute behind the orchestrator's back.
    pub fn set_out_of_band(&self, handle: &ProviderHandle, key: &str, value: impl Into<Value>) {
        if let Some(attributes) = self.inner.lock().resources.get_mut(handle) {
            attributes.insert(key.to_owned(), value.into());
        }
    }

    fn handle_for(declaration: &ResourceDeclaration) -> ProviderHandle {
        ProviderHandle::new(format!("mem://{}/{}", declaration.kind, declaration.id))
    }
}

impl ProvisioningBackend for MemoryBackend {
    fn create_or_update(
        &self,
        declaration: &ResourceDeclaration,
        existing: Option<&ProviderHandle>,
    ) -> Result<ProviderHandle, ProviderError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::CreateOrUpdate {
            id: declaration.id.clone(),
            update: existing.is_some(),
        });
        inner.scripted(&declaration.id)?;
        check_metadata_keys(declaration)?;
        if let Some(handle) = existing {
            if !inner.resources.contains_key(handle) {
                return Err(ProviderError::NotFound(handle.clone()));
            }
            inner.resources.remove(handle);
            inner.owners.remove(handle);
        }
        let handle = Self::handle_for(declaration);
        let mut observed = declaration.attributes.clone();
        observed.insert(
            "self_link".to_owned(),
            Value::String(handle.as_str().to_owned()),
        );
        inner.resources.insert(handle.clone(), observed);
        inner.owners.insert(handle.clone(), declaration.id.clone());
        Ok(handle)
    }

    fn delete(&self, handle: &ProviderHandle) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Delete(handle.clone()));
        inner.owner_failure(handle)?;
        if inner.resources.remove(handle).is_none() {
            return Err(ProviderError::NotFound(handle.clone()));
        }
        inner.owners.remove(handle);
        Ok(())
    }

    fn describe(&self, handle: &ProviderHandle) -> Result<Option<Attributes>, ProviderError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Describe(handle.clone()));
        inner.owner_failure(handle)?;
        Ok(inner.resources.get(handle).cloned())
    }
}
