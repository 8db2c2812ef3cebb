//! Sequential execution of plan operations against the backend.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::debug;

use crate::backend::{ProviderError, ProviderHandle, ProvisioningBackend};
use crate::declaration::ResourceDeclaration;
use crate::plan::PlannedUpdate;
use crate::state::StateEntry;

/// One provider operation taken from a plan.
pub(super) enum Step<'p> {
    Create(&'p ResourceDeclaration),
    Update(&'p PlannedUpdate),
    Delete(&'p StateEntry),
}

impl<'p> Step<'p> {
    /// Declaration id the operation targets.
    pub(super) fn id(&self) -> &'p str {
        match self {
            Self::Create(declaration) => &declaration.id,
            Self::Update(update) => &update.declaration.id,
            Self::Delete(entry) => &entry.declaration_id,
        }
    }

    const fn verb(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }
}

/// Ids touched by an execution, grouped by operation.
#[derive(Clone, Debug, Default)]
pub(super) struct Summary {
    pub(super) created: Vec<String>,
    pub(super) updated: Vec<String>,
    pub(super) deleted: Vec<String>,
    pub(super) forgotten: Vec<String>,
}

/// Working copy of a layer's entries while a plan runs.
pub(super) struct Execution<'a> {
    backend: &'a dyn ProvisioningBackend,
    layer: &'a str,
    entries: BTreeMap<String, StateEntry>,
    completed: Vec<String>,
    summary: Summary,
}

impl<'a> Execution<'a> {
    pub(super) fn new(
        backend: &'a dyn ProvisioningBackend,
        layer: &'a str,
        entries: BTreeMap<String, StateEntry>,
    ) -> Self {
        Self {
            backend,
            layer,
            entries,
            completed: Vec::new(),
            summary: Summary::default(),
        }
    }

    /// Drop entries whose resources are already gone.
    pub(super) fn forget(&mut self, ids: &[String]) {
        for id in ids {
            if self.entries.remove(id).is_some() {
                debug!(layer = self.layer, declaration = %id, "entry forgotten");
                self.summary.forgotten.push(id.clone());
            }
        }
    }

    /// Run one operation and record its outcome in the working entries.
    pub(super) fn run(&mut self, step: &Step<'_>) -> Result<(), ProviderError> {
        let id = step.id();
        debug!(layer = self.layer, declaration = id, operation = step.verb(), "operation started");
        match step {
            Step::Create(declaration) => {
                let entry = self.provision(declaration, None)?;
                self.entries.insert(entry.declaration_id.clone(), entry);
                self.summary.created.push(id.to_owned());
            }
            Step::Update(update) => {
                let entry = self.provision(&update.declaration, Some(&update.current.provider_id))?;
                self.entries.insert(entry.declaration_id.clone(), entry);
                self.summary.updated.push(id.to_owned());
            }
            Step::Delete(entry) => {
                match self.backend.delete(&entry.provider_id) {
                    Ok(()) => {}
                    Err(ProviderError::NotFound(handle)) => {
                        debug!(layer = self.layer, handle = %handle, "resource already gone");
                    }
                    Err(err) => return Err(err),
                }
                self.entries.remove(id);
                self.summary.deleted.push(id.to_owned());
            }
        }
        self.completed.push(id.to_owned());
        debug!(layer = self.layer, declaration = id, operation = step.verb(), "operation finished");
        Ok(())
    }

    fn provision(
        &self,
        declaration: &ResourceDeclaration,
        existing: Option<&ProviderHandle>,
    ) -> Result<StateEntry, ProviderError> {
        let handle = self.backend.create_or_update(declaration, existing)?;
        let observed = self
            .backend
            .describe(&handle)?
            .ok_or_else(|| ProviderError::NotFound(handle.clone()))?;
        Ok(StateEntry::applied(declaration, handle, observed, Utc::now()))
    }

    /// Ids of operations the provider confirmed, in order.
    pub(super) fn completed(&self) -> &[String] {
        &self.completed
    }

    /// Returns `true` when the working entries differ from the snapshot.
    pub(super) fn has_progress(&self) -> bool {
        !self.completed.is_empty() || !self.summary.forgotten.is_empty()
    }

    pub(super) fn summary(&self) -> Summary {
        self.summary.clone()
    }

    pub(super) fn into_entries(self) -> BTreeMap<String, StateEntry> {
        self.entries
    }
}
