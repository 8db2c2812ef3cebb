//! Plan construction.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::diff::changed_fields;
use super::{ApplyPlan, PlannedUpdate};
use crate::backend::ProvisioningBackend;
use crate::declaration::Attributes;
use crate::error::{StratumError, StratumResult};
use crate::graph::{DependencyGraph, topological_order};
use crate::layer::{Layer, Topology};
use crate::resolver::Resolver;
use crate::state::{StateEntry, StateSnapshot, StateStores};

/// Computes [`ApplyPlan`]s for the layers of a topology.
#[derive(Clone, Copy)]
pub struct Planner<'a> {
    topology: &'a Topology,
    stores: &'a StateStores,
    backend: &'a dyn ProvisioningBackend,
    refresh: bool,
}

impl<'a> Planner<'a> {
    /// Create a planner that refreshes provider state before diffing.
    #[must_use]
    pub fn new(
        topology: &'a Topology,
        stores: &'a StateStores,
        backend: &'a dyn ProvisioningBackend,
    ) -> Self {
        Self {
            topology,
            stores,
            backend,
            refresh: true,
        }
    }

    /// Enable or disable the provider refresh.
    ///
    /// Without refresh, recorded observed attributes stand in for live ones
    /// and out-of-band deletions go unnoticed.
    #[must_use]
    pub const fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Compute the plan for `layer`.
    ///
    /// Creates and updates follow the declaration dependency order, ties
    /// broken by id. Deletes run dependents first. Planning the same inputs
    /// twice yields equal plans.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::CyclicDependency`] for cyclic declarations,
    /// resolution errors for unreadable upstream outputs,
    /// [`StratumError::ProtectedResourceWouldBeDeleted`] when a protected
    /// entry lost its declaration, [`StratumError::RefreshFailed`] when the
    /// backend cannot describe a tracked resource, and store errors.
    pub fn plan(&self, layer: &str) -> StratumResult<ApplyPlan> {
        let target = self.topology.layer(layer)?;
        let order = target.declaration_order()?;
        let inputs = Resolver::new(self.topology, self.stores).materialise(layer)?;
        let snapshot = self.stores.get(layer)?.load()?;
        let live = self.refresh_entries(target, &snapshot)?;

        let mut plan = ApplyPlan {
            layer: target.name.clone(),
            base_version: snapshot.version,
            inputs: inputs.to_list(),
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
            to_forget: Vec::new(),
        };

        for declaration in order {
            let resolved = declaration.substitute(|reference| inputs.get(reference).cloned());
            let current = snapshot
                .get(&declaration.id)
                .filter(|entry| !entry.is_completion_marker());
            let Some(entry) = current else {
                plan.to_create.push(resolved);
                continue;
            };
            let observed = match live.get(&declaration.id) {
                Some(None) => {
                    info!(layer, declaration = %declaration.id, "resource vanished; re-creating");
                    plan.to_create.push(resolved);
                    continue;
                }
                Some(Some(attributes)) => attributes,
                None => &entry.observed_attributes,
            };
            let changed = changed_fields(&resolved, entry, observed);
            if !changed.is_empty() {
                plan.to_update.push(PlannedUpdate {
                    declaration: resolved,
                    current: entry.clone(),
                    changed,
                });
            }
        }

        let (to_delete, to_forget) = orphaned_entries(target, &snapshot, &live)?;
        plan.to_delete = to_delete;
        plan.to_forget = to_forget;

        let summary = plan.summary();
        info!(
            layer,
            base_version = plan.base_version,
            create = summary.create,
            update = summary.update,
            delete = summary.delete,
            forget = summary.forget,
            "plan computed"
        );
        Ok(plan)
    }

    /// Describe every tracked resource; `None` marks a vanished resource.
    fn refresh_entries(
        &self,
        layer: &Layer,
        snapshot: &StateSnapshot,
    ) -> StratumResult<BTreeMap<String, Option<Attributes>>> {
        let mut live = BTreeMap::new();
        if !self.refresh {
            return Ok(live);
        }
        for entry in snapshot.resources() {
            let described = self.backend.describe(&entry.provider_id).map_err(|source| {
                StratumError::RefreshFailed {
                    layer: layer.name.clone(),
                    declaration: entry.declaration_id.clone(),
                    source,
                }
            })?;
            live.insert(entry.declaration_id.clone(), described);
        }
        debug!(layer = %layer.name, refreshed = live.len(), "provider state refreshed");
        Ok(live)
    }
}

impl std::fmt::Debug for Planner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("release", &self.topology.release())
            .field("stores", self.stores)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

/// Split undeclared entries into deletions and entries to forget.
///
/// Deletions are ordered so an entry is removed before anything it
/// depended on.
fn orphaned_entries(
    layer: &Layer,
    snapshot: &StateSnapshot,
    live: &BTreeMap<String, Option<Attributes>>,
) -> StratumResult<(Vec<StateEntry>, Vec<String>)> {
    let mut doomed: BTreeMap<&str, &StateEntry> = BTreeMap::new();
    let mut forget = Vec::new();
    for entry in snapshot.resources() {
        if layer.declaration(&entry.declaration_id).is_some() {
            continue;
        }
        if entry.prevent_destroy {
            return Err(StratumError::ProtectedResourceWouldBeDeleted {
                layer: layer.name.clone(),
                declaration: entry.declaration_id.clone(),
            });
        }
        if matches!(live.get(&entry.declaration_id), Some(None)) {
            forget.push(entry.declaration_id.clone());
        } else {
            doomed.insert(entry.declaration_id.as_str(), entry);
        }
    }

    let graph: DependencyGraph<'_> = doomed
        .iter()
        .map(|(id, entry)| (*id, entry.depends_on.iter().map(String::as_str).collect()))
        .collect();
    let mut order =
        topological_order(&graph).unwrap_or_else(|_| doomed.keys().copied().collect());
    order.reverse();
    let to_delete = order
        .into_iter()
        .filter_map(|id| doomed.get(id).map(|entry| (*entry).clone()))
        .collect();
    Ok((to_delete, forget))
}
