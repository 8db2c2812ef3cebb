//! Cross-layer reference resolution.
//!
//! Outputs are read straight from an upstream layer's state store at plan
//! time. Resolution never writes and carries no version: a value captured
//! for a plan stays in that plan even if the upstream layer is re-applied
//! before the plan executes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::declaration::UpstreamRef;
use crate::error::{StratumError, StratumResult};
use crate::layer::{Layer, Topology};
use crate::state::{StateSnapshot, StateStores};

/// An upstream output captured for a plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedInput {
    /// Upstream layer that exposed the value.
    pub layer: String,
    /// Output name.
    pub output: String,
    /// Value at resolution time.
    pub value: Value,
}

/// Every upstream value a layer's declarations refer to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedInputs {
    values: BTreeMap<UpstreamRef, Value>,
}

impl ResolvedInputs {
    /// Value resolved for `reference`, if any.
    #[must_use]
    pub fn get(&self, reference: &UpstreamRef) -> Option<&Value> {
        self.values.get(reference)
    }

    /// Returns `true` when no references were resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flatten into a list ordered by layer then output.
    #[must_use]
    pub fn to_list(&self) -> Vec<ResolvedInput> {
        self.values
            .iter()
            .map(|(reference, value)| ResolvedInput {
                layer: reference.layer.clone(),
                output: reference.output.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

/// Reads outputs of upstream layers.
#[derive(Clone, Copy, Debug)]
pub struct Resolver<'a> {
    topology: &'a Topology,
    stores: &'a StateStores,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over `topology` reading from `stores`.
    #[must_use]
    pub const fn new(topology: &'a Topology, stores: &'a StateStores) -> Self {
        Self { topology, stores }
    }

    /// Read `output` of `layer` regardless of who is asking.
    ///
    /// This backs the `describe-output` command.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::UpstreamNotBootstrapped`] when the layer has no
    /// completion marker or the output's source entry or attribute is absent,
    /// [`StratumError::UpstreamOutputMissing`] when the layer exposes no such
    /// output, and any store error from loading.
    pub fn describe_output(&self, layer: &str, output: &str) -> StratumResult<Value> {
        let source = self.topology.layer(layer)?;
        let store = self.stores.get(layer)?;
        let snapshot = store.load()?;
        output_value(source, &snapshot, store.location(), output)
    }

    /// Resolve `upstream`'s `output` on behalf of `layer`.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::InvalidTopology`] when `upstream` is not one
    /// of `layer`'s upstream layers, otherwise as for
    /// [`Resolver::describe_output`].
    pub fn resolve(&self, layer: &str, upstream: &str, output: &str) -> StratumResult<Value> {
        let reader = self.topology.layer(layer)?;
        ensure_upstream(reader, upstream)?;
        self.describe_output(upstream, output)
    }

    /// Resolve every upstream reference found in `layer`'s declarations.
    ///
    /// Each upstream store is loaded once, so all values from one upstream
    /// layer come from the same snapshot.
    ///
    /// # Errors
    ///
    /// Fails on the first reference that cannot be resolved, as for
    /// [`Resolver::resolve`].
    pub fn materialise(&self, layer: &str) -> StratumResult<ResolvedInputs> {
        let reader = self.topology.layer(layer)?;
        let mut wanted: BTreeMap<&str, BTreeSet<UpstreamRef>> = BTreeMap::new();
        let refs: BTreeSet<UpstreamRef> = reader
            .declarations
            .iter()
            .flat_map(|decl| decl.upstream_refs())
            .collect();
        for reference in &refs {
            ensure_upstream(reader, &reference.layer)?;
            wanted
                .entry(reference.layer.as_str())
                .or_default()
                .insert(reference.clone());
        }

        let mut values = BTreeMap::new();
        for (upstream, references) in wanted {
            let source = self.topology.layer(upstream)?;
            let store = self.stores.get(upstream)?;
            let snapshot = store.load()?;
            for reference in references {
                let value = output_value(source, &snapshot, store.location(), &reference.output)?;
                values.insert(reference, value);
            }
        }
        debug!(layer, inputs = values.len(), "upstream inputs resolved");
        Ok(ResolvedInputs { values })
    }
}

fn ensure_upstream(reader: &Layer, upstream: &str) -> StratumResult<()> {
    if reader.upstream.iter().any(|name| name == upstream) {
        Ok(())
    } else {
        Err(StratumError::invalid_topology(format!(
            "layer '{}' may not read outputs of '{upstream}'",
            reader.name
        )))
    }
}

fn output_value(
    source: &Layer,
    snapshot: &StateSnapshot,
    location: &str,
    output: &str,
) -> StratumResult<Value> {
    if snapshot.completion_marker().is_none() {
        return Err(StratumError::not_bootstrapped(
            &source.name,
            format!("no completion marker in '{location}'"),
        ));
    }
    let spec = source
        .outputs
        .get(output)
        .ok_or_else(|| StratumError::UpstreamOutputMissing {
            layer: source.name.clone(),
            output: output.to_owned(),
        })?;
    let entry = snapshot.get(&spec.resource).ok_or_else(|| {
        StratumError::not_bootstrapped(
            &source.name,
            format!("resource '{}' has no state entry", spec.resource),
        )
    })?;
    entry
        .observed_attributes
        .get(&spec.attribute)
        .cloned()
        .ok_or_else(|| {
            StratumError::not_bootstrapped(
                &source.name,
                format!(
                    "resource '{}' has no observed attribute '{}'",
                    spec.resource, spec.attribute
                ),
            )
        })
}
