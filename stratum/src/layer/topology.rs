//! Validated sets of layers and their upstream relation.

use std::collections::BTreeSet;

use tracing::debug;

use super::Layer;
use crate::error::{StratumError, StratumResult};
use crate::graph::{DependencyGraph, describe_cycle, topological_order};

/// A deployment topology: every layer plus the release label written into
/// completion markers.
///
/// Construction validates that layer names are unique, every upstream name
/// resolves, the upstream relation is acyclic and each layer passes
/// [`Layer::validate`].
#[derive(Clone, Debug, PartialEq)]
pub struct Topology {
    release: String,
    layers: Vec<Layer>,
    order: Vec<String>,
}

impl Topology {
    /// Validate and assemble a topology.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::DuplicateLayer`], [`StratumError::UnknownLayer`]
    /// or [`StratumError::CyclicLayers`] for an invalid upstream relation, or
    /// any error from [`Layer::validate`].
    pub fn new(release: impl Into<String>, layers: Vec<Layer>) -> StratumResult<Self> {
        let mut names = BTreeSet::new();
        for layer in &layers {
            if !names.insert(layer.name.as_str()) {
                return Err(StratumError::DuplicateLayer(layer.name.clone()));
            }
        }
        for layer in &layers {
            if let Some(missing) = layer
                .upstream
                .iter()
                .find(|name| !names.contains(name.as_str()))
            {
                return Err(StratumError::UnknownLayer(missing.clone()));
            }
            layer.validate()?;
        }

        let graph: DependencyGraph<'_> = layers
            .iter()
            .map(|layer| {
                (
                    layer.name.as_str(),
                    layer.upstream.iter().map(String::as_str).collect(),
                )
            })
            .collect();
        let order: Vec<String> = topological_order(&graph)
            .map_err(|cycle| StratumError::CyclicLayers {
                cycle: describe_cycle(&cycle),
            })?
            .into_iter()
            .map(str::to_owned)
            .collect();
        debug!(layers = ?order, "topology validated");

        Ok(Self {
            release: release.into(),
            layers,
            order,
        })
    }

    /// Release label recorded in completion markers.
    #[must_use]
    pub fn release(&self) -> &str {
        &self.release
    }

    /// Layers in definition order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Look up a layer by name.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::UnknownLayer`] when no layer has that name.
    pub fn layer(&self, name: &str) -> StratumResult<&Layer> {
        self.layers
            .iter()
            .find(|layer| layer.name == name)
            .ok_or_else(|| StratumError::UnknownLayer(name.to_owned()))
    }

    /// Layers ordered so upstream layers come before their readers.
    #[must_use]
    pub fn apply_order(&self) -> Vec<&Layer> {
        self.order
            .iter()
            .filter_map(|name| self.layer(name).ok())
            .collect()
    }
}
