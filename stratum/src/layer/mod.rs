//! Layers: independently applied groups of declarations with their own state.

mod topology;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::declaration::ResourceDeclaration;
use crate::error::{StratumError, StratumResult};
use crate::graph::{DependencyGraph, describe_cycle, topological_order};
use crate::state::is_reserved_id;

pub use topology::Topology;

/// Trust boundary a layer runs under.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Identity and permission resources; applied by an operator only.
    Privileged,
    /// Workload resources; applied by automation once upstream is complete.
    #[default]
    Application,
}

impl TrustLevel {
    /// Returns the configuration spelling of the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Privileged => "privileged",
            Self::Application => "application",
        }
    }
}

/// Where an output's value comes from in the layer's state.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    /// Declaration id whose state entry holds the value.
    pub resource: String,
    /// Key within the entry's observed attributes.
    pub attribute: String,
}

impl OutputSpec {
    /// Derive an output from `resource`'s observed `attribute`.
    #[must_use]
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }
}

/// A named group of declarations sharing one state store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Layer {
    /// Layer name, unique within the topology.
    pub name: String,
    /// Trust boundary of the layer.
    #[serde(default)]
    pub trust: TrustLevel,
    /// Opaque state store locator; defaults to `<name>.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Layers whose outputs this layer may read, in declaration order.
    #[serde(default)]
    pub upstream: Vec<String>,
    /// Outputs exposed to downstream layers.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputSpec>,
    /// Desired resources.
    #[serde(default, rename = "resources")]
    pub declarations: Vec<ResourceDeclaration>,
}

impl Layer {
    /// Create an empty application layer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trust: TrustLevel::Application,
            state: None,
            upstream: Vec::new(),
            outputs: BTreeMap::new(),
            declarations: Vec::new(),
        }
    }

    /// Mark the layer as privileged.
    #[must_use]
    pub const fn privileged(mut self) -> Self {
        self.trust = TrustLevel::Privileged;
        self
    }

    /// Allow the layer to read outputs from `layer`.
    #[must_use]
    pub fn reading_from(mut self, layer: impl Into<String>) -> Self {
        self.upstream.push(layer.into());
        self
    }

    /// Expose an output derived from a declaration's observed attribute.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, spec: OutputSpec) -> Self {
        self.outputs.insert(name.into(), spec);
        self
    }

    /// Append a declaration.
    #[must_use]
    pub fn with_declaration(mut self, declaration: ResourceDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Override the state store locator.
    #[must_use]
    pub fn with_state(mut self, location: impl Into<String>) -> Self {
        self.state = Some(location.into());
        self
    }

    /// Returns the state store locator for this layer.
    #[must_use]
    pub fn state_location(&self) -> String {
        self.state
            .clone()
            .unwrap_or_else(|| format!("{}.json", self.name))
    }

    /// Returns `true` when the layer runs under the privileged boundary.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.trust == TrustLevel::Privileged
    }

    /// Look up a declaration by id.
    #[must_use]
    pub fn declaration(&self, id: &str) -> Option<&ResourceDeclaration> {
        self.declarations.iter().find(|decl| decl.id == id)
    }

    /// Order declarations so each follows everything it depends on.
    ///
    /// Ties are broken by ascending id, so the order is stable across runs.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::CyclicDependency`] when `depends_on` edges
    /// form a cycle.
    pub fn declaration_order(&self) -> StratumResult<Vec<&ResourceDeclaration>> {
        let graph: DependencyGraph<'_> = self
            .declarations
            .iter()
            .map(|decl| {
                (
                    decl.id.as_str(),
                    decl.depends_on.iter().map(String::as_str).collect(),
                )
            })
            .collect();
        let order = topological_order(&graph).map_err(|cycle| StratumError::CyclicDependency {
            layer: self.name.clone(),
            cycle: describe_cycle(&cycle),
        })?;
        Ok(order
            .into_iter()
            .filter_map(|id| self.declaration(id))
            .collect())
    }

    /// Check the structural rules that do not need other layers.
    ///
    /// Cycles in `depends_on` are reported by [`Layer::declaration_order`]
    /// when a plan is built, not here.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for duplicate or reserved ids, dangling
    /// dependencies, outputs naming undeclared resources, and references to
    /// layers not listed as upstream.
    pub fn validate(&self) -> StratumResult<()> {
        if self.name.trim().is_empty() {
            return Err(StratumError::invalid_topology("layer names must not be empty"));
        }
        let mut seen = BTreeSet::new();
        for decl in &self.declarations {
            if is_reserved_id(&decl.id) {
                return Err(StratumError::ReservedIdentifier {
                    layer: self.name.clone(),
                    id: decl.id.clone(),
                });
            }
            if !seen.insert(decl.id.as_str()) {
                return Err(StratumError::DuplicateDeclaration {
                    layer: self.name.clone(),
                    id: decl.id.clone(),
                });
            }
        }
        for decl in &self.declarations {
            self.validate_edges(decl, &seen)?;
        }
        for (name, spec) in &self.outputs {
            if !seen.contains(spec.resource.as_str()) {
                return Err(StratumError::invalid_topology(format!(
                    "output '{name}' of layer '{}' names undeclared resource '{}'",
                    self.name, spec.resource
                )));
            }
        }
        Ok(())
    }

    fn validate_edges(
        &self,
        decl: &ResourceDeclaration,
        declared: &BTreeSet<&str>,
    ) -> StratumResult<()> {
        if let Some(missing) = decl
            .depends_on
            .iter()
            .find(|dep| !declared.contains(dep.as_str()))
        {
            return Err(StratumError::UnknownDependency {
                layer: self.name.clone(),
                declaration: decl.id.clone(),
                dependency: missing.clone(),
            });
        }
        if let Some(reference) = decl
            .upstream_refs()
            .into_iter()
            .find(|reference| !self.upstream.contains(&reference.layer))
        {
            return Err(StratumError::invalid_topology(format!(
                "declaration '{}' in layer '{}' reads '{reference}' but '{}' is not an upstream layer",
                decl.id, self.name, reference.layer
            )));
        }
        Ok(())
    }
}
