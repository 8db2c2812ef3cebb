//! Wiring of settings to on-disk stores and the local backend.

use std::sync::Arc;

use camino::Utf8Path;
use stratum::{
    BootstrapGate, FileStateStore, LocalBackend, Orchestrator, Resolver, StateStores, Topology,
};
use tracing::debug;

use crate::error::Result;
use crate::settings::Settings;

/// A validated topology with one file store per layer.
#[derive(Debug)]
pub struct Workspace {
    settings: Settings,
    topology: Topology,
    stores: StateStores,
    backend: LocalBackend,
}

impl Workspace {
    /// Validate `settings` and open every layer's store and the backend.
    ///
    /// # Errors
    ///
    /// Returns topology validation failures, unreachable store locations, or
    /// a backend directory that cannot be created.
    pub fn open(settings: Settings) -> Result<Self> {
        let topology = settings.topology()?;
        let mut stores = StateStores::new();
        for layer in topology.layers() {
            let path = settings.state_root.join(layer.state_location());
            debug!(layer = %layer.name, state = %path, "opening state store");
            stores.insert(layer.name.clone(), Arc::new(FileStateStore::open(&path)?));
        }
        let backend = LocalBackend::open(&settings.backend_root)?;
        Ok(Self {
            settings,
            topology,
            stores,
            backend,
        })
    }

    /// Merged settings the workspace was opened with.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The validated topology.
    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Store registry keyed by layer name.
    #[must_use]
    pub const fn stores(&self) -> &StateStores {
        &self.stores
    }

    /// Directory of the local backend.
    #[must_use]
    pub fn backend_root(&self) -> &Utf8Path {
        self.backend.root()
    }

    /// Start a plan or apply run for `layer`.
    ///
    /// # Errors
    ///
    /// Returns [`stratum::StratumError::UnknownLayer`] for names outside the
    /// topology.
    pub fn orchestrator(&self, layer: &str) -> Result<Orchestrator<'_>> {
        Ok(Orchestrator::new(
            &self.topology,
            &self.stores,
            &self.backend,
            layer,
        )?)
    }

    /// Gate guarding confirmed applies.
    #[must_use]
    pub const fn gate(&self) -> BootstrapGate<'_> {
        BootstrapGate::new(&self.topology, &self.stores)
    }

    /// Resolver for layer outputs.
    #[must_use]
    pub const fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.topology, &self.stores)
    }
}
