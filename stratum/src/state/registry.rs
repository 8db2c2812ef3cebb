//! Lookup of state stores by layer name.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{StratumError, StratumResult};

use super::StateStore;

/// The set of stores for a topology, one per layer.
///
/// Cloning is cheap; stores are shared behind [`Arc`].
#[derive(Clone, Default)]
pub struct StateStores {
    stores: BTreeMap<String, Arc<dyn StateStore>>,
}

impl StateStores {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` for `layer`, replacing any previous registration.
    pub fn insert(&mut self, layer: impl Into<String>, store: Arc<dyn StateStore>) {
        self.stores.insert(layer.into(), store);
    }

    /// Builder-style variant of [`StateStores::insert`].
    #[must_use]
    pub fn with(mut self, layer: impl Into<String>, store: Arc<dyn StateStore>) -> Self {
        self.insert(layer, store);
        self
    }

    /// Returns the store registered for `layer`.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::UnknownLayer`] when no store is registered.
    pub fn get(&self, layer: &str) -> StratumResult<&dyn StateStore> {
        self.stores
            .get(layer)
            .map(|store| &**store)
            .ok_or_else(|| StratumError::UnknownLayer(layer.to_owned()))
    }

    /// Layer names with a registered store, in ascending order.
    pub fn layers(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for StateStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.stores
                    .iter()
                    .map(|(layer, store)| (layer, store.location())),
            )
            .finish()
    }
}
