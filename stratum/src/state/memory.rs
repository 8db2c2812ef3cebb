//! In-process state store used by tests and embedded callers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{StateEntry, StateReader, StateSnapshot, StateStore};
use crate::error::{StratumError, StratumResult};

/// State store held in memory behind a mutex.
///
/// The store can be taken offline to exercise
/// [`StratumError::StoreUnavailable`] handling.
#[derive(Debug)]
pub struct MemoryStateStore {
    location: String,
    snapshot: Mutex<StateSnapshot>,
    offline: AtomicBool,
}

impl MemoryStateStore {
    /// Create an empty store identified by `location`.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self::with_snapshot(location, StateSnapshot::default())
    }

    /// Create a store seeded with `snapshot`.
    #[must_use]
    pub fn with_snapshot(location: impl Into<String>, snapshot: StateSnapshot) -> Self {
        Self {
            location: location.into(),
            snapshot: Mutex::new(snapshot),
            offline: AtomicBool::new(false),
        }
    }

    /// Return a copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.snapshot.lock().clone()
    }

    /// Make every subsequent operation fail with `StoreUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> StratumResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StratumError::store_unavailable(
                self.location.clone(),
                "store is offline",
            ));
        }
        Ok(())
    }
}

impl StateReader for MemoryStateStore {
    fn location(&self) -> &str {
        &self.location
    }

    fn load(&self) -> StratumResult<StateSnapshot> {
        self.ensure_online()?;
        Ok(self.snapshot())
    }
}

impl StateStore for MemoryStateStore {
    fn compare_and_swap(
        &self,
        expected_version: u64,
        entries: BTreeMap<String, StateEntry>,
    ) -> StratumResult<u64> {
        self.ensure_online()?;
        let mut current = self.snapshot.lock();
        if current.version != expected_version {
            return Err(StratumError::ConcurrentModification {
                location: self.location.clone(),
                expected: expected_version,
                actual: current.version,
            });
        }
        current.version = expected_version.saturating_add(1);
        current.entries = entries;
        Ok(current.version)
    }
}
