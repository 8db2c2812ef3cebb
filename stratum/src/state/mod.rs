//! Persisted state: entries linking declarations to provider identities.
//!
//! Each layer owns exactly one [`StateStore`]. Stores are versioned and the
//! only mutation path is [`StateStore::compare_and_swap`], which guarantees
//! that at most one concurrent writer per layer succeeds. Readers from other
//! layers only need [`StateReader`].

mod file;
mod memory;
mod registry;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::ProviderHandle;
use crate::declaration::{Attributes, ResourceDeclaration};
use crate::error::StratumResult;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use registry::StateStores;

/// Declaration id reserved for the completion marker entry.
pub const COMPLETION_MARKER_ID: &str = "@completion";

/// Returns `true` for ids reserved for bookkeeping entries.
///
/// Every id starting with `@` is reserved.
#[must_use]
pub fn is_reserved_id(id: &str) -> bool {
    id.starts_with('@')
}

/// What a state entry records.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRole {
    /// A provisioned resource.
    #[default]
    Resource,
    /// The marker written by a layer's last successful apply.
    CompletionMarker,
}

/// Persisted record linking a declaration to its provider-side identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Declaration this entry belongs to.
    pub declaration_id: String,
    /// Whether this is a resource or a bookkeeping marker.
    #[serde(default)]
    pub role: EntryRole,
    /// Resource type tag at the time of the last apply.
    #[serde(default)]
    pub kind: String,
    /// Handle assigned by the provisioning backend.
    pub provider_id: ProviderHandle,
    /// Attributes reported by the backend after the last apply or refresh.
    #[serde(default)]
    pub observed_attributes: Attributes,
    /// Resolved desired attributes sent to the backend on the last apply.
    #[serde(default)]
    pub applied_attributes: Attributes,
    /// Dependencies recorded at the last apply, used to order deletions.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
    /// Protection flag recorded at the last apply.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub prevent_destroy: bool,
    /// When the entry was last written.
    pub last_applied_at: DateTime<Utc>,
}

impl StateEntry {
    /// Record a successful create or update of `declaration`.
    #[must_use]
    pub fn applied(
        declaration: &ResourceDeclaration,
        provider_id: ProviderHandle,
        observed_attributes: Attributes,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            declaration_id: declaration.id.clone(),
            role: EntryRole::Resource,
            kind: declaration.kind.clone(),
            provider_id,
            observed_attributes,
            applied_attributes: declaration.attributes.clone(),
            depends_on: declaration.depends_on.clone(),
            prevent_destroy: declaration.prevent_destroy,
            last_applied_at: at,
        }
    }

    /// Returns `true` for the completion marker entry.
    #[must_use]
    pub fn is_completion_marker(&self) -> bool {
        self.role == EntryRole::CompletionMarker
    }
}

/// Completion marker written by a layer's last successful apply.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CompletionMarker {
    /// When the apply finished.
    pub completed_at: DateTime<Utc>,
    /// Release label of the topology that was applied.
    pub version: String,
}

impl CompletionMarker {
    /// Read a marker back from its state entry.
    #[must_use]
    pub fn from_entry(entry: &StateEntry) -> Option<Self> {
        if !entry.is_completion_marker() {
            return None;
        }
        let completed_at = entry
            .observed_attributes
            .get("completed_at")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())?
            .with_timezone(&Utc);
        let version = entry
            .observed_attributes
            .get("version")
            .and_then(Value::as_str)?
            .to_owned();
        Some(Self {
            completed_at,
            version,
        })
    }

    /// Encode the marker as a state entry.
    #[must_use]
    pub fn to_entry(&self) -> StateEntry {
        let mut attributes = Attributes::new();
        attributes.insert(
            "completed_at".to_owned(),
            Value::String(self.completed_at.to_rfc3339()),
        );
        attributes.insert("version".to_owned(), Value::String(self.version.clone()));
        StateEntry {
            declaration_id: COMPLETION_MARKER_ID.to_owned(),
            role: EntryRole::CompletionMarker,
            kind: "completion_marker".to_owned(),
            provider_id: ProviderHandle::new(COMPLETION_MARKER_ID),
            observed_attributes: attributes.clone(),
            applied_attributes: attributes,
            depends_on: BTreeSet::new(),
            prevent_destroy: false,
            last_applied_at: self.completed_at,
        }
    }
}

/// A versioned view of a store's entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Store version; `0` when nothing has been written yet.
    pub version: u64,
    /// Entries keyed by declaration id.
    pub entries: BTreeMap<String, StateEntry>,
}

impl StateSnapshot {
    /// Returns `true` when no entries, including markers, are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by declaration id.
    #[must_use]
    pub fn get(&self, declaration_id: &str) -> Option<&StateEntry> {
        self.entries.get(declaration_id)
    }

    /// Iterate resource entries, skipping bookkeeping markers.
    pub fn resources(&self) -> impl Iterator<Item = &StateEntry> {
        self.entries
            .values()
            .filter(|entry| !entry.is_completion_marker())
    }

    /// Returns the completion marker, if the layer has completed an apply.
    #[must_use]
    pub fn completion_marker(&self) -> Option<CompletionMarker> {
        self.entries
            .values()
            .find(|entry| entry.is_completion_marker())
            .and_then(CompletionMarker::from_entry)
    }
}

/// Read access to a layer's state.
pub trait StateReader: Send + Sync {
    /// Opaque locator of the backing storage, for diagnostics.
    fn location(&self) -> &str;

    /// Load the current entries and version.
    ///
    /// An empty snapshot with version `0` is returned when no state has
    /// been written yet.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StratumError::StoreUnavailable`] when the backing
    /// location cannot be reached, or [`crate::StratumError::CorruptState`]
    /// when the stored blob cannot be decoded.
    fn load(&self) -> StratumResult<StateSnapshot>;
}

/// Read and versioned write access to a layer's state.
pub trait StateStore: StateReader {
    /// Replace the stored entries if the store is still at `expected_version`.
    ///
    /// The new entries are durable before the new version is returned.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StratumError::ConcurrentModification`] when another
    /// writer moved the version on, and
    /// [`crate::StratumError::StoreUnavailable`] when the write fails.
    fn compare_and_swap(
        &self,
        expected_version: u64,
        entries: BTreeMap<String, StateEntry>,
    ) -> StratumResult<u64>;
}

/// On-disk representation shared by persistent stores.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    version: u64,
    entries: Vec<StateEntry>,
}

impl From<PersistedState> for StateSnapshot {
    fn from(persisted: PersistedState) -> Self {
        Self {
            version: persisted.version,
            entries: persisted
                .entries
                .into_iter()
                .map(|entry| (entry.declaration_id.clone(), entry))
                .collect(),
        }
    }
}

impl PersistedState {
    fn new(version: u64, entries: BTreeMap<String, StateEntry>) -> Self {
        Self {
            version,
            entries: entries.into_values().collect(),
        }
    }
}
