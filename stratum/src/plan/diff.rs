//! Attribute comparison between a declaration and its state entry.

use std::collections::BTreeSet;

use crate::declaration::{Attributes, ResourceDeclaration};
use crate::state::StateEntry;

/// List what differs between `desired` and `current`.
///
/// A desired attribute differs when it was applied with another value, or
/// when `observed` reports a different value for the same key. Keys only the
/// provider reports are ignored. Keys that were applied but are no longer
/// declared count as changed.
pub(super) fn changed_fields(
    desired: &ResourceDeclaration,
    current: &StateEntry,
    observed: &Attributes,
) -> Vec<String> {
    let mut changed = BTreeSet::new();
    for (key, value) in &desired.attributes {
        let applied_differs = current.applied_attributes.get(key) != Some(value);
        let drifted = observed.get(key).is_some_and(|live| live != value);
        if applied_differs || drifted {
            changed.insert(key.clone());
        }
    }
    for key in current.applied_attributes.keys() {
        if !desired.attributes.contains_key(key) {
            changed.insert(key.clone());
        }
    }
    if desired.kind != current.kind {
        changed.insert("kind".to_owned());
    }
    if desired.depends_on != current.depends_on {
        changed.insert("depends_on".to_owned());
    }
    if desired.prevent_destroy != current.prevent_destroy {
        changed.insert("prevent_destroy".to_owned());
    }
    changed.into_iter().collect()
}
