//! State store persisted as a single JSON blob on the local filesystem.
//!
//! The blob holds `{version, entries}`. Writers serialise through a sibling
//! `.lock` file created with `create_new`, re-check the version under the
//! lock, write a temporary file, sync it and rename it over the blob, so a
//! reader never observes a partially written state.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::{Dir, OpenOptions};
use tracing::debug;

use super::{PersistedState, StateEntry, StateReader, StateSnapshot, StateStore};
use crate::error::{StratumError, StratumResult};

const LOCK_ATTEMPTS: u32 = 250;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(20);

/// State store backed by one JSON file.
#[derive(Debug)]
pub struct FileStateStore {
    dir: Dir,
    file_name: String,
    location: String,
}

impl FileStateStore {
    /// Open (and create the parent directory of) the store at `path`.
    ///
    /// The blob itself is only created by the first successful write.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::StoreUnavailable`] when the parent directory
    /// cannot be created or opened.
    pub fn open(path: &Utf8Path) -> StratumResult<Self> {
        let location = path.to_string();
        let file_name = path
            .file_name()
            .ok_or_else(|| {
                StratumError::store_unavailable(location.clone(), "state path has no file name")
            })?
            .to_owned();
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        Dir::create_ambient_dir_all(&parent, ambient_authority())
            .map_err(|err| StratumError::store_unavailable(location.clone(), err))?;
        let dir = Dir::open_ambient_dir(&parent, ambient_authority())
            .map_err(|err| StratumError::store_unavailable(location.clone(), err))?;
        Ok(Self {
            dir,
            file_name,
            location,
        })
    }

    fn unavailable(&self, err: std::io::Error) -> StratumError {
        StratumError::store_unavailable(self.location.clone(), err)
    }

    fn lock_name(&self) -> String {
        format!("{}.lock", self.file_name)
    }

    fn acquire_lock(&self) -> StratumResult<LockGuard<'_>> {
        let name = self.lock_name();
        for _ in 0..LOCK_ATTEMPTS {
            match self
                .dir
                .open_with(&name, OpenOptions::new().write(true).create_new(true))
            {
                Ok(_) => {
                    return Ok(LockGuard {
                        dir: &self.dir,
                        name,
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(err) => return Err(self.unavailable(err)),
            }
        }
        Err(StratumError::store_unavailable(
            self.location.clone(),
            format!("lock '{name}' is held; remove it if no apply is running"),
        ))
    }

    fn write_blob(&self, state: &PersistedState) -> StratumResult<()> {
        let body = serde_json::to_vec_pretty(state)
            .map_err(|err| StratumError::corrupt_state(self.location.clone(), err.to_string()))?;
        let tmp_name = format!("{}.tmp", self.file_name);
        let mut file = self
            .dir
            .open_with(
                &tmp_name,
                OpenOptions::new().write(true).create(true).truncate(true),
            )
            .map_err(|err| self.unavailable(err))?;
        file.write_all(&body).map_err(|err| self.unavailable(err))?;
        file.sync_all().map_err(|err| self.unavailable(err))?;
        self.dir
            .rename(&tmp_name, &self.dir, &self.file_name)
            .map_err(|err| self.unavailable(err))
    }
}

impl StateReader for FileStateStore {
    fn location(&self) -> &str {
        &self.location
    }

    fn load(&self) -> StratumResult<StateSnapshot> {
        let raw = match self.dir.read_to_string(&self.file_name) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StateSnapshot::default()),
            Err(err) => return Err(self.unavailable(err)),
        };
        let persisted: PersistedState = serde_json::from_str(&raw)
            .map_err(|err| StratumError::corrupt_state(self.location.clone(), err.to_string()))?;
        Ok(persisted.into())
    }
}

impl StateStore for FileStateStore {
    fn compare_and_swap(
        &self,
        expected_version: u64,
        entries: BTreeMap<String, StateEntry>,
    ) -> StratumResult<u64> {
        let _lock = self.acquire_lock()?;
        let current = self.load()?;
        if current.version != expected_version {
            return Err(StratumError::ConcurrentModification {
                location: self.location.clone(),
                expected: expected_version,
                actual: current.version,
            });
        }
        let next = expected_version.saturating_add(1);
        self.write_blob(&PersistedState::new(next, entries))?;
        debug!(location = %self.location, version = next, "state committed");
        Ok(next)
    }
}

/// Removes the lock file when dropped.
struct LockGuard<'a> {
    dir: &'a Dir,
    name: String,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // Best effort; a leftover lock is reported by the next writer.
        let _unused = self.dir.remove_file(&self.name);
    }
}

#[cfg(test)]
mod tests {
    //! Filesystem-backed store tests.

    use super::*;
    use crate::backend::ProviderHandle;
    use crate::declaration::ResourceDeclaration;
    use chrono::Utc;
    use rstest::rstest;

    fn store_in(dir: &tempfile::TempDir) -> FileStateStore {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        FileStateStore::open(&root.join("layers").join("deploy.json")).expect("open store")
    }

    fn entries(id: &str) -> BTreeMap<String, StateEntry> {
        let decl = ResourceDeclaration::new("bucket", id).with_attribute("location", "eu");
        let entry = StateEntry::applied(
            &decl,
            ProviderHandle::new(format!("local:bucket/{id}")),
            decl.attributes.clone(),
            Utc::now(),
        );
        BTreeMap::from([(id.to_owned(), entry)])
    }

    #[rstest]
    fn missing_blob_loads_as_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let snapshot = store_in(&dir).load().expect("load");
        assert_eq!(snapshot, StateSnapshot::default());
    }

    #[rstest]
    fn committed_entries_survive_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let version = store_in(&dir)
            .compare_and_swap(0, entries("assets"))
            .expect("first commit");
        assert_eq!(version, 1);

        let reopened = store_in(&dir).load().expect("reload");
        assert_eq!(reopened.version, 1);
        assert!(reopened.get("assets").is_some());
    }

    #[rstest]
    fn stale_version_is_rejected_and_blob_untouched() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir);
        store.compare_and_swap(0, entries("assets")).expect("first commit");

        let err = store
            .compare_and_swap(0, entries("logs"))
            .expect_err("stale writer must lose");
        assert!(matches!(
            err,
            StratumError::ConcurrentModification {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        let snapshot = store.load().expect("reload");
        assert!(snapshot.get("logs").is_none());
        assert!(snapshot.get("assets").is_some());
    }

    #[rstest]
    fn lock_is_released_after_commit() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir);
        store.compare_and_swap(0, entries("assets")).expect("first commit");
        store.compare_and_swap(1, entries("logs")).expect("second commit");
        assert!(!store.dir.exists(store.lock_name()));
    }

    #[rstest]
    fn garbage_blob_is_reported_as_corrupt() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = store_in(&dir);
        store
            .dir
            .write(&store.file_name, "not json")
            .expect("write garbage");
        assert!(matches!(
            store.load(),
            Err(StratumError::CorruptState { .. })
        ));
    }
}
