//! Backend that materialises resources as JSON documents on disk.
//!
//! Each resource lives at `<root>/<kind>/<id>.json`. The backend is used by
//! the command-line tool so that plans and applies can be exercised without a
//! cloud account, and it doubles as a reference for real providers.

use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ProviderError, ProviderHandle, ProvisioningBackend, check_metadata_keys};
use crate::declaration::{Attributes, ResourceDeclaration};

const HANDLE_PREFIX: &str = "local:";

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    kind: String,
    id: String,
    generation: u64,
    attributes: Attributes,
}

/// Filesystem-backed provisioning backend.
#[derive(Debug)]
pub struct LocalBackend {
    root: Utf8PathBuf,
    dir: Dir,
}

impl LocalBackend {
    /// Open (creating if needed) the backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Io`] when the directory cannot be created.
    pub fn open(root: &Utf8Path) -> Result<Self, ProviderError> {
        Dir::create_ambient_dir_all(root, ambient_authority())
            .map_err(|err| ProviderError::io(root, err))?;
        let dir = Dir::open_ambient_dir(root, ambient_authority())
            .map_err(|err| ProviderError::io(root, err))?;
        Ok(Self {
            root: root.to_path_buf(),
            dir,
        })
    }

    /// Root directory of the backend.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn relative_path(kind: &str, id: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(kind).join(format!("{id}.json"))
    }

    fn path_for(&self, handle: &ProviderHandle) -> Result<Utf8PathBuf, ProviderError> {
        let rest = handle
            .as_str()
            .strip_prefix(HANDLE_PREFIX)
            .ok_or_else(|| ProviderError::malformed(format!("foreign handle '{handle}'")))?;
        let (kind, id) = rest
            .split_once('/')
            .ok_or_else(|| ProviderError::malformed(format!("malformed handle '{handle}'")))?;
        check_segment(kind)?;
        check_segment(id)?;
        Ok(Self::relative_path(kind, id))
    }

    fn read_document(&self, path: &Utf8Path) -> Result<Option<Document>, ProviderError> {
        let raw = match self.dir.read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ProviderError::io(self.root.join(path), err)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| ProviderError::malformed(format!("{}: {err}", self.root.join(path))))
    }
}

impl ProvisioningBackend for LocalBackend {
    fn create_or_update(
        &self,
        declaration: &ResourceDeclaration,
        existing: Option<&ProviderHandle>,
    ) -> Result<ProviderHandle, ProviderError> {
        check_segment(&declaration.kind)?;
        check_segment(&declaration.id)?;
        check_metadata_keys(declaration)?;
        let path = Self::relative_path(&declaration.kind, &declaration.id);
        let handle = ProviderHandle::new(format!(
            "{HANDLE_PREFIX}{}/{}",
            declaration.kind, declaration.id
        ));

        let mut generation = 1;
        if let Some(previous) = existing {
            let previous_path = self.path_for(previous)?;
            let document = self
                .read_document(&previous_path)?
                .ok_or_else(|| ProviderError::NotFound(previous.clone()))?;
            generation = document.generation.saturating_add(1);
            if previous_path != path {
                self.dir
                    .remove_file(&previous_path)
                    .map_err(|err| ProviderError::io(self.root.join(&previous_path), err))?;
            }
        }

        let document = Document {
            kind: declaration.kind.clone(),
            id: declaration.id.clone(),
            generation,
            attributes: declaration.attributes.clone(),
        };
        let body = serde_json::to_vec_pretty(&document)
            .map_err(|err| ProviderError::malformed(err.to_string()))?;
        self.dir
            .create_dir_all(&declaration.kind)
            .map_err(|err| ProviderError::io(self.root.join(&declaration.kind), err))?;
        self.dir
            .write(&path, body)
            .map_err(|err| ProviderError::io(self.root.join(&path), err))?;
        debug!(handle = %handle, generation, "resource written");
        Ok(handle)
    }

    fn delete(&self, handle: &ProviderHandle) -> Result<(), ProviderError> {
        let path = self.path_for(handle)?;
        match self.dir.remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ProviderError::NotFound(handle.clone()))
            }
            Err(err) => Err(ProviderError::io(self.root.join(&path), err)),
        }
    }

    fn describe(&self, handle: &ProviderHandle) -> Result<Option<Attributes>, ProviderError> {
        let path = self.path_for(handle)?;
        Ok(self.read_document(&path)?.map(|document| {
            let mut observed = document.attributes;
            observed.insert(
                "self_link".to_owned(),
                Value::String(handle.as_str().to_owned()),
            );
            observed.insert("generation".to_owned(), Value::from(document.generation));
            observed
        }))
    }
}

/// Reject names that could escape the backend root.
fn check_segment(segment: &str) -> Result<(), ProviderError> {
    let valid = !segment.is_empty()
        && !segment.starts_with('.')
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ProviderError::rejected(format!(
            "'{segment}' is not a valid local resource name"
        )))
    }
}

#[cfg(test)]
mod tests {
    //! Round trips through the filesystem backend.

    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use tempfile::TempDir;

    #[fixture]
    fn backend() -> (TempDir, LocalBackend) {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().join("resources")).expect("utf-8 path");
        let backend = LocalBackend::open(&root).expect("open backend");
        (dir, backend)
    }

    fn bucket(location: &str) -> ResourceDeclaration {
        ResourceDeclaration::new("bucket", "assets").with_attribute("location", location)
    }

    #[rstest]
    fn writes_documents_and_bumps_generation(backend: (TempDir, LocalBackend)) {
        let (_dir, backend) = backend;
        let handle = backend.create_or_update(&bucket("eu"), None).expect("create");
        assert_eq!(handle.as_str(), "local:bucket/assets");

        let updated = backend
            .create_or_update(&bucket("us"), Some(&handle))
            .expect("update");
        let observed = backend.describe(&updated).expect("describe").expect("exists");
        assert_eq!(observed.get("location"), Some(&json!("us")));
        assert_eq!(observed.get("generation"), Some(&json!(2)));
        assert_eq!(observed.get("self_link"), Some(&json!("local:bucket/assets")));
    }

    #[rstest]
    fn delete_removes_the_document(backend: (TempDir, LocalBackend)) {
        let (_dir, backend) = backend;
        let handle = backend.create_or_update(&bucket("eu"), None).expect("create");
        backend.delete(&handle).expect("delete");
        assert_eq!(backend.describe(&handle).expect("describe"), None);
        assert!(matches!(
            backend.delete(&handle),
            Err(ProviderError::NotFound(_))
        ));
    }

    #[rstest]
    #[case("../escape")]
    #[case(".hidden")]
    #[case("")]
    fn rejects_unsafe_names(backend: (TempDir, LocalBackend), #[case] id: &str) {
        let (_dir, backend) = backend;
        let decl = ResourceDeclaration::new("bucket", id);
        assert!(matches!(
            backend.create_or_update(&decl, None),
            Err(ProviderError::Rejected { .. })
        ));
    }

    #[rstest]
    #[case("generation")]
    #[case("self_link")]
    fn rejects_declared_metadata_keys(backend: (TempDir, LocalBackend), #[case] key: &str) {
        let (dir, backend) = backend;
        let decl = ResourceDeclaration::new("bucket", "logs").with_attribute(key, 7);
        assert!(matches!(
            backend.create_or_update(&decl, None),
            Err(ProviderError::Rejected { message }) if message.contains(key)
        ));
        assert!(!dir.path().join("resources/bucket/logs.json").exists());
    }

    #[rstest]
    fn rejects_foreign_handles(backend: (TempDir, LocalBackend)) {
        let (_dir, backend) = backend;
        let handle = ProviderHandle::new("mem://bucket/assets");
        assert!(matches!(
            backend.describe(&handle),
            Err(ProviderError::Malformed { .. })
        ));
    }
}
