//! Named artifact store shared between the host and the sandbox.
//!
//! The store is a flat mapping of artifact names to payloads, persisted as a
//! single JSON file. The same file is uploaded into the sandbox before code
//! runs and downloaded again afterwards, so every write goes through a
//! temp-file-then-rename to keep readers from seeing a half-written file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Format tag written into every artifact file.
pub const ARTIFACT_FORMAT: &str = "code-act-artifacts";

/// Current artifact file version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Default artifact file name inside the workspace.
pub const DEFAULT_ARTIFACT_FILE: &str = "artifacts.json";

/// Contents stored under an artifact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArtifactPayload {
    /// Raw bytes written by the host or by sandboxed code.
    Bytes { data: Vec<u8> },
    /// A name that is reserved but carries no data yet (e.g. uploaded media).
    Placeholder,
}

impl ArtifactPayload {
    /// Returns the payload bytes, if any.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ArtifactPayload::Bytes { data } => Some(data),
            ArtifactPayload::Placeholder => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            ArtifactPayload::Bytes { data } => format!("{} bytes", data.len()),
            ArtifactPayload::Placeholder => "placeholder".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ArtifactFileRef<'a> {
    format: &'static str,
    version: u32,
    count: usize,
    artifacts: &'a BTreeMap<String, ArtifactPayload>,
}

#[derive(Deserialize)]
struct ArtifactFile {
    format: String,
    version: u32,
    count: usize,
    artifacts: BTreeMap<String, ArtifactPayload>,
}

/// Registry of named artifacts with a canonical save path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    save_path: PathBuf,
    artifacts: BTreeMap<String, ArtifactPayload>,
}

impl ArtifactStore {
    /// Creates an empty store that saves to `save_path`.
    pub fn new(save_path: impl Into<PathBuf>) -> Self {
        Self {
            save_path: save_path.into(),
            artifacts: BTreeMap::new(),
        }
    }

    /// Opens the store at `save_path`, loading it if the file exists and
    /// creating an empty file otherwise.
    pub fn open(save_path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(save_path);
        if store.save_path.exists() {
            let path = store.save_path.clone();
            store.load(&path)?;
        } else {
            store.save()?;
        }
        Ok(store)
    }

    /// Returns the canonical save path.
    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    /// Replaces the in-memory mapping with the contents of `path`.
    ///
    /// On any read or decode failure the current mapping is left untouched.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let raw = fs::read(path).map_err(|e| Error::storage(path, e))?;
        let artifacts = decode(&raw).map_err(|reason| Error::storage(path, reason))?;

        tracing::debug!(path = ?path, count = artifacts.len(), "loaded artifacts");
        self.artifacts = artifacts;
        Ok(())
    }

    /// Saves to the canonical save path.
    pub fn save(&self) -> Result<()> {
        let path = self.save_path.clone();
        self.save_to(&path)
    }

    /// Atomically writes the store to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let encoded = serde_json::to_vec(&ArtifactFileRef {
            format: ARTIFACT_FORMAT,
            version: ARTIFACT_VERSION,
            count: self.artifacts.len(),
            artifacts: &self.artifacts,
        })
        .map_err(|e| Error::storage(path, format!("failed to encode artifacts: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::storage(path, e))?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::storage(path, "artifact path has no file name"))?;
        let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let write_tmp = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()
        };
        if let Err(e) = write_tmp().and_then(|_| fs::rename(&tmp_path, path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::storage(path, e));
        }

        tracing::debug!(path = ?path, count = self.artifacts.len(), "saved artifacts");
        Ok(())
    }

    /// Summarizes the store for the model: names and sizes, never contents.
    pub fn show(&self) -> String {
        let mut out = String::from("Artifacts loaded:\n");
        if self.artifacts.is_empty() {
            out.push_str("(none)\n");
        }
        for (name, payload) in &self.artifacts {
            out.push_str(&format!("Artifact {} ({})\n", name, payload.describe()));
        }
        out
    }

    /// Stores `data` under `name`, returning the previous payload.
    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) -> Option<ArtifactPayload> {
        self.artifacts
            .insert(name.into(), ArtifactPayload::Bytes { data })
    }

    /// Reserves `name` without data. An existing payload is kept.
    pub fn insert_placeholder(&mut self, name: impl Into<String>) {
        self.artifacts
            .entry(name.into())
            .or_insert(ArtifactPayload::Placeholder);
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactPayload> {
        self.artifacts.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ArtifactPayload> {
        self.artifacts.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }

    /// Artifact names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

fn decode(raw: &[u8]) -> std::result::Result<BTreeMap<String, ArtifactPayload>, String> {
    let file: ArtifactFile =
        serde_json::from_slice(raw).map_err(|e| format!("corrupt artifact file: {}", e))?;

    if file.format != ARTIFACT_FORMAT {
        return Err(format!("unexpected artifact format '{}'", file.format));
    }
    if file.version != ARTIFACT_VERSION {
        return Err(format!("unsupported artifact version {}", file.version));
    }
    if file.count != file.artifacts.len() {
        return Err(format!(
            "artifact count mismatch: header says {}, found {}",
            file.count,
            file.artifacts.len()
        ));
    }

    Ok(file.artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_store(dir: &TempDir) -> ArtifactStore {
        let mut store = ArtifactStore::new(dir.path().join("artifacts.json"));
        store.insert("result.txt", b"3 dogs".to_vec());
        store.insert_placeholder("dog.jpg");
        store
    }

    #[test]
    fn show_lists_names_without_contents() {
        let dir = TempDir::new().unwrap();
        let store = sample_store(&dir);

        let shown = store.show();
        assert_eq!(
            shown,
            "Artifacts loaded:\nArtifact dog.jpg (placeholder)\nArtifact result.txt (6 bytes)\n"
        );
        assert!(!shown.contains("3 dogs"));
    }

    #[test]
    fn show_on_empty_store() {
        let store = ArtifactStore::new("unused.json");
        assert_eq!(store.show(), "Artifacts loaded:\n(none)\n");
    }

    #[test]
    fn save_then_load_preserves_show_output() {
        let dir = TempDir::new().unwrap();
        let store = sample_store(&dir);
        store.save().unwrap();

        let mut fresh = ArtifactStore::new(dir.path().join("other.json"));
        fresh.load(store.save_path()).unwrap();

        assert_eq!(fresh.show(), store.show());
        assert_eq!(
            fresh.get("result.txt").and_then(ArtifactPayload::as_bytes),
            Some(&b"3 dogs"[..])
        );
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let dir = TempDir::new().unwrap();
        let store = sample_store(&dir);
        store.save().unwrap();
        store.save().unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested/deeper/artifacts.json"));
        store.save().unwrap();
        assert!(store.save_path().exists());
    }

    #[test]
    fn load_truncated_file_keeps_prior_mapping() {
        let dir = TempDir::new().unwrap();
        let store = sample_store(&dir);
        store.save().unwrap();

        let full = fs::read(store.save_path()).unwrap();
        let truncated_path = dir.path().join("truncated.json");
        fs::write(&truncated_path, &full[..full.len() / 2]).unwrap();

        let mut target = ArtifactStore::new(dir.path().join("target.json"));
        target.insert("keep.bin", vec![1, 2, 3]);
        let before = target.clone();

        let err = target.load(&truncated_path).unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
        assert_eq!(target, before);
    }

    #[test]
    fn load_missing_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let mut store = ArtifactStore::new(dir.path().join("a.json"));
        let err = store.load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
    }

    #[test]
    fn load_rejects_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"format":"code-act-artifacts","version":1,"count":2,"artifacts":{"a":{"kind":"placeholder"}}}"#,
        )
        .unwrap();

        let mut store = ArtifactStore::new(dir.path().join("a.json"));
        let err = store.load(&path).unwrap_err();
        assert!(err.to_string().contains("count mismatch"));
    }

    #[test]
    fn load_rejects_foreign_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"format":"pickle","version":1,"count":0,"artifacts":{}}"#,
        )
        .unwrap();

        let mut store = ArtifactStore::new(dir.path().join("a.json"));
        assert!(store.load(&path).is_err());
    }

    #[test]
    fn placeholder_does_not_overwrite_existing_payload() {
        let mut store = ArtifactStore::new("unused.json");
        store.insert("dog.jpg", vec![0xff, 0xd8]);
        store.insert_placeholder("dog.jpg");

        assert_eq!(
            store.get("dog.jpg"),
            Some(&ArtifactPayload::Bytes {
                data: vec![0xff, 0xd8]
            })
        );
    }

    #[test]
    fn open_creates_file_when_missing_and_loads_when_present() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifacts.json");

        let mut store = ArtifactStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.is_empty());

        store.insert("notes.md", b"# notes".to_vec());
        store.save().unwrap();

        let reopened = ArtifactStore::open(&path).unwrap();
        assert_eq!(reopened.names().collect::<Vec<_>>(), vec!["notes.md"]);
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let json = serde_json::to_string(&ArtifactPayload::Placeholder).unwrap();
        assert_eq!(json, r#"{"kind":"placeholder"}"#);

        let json = serde_json::to_string(&ArtifactPayload::Bytes { data: vec![1, 2] }).unwrap();
        assert_eq!(json, r#"{"kind":"bytes","data":[1,2]}"#);
    }
}
