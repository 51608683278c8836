use super::backend::{BackendKind, StorageBackend};
use crate::error::{CwriterError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Namespace key the whole document map lives under.
pub const KV_NAMESPACE: &str = "cwriter_filesystem_fallback";

type Snapshot = BTreeMap<String, BTreeMap<String, String>>;

/// Key-value storage backend.
///
/// Every document is one entry of a single map from logical path to document
/// text. There is no directory tree: `mkdir` does nothing and `list_dir` can't
/// enumerate. A directory "exists" when any key lives under it.
///
/// Without a snapshot path the map is purely in memory, which is also what
/// the test suites run on. With one, the full map is rewritten to that file
/// after every mutation.
pub struct KvBackend {
    entries: RwLock<BTreeMap<String, String>>,
    snapshot: Option<PathBuf>,
    simulate_write_error: AtomicBool,
}

impl Default for KvBackend {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            snapshot: None,
            simulate_write_error: AtomicBool::new(false),
        }
    }
}

impl KvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a persisted map. A missing snapshot starts empty. An unreadable
    /// or corrupt one is renamed to `<name>.corrupt` and the map starts empty.
    pub fn open(snapshot: impl Into<PathBuf>) -> Self {
        let snapshot = snapshot.into();
        let entries = load_snapshot(&snapshot);
        tracing::debug!(path = %snapshot.display(), entries = entries.len(), "opened kv snapshot");
        Self {
            entries: RwLock::new(entries),
            snapshot: Some(snapshot),
            simulate_write_error: AtomicBool::new(false),
        }
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }

    /// Every stored key, in order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Test helper to plant raw text under a key, bypassing validation.
    pub fn insert_raw(&self, path: &str, text: &str) {
        self.entries
            .write()
            .insert(path.to_string(), text.to_string());
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let mut snapshot = Snapshot::new();
        snapshot.insert(KV_NAMESPACE.to_string(), entries.clone());
        let content = serde_json::to_string_pretty(&snapshot)?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| CwriterError::io(dir.display().to_string(), e))?;
        let tmp = dir.join(format!(".kv-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, content).map_err(|e| CwriterError::io(tmp.display().to_string(), e))?;
        fs::rename(&tmp, path).map_err(|e| CwriterError::io(path.display().to_string(), e))?;
        Ok(())
    }

    fn persist_quietly(&self, entries: &BTreeMap<String, String>) {
        if let Err(e) = self.persist(entries) {
            tracing::warn!(error = %e, "failed to persist kv snapshot");
        }
    }
}

fn load_snapshot(path: &Path) -> BTreeMap<String, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read kv snapshot");
            set_aside(path);
            return BTreeMap::new();
        }
    };
    match serde_json::from_str::<Snapshot>(&content) {
        Ok(mut snapshot) => snapshot.remove(KV_NAMESPACE).unwrap_or_default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt kv snapshot, starting empty");
            set_aside(path);
            BTreeMap::new()
        }
    }
}

/// Where a bad snapshot is moved so the next persist can't overwrite it.
fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

fn set_aside(path: &Path) {
    let target = corrupt_path(path);
    match fs::rename(path, &target) {
        Ok(()) => tracing::warn!(path = %target.display(), "moved bad kv snapshot aside"),
        Err(e) => tracing::error!(path = %path.display(), error = %e, "cannot move bad kv snapshot aside"),
    }
}

fn is_under(key: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    key.strip_prefix(dir)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[async_trait]
impl StorageBackend for KvBackend {
    async fn mkdir(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        if self.simulate_write_error.load(Ordering::SeqCst) {
            return Err(CwriterError::io(
                path,
                io::Error::new(io::ErrorKind::Other, "Simulated write error"),
            ));
        }
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| CwriterError::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let mut entries = self.entries.write();
        entries.insert(path.to_string(), text);
        self.persist(&entries)
    }

    async fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read();
        let found = entries.get(path).map(|text| text.as_bytes().to_vec());
        if found.is_none() {
            tracing::debug!(path, "kv key not found");
        }
        found
    }

    async fn delete_file(&self, path: &str) -> bool {
        let mut entries = self.entries.write();
        let removed = entries.remove(path).is_some();
        if removed {
            self.persist_quietly(&entries);
        }
        removed
    }

    async fn delete_dir(&self, path: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| key != path && !is_under(key, path));
        let removed = entries.len() != before;
        if removed {
            self.persist_quietly(&entries);
        }
        removed
    }

    async fn list_dir(&self, _path: &str) -> Vec<String> {
        Vec::new()
    }

    async fn exists(&self, path: &str) -> bool {
        let entries = self.entries.read();
        entries.contains_key(path) || entries.keys().any(|key| is_under(key, path))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::KvFallback
    }

    fn supports_listing(&self) -> bool {
        false
    }
}
