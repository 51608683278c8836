use crate::store::kv::KvBackend;
use crate::store::native_fs::NativeFsBackend;
use crate::store::work_store::{DocumentStore, StoreOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A document store over a fresh temporary directory.
pub struct TestEnv {
    // We keep _temp_dir to ensure the directory is not dropped until the test is done
    pub _temp_dir: TempDir,
    pub store: Arc<DocumentStore<NativeFsBackend>>,
    pub root: PathBuf,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let store = DocumentStore::new(NativeFsBackend::new(root.clone()), StoreOptions::default());
        Self {
            _temp_dir: temp_dir,
            store: Arc::new(store),
            root,
        }
    }

    /// Absolute path of a logical path inside the store.
    pub fn path(&self, logical: &str) -> PathBuf {
        crate::paths::resolve_under(&self.root, logical)
    }

    /// Write raw text behind the store's back, creating parents.
    pub fn write_raw(&self, logical: &str, text: &str) {
        let path = self.path(logical);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        std::fs::write(path, text).expect("failed to write raw file");
    }

    pub fn exists(&self, logical: &str) -> bool {
        Path::exists(&self.path(logical))
    }
}

/// A document store over an in-memory key-value backend.
pub fn kv_store() -> Arc<DocumentStore<KvBackend>> {
    Arc::new(DocumentStore::new(KvBackend::new(), StoreOptions::default()))
}
