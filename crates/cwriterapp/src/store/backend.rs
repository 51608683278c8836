use super::kv::KvBackend;
use super::mp_fs::MiniProgramFsBackend;
use super::native_fs::NativeFsBackend;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which physical substrate a backend writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    NativeFs,
    #[serde(rename = "mp-fs")]
    MiniProgramFs,
    KvFallback,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::NativeFs => "native-fs",
            BackendKind::MiniProgramFs => "mp-fs",
            BackendKind::KvFallback => "kv-fallback",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abstract interface for raw storage I/O.
/// This trait handles the "how" of storage (a real directory tree or one
/// key-value blob), while `DocumentStore` handles the "what" (documents,
/// defaults, index sync).
///
/// Paths are logical: `/`-separated and relative to the backend root.
///
/// Only writes report errors. Reads, deletes, listings and existence checks
/// log their failures and answer `None` / `false` / empty, so a flaky substrate
/// degrades into "not there" instead of aborting a whole operation.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create a directory and its parents. No-op where directories don't exist.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Write a file, creating parent directories.
    /// MUST be atomic (e.g. write to tmp then rename) to avoid partial writes.
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Returns None if the file does not exist or cannot be read.
    async fn read_file(&self, path: &str) -> Option<Vec<u8>>;

    /// Returns true if something was deleted.
    async fn delete_file(&self, path: &str) -> bool;

    /// Recursively delete a directory. Returns true if something was deleted.
    async fn delete_dir(&self, path: &str) -> bool;

    /// Names of the direct children of a directory.
    async fn list_dir(&self, path: &str) -> Vec<String>;

    async fn exists(&self, path: &str) -> bool;

    fn kind(&self) -> BackendKind;

    /// Whether `list_dir` can enumerate children at all.
    fn supports_listing(&self) -> bool {
        true
    }
}

/// The backend chosen at startup.
pub enum AnyBackend {
    NativeFs(NativeFsBackend),
    MiniProgramFs(MiniProgramFsBackend),
    Kv(KvBackend),
}

impl From<NativeFsBackend> for AnyBackend {
    fn from(backend: NativeFsBackend) -> Self {
        AnyBackend::NativeFs(backend)
    }
}

impl From<MiniProgramFsBackend> for AnyBackend {
    fn from(backend: MiniProgramFsBackend) -> Self {
        AnyBackend::MiniProgramFs(backend)
    }
}

impl From<KvBackend> for AnyBackend {
    fn from(backend: KvBackend) -> Self {
        AnyBackend::Kv(backend)
    }
}

macro_rules! delegate {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            AnyBackend::NativeFs($backend) => $call,
            AnyBackend::MiniProgramFs($backend) => $call,
            AnyBackend::Kv($backend) => $call,
        }
    };
}

#[async_trait]
impl StorageBackend for AnyBackend {
    async fn mkdir(&self, path: &str) -> Result<()> {
        delegate!(self, b => b.mkdir(path).await)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        delegate!(self, b => b.write_file(path, data).await)
    }

    async fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        delegate!(self, b => b.read_file(path).await)
    }

    async fn delete_file(&self, path: &str) -> bool {
        delegate!(self, b => b.delete_file(path).await)
    }

    async fn delete_dir(&self, path: &str) -> bool {
        delegate!(self, b => b.delete_dir(path).await)
    }

    async fn list_dir(&self, path: &str) -> Vec<String> {
        delegate!(self, b => b.list_dir(path).await)
    }

    async fn exists(&self, path: &str) -> bool {
        delegate!(self, b => b.exists(path).await)
    }

    fn kind(&self) -> BackendKind {
        delegate!(self, b => b.kind())
    }

    fn supports_listing(&self) -> bool {
        delegate!(self, b => b.supports_listing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_names() {
        assert_eq!(BackendKind::NativeFs.to_string(), "native-fs");
        assert_eq!(
            serde_json::to_string(&BackendKind::MiniProgramFs).unwrap(),
            "\"mp-fs\""
        );
        assert_eq!(
            serde_json::from_str::<BackendKind>("\"kv-fallback\"").unwrap(),
            BackendKind::KvFallback
        );
    }

    #[tokio::test]
    async fn test_any_backend_delegates() {
        let backend = AnyBackend::from(KvBackend::new());
        assert_eq!(backend.kind(), BackendKind::KvFallback);
        assert!(!backend.supports_listing());

        backend.write_file("a/b.json", b"{}").await.unwrap();
        assert_eq!(backend.read_file("a/b.json").await, Some(b"{}".to_vec()));
        assert!(backend.exists("a").await);
    }
}
