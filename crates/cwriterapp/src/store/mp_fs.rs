use super::backend::{BackendKind, StorageBackend};
use crate::error::{CwriterError, Result};
use crate::paths::resolve_under;
use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Filesystem backend for the mini-program sandbox.
///
/// The host API is synchronous, so every primitive is a blocking `std::fs`
/// call behind the async contract. Files are small JSON documents.
pub struct MiniProgramFsBackend {
    root: PathBuf,
}

impl MiniProgramFsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        resolve_under(&self.root, path)
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| CwriterError::io(path.display().to_string(), e))?;
        }
        Ok(())
    }
}

fn quiet<T>(path: &str, op: &str, result: io::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path, op, "not found");
            None
        }
        Err(e) => {
            tracing::warn!(path, op, error = %e, "filesystem call failed");
            None
        }
    }
}

#[async_trait]
impl StorageBackend for MiniProgramFsBackend {
    async fn mkdir(&self, path: &str) -> Result<()> {
        self.ensure_dir(&self.resolve(path))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let target = self.resolve(path);
        let dir = target.parent().unwrap_or(&self.root).to_path_buf();
        self.ensure_dir(&dir)?;

        // Atomic write
        let tmp = dir.join(format!(".cw-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, data).map_err(|e| CwriterError::io(path, e))?;
        fs::rename(&tmp, &target).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CwriterError::io(path, e)
        })
    }

    async fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        quiet(path, "read", fs::read(self.resolve(path)))
    }

    async fn delete_file(&self, path: &str) -> bool {
        quiet(path, "unlink", fs::remove_file(self.resolve(path))).is_some()
    }

    async fn delete_dir(&self, path: &str) -> bool {
        quiet(path, "rmdir", fs::remove_dir_all(self.resolve(path))).is_some()
    }

    async fn list_dir(&self, path: &str) -> Vec<String> {
        let Some(entries) = quiet(path, "readdir", fs::read_dir(self.resolve(path))) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names
    }

    async fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::MiniProgramFs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_round_trip_and_listing() {
        let dir = tempdir().unwrap();
        let backend = MiniProgramFsBackend::new(dir.path());

        backend.write_file("users/b/user.config.json", b"{}").await.unwrap();
        backend.mkdir("users/a").await.unwrap();

        assert_eq!(
            backend.read_file("users/b/user.config.json").await,
            Some(b"{}".to_vec())
        );
        assert_eq!(backend.list_dir("users").await, vec!["a", "b"]);
        assert!(backend.exists("users/b").await);
    }

    #[tokio::test]
    async fn test_delete_dir_is_recursive() {
        let dir = tempdir().unwrap();
        let backend = MiniProgramFsBackend::new(dir.path());
        backend.write_file("w/1/chapters/chapters.json", b"[]").await.unwrap();

        assert!(backend.delete_dir("w/1").await);
        assert!(!backend.exists("w/1").await);
        assert!(!backend.delete_dir("w/1").await);
    }

    #[tokio::test]
    async fn test_write_into_file_path_fails_with_io() {
        let dir = tempdir().unwrap();
        let backend = MiniProgramFsBackend::new(dir.path());
        backend.write_file("blocker", b"x").await.unwrap();

        let err = backend.write_file("blocker/child.json", b"{}").await.unwrap_err();
        assert!(matches!(err, CwriterError::Io { .. }));
    }
}
