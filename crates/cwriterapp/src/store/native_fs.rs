use super::backend::{BackendKind, StorageBackend};
use crate::error::{CwriterError, Result};
use crate::paths::resolve_under;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Filesystem backend for the native app sandbox, on `tokio::fs`.
pub struct NativeFsBackend {
    root: PathBuf,
}

impl NativeFsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        resolve_under(&self.root, path)
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| CwriterError::io(path.display().to_string(), e))
    }
}

#[async_trait]
impl StorageBackend for NativeFsBackend {
    async fn mkdir(&self, path: &str) -> Result<()> {
        self.ensure_dir(&self.resolve(path)).await
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let target = self.resolve(path);
        let dir = target.parent().unwrap_or(&self.root).to_path_buf();
        self.ensure_dir(&dir).await?;

        // Atomic write
        let tmp = dir.join(format!(".cw-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, data)
            .await
            .map_err(|e| CwriterError::io(path, e))?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CwriterError::io(path, e));
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        match fs::read(self.resolve(path)).await {
            Ok(data) => Some(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path, "file not found");
                None
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "read failed");
                None
            }
        }
    }

    async fn delete_file(&self, path: &str) -> bool {
        match fs::remove_file(self.resolve(path)).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(path, error = %e, "delete failed");
                false
            }
        }
    }

    async fn delete_dir(&self, path: &str) -> bool {
        match fs::remove_dir_all(self.resolve(path)).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(path, error = %e, "directory delete failed");
                false
            }
        }
    }

    async fn list_dir(&self, path: &str) -> Vec<String> {
        let mut entries = match fs::read_dir(self.resolve(path)).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path, error = %e, "list failed");
                }
                return Vec::new();
            }
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if let Some(name) = entry.file_name().to_str() {
                        if !name.starts_with('.') {
                            names.push(name.to_string());
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(path, error = %e, "list interrupted");
                    break;
                }
            }
        }
        names.sort();
        names
    }

    async fn exists(&self, path: &str) -> bool {
        fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::NativeFs
    }
}
