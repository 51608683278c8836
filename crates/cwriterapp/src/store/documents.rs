//! JSON documents on top of a [`StorageBackend`].
//!
//! Two read flavours exist:
//!
//! - [`read_document`] for primary documents. A missing file can be seeded from
//!   a default; a corrupt file is handed to [`Document::recover`] and, when that
//!   yields a value, rewritten.
//! - [`read_or_default`] for secondary documents (chapters, glossary, ...). It
//!   never writes; missing or corrupt content reads as empty.

use super::backend::StorageBackend;
use super::locks::UserLocks;
use crate::error::{CwriterError, Result};
use crate::model::{
    Backup, GlobalConfig, GlobalUserEntry, Manuscript, UserConfig, WorkConfig,
};
use crate::paths::{global_config_path, USERS_DIR};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A JSON document the store knows how to persist.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Regenerate a usable document after `path` failed to parse.
    fn recover(_path: &str) -> Option<Self> {
        None
    }
}

impl Document for UserConfig {
    fn recover(path: &str) -> Option<Self> {
        let user_id = path
            .strip_prefix(USERS_DIR)?
            .strip_prefix('/')?
            .split('/')
            .next()
            .filter(|id| !id.is_empty())?;
        Some(UserConfig::new(user_id))
    }
}

impl Document for GlobalConfig {
    fn recover(_path: &str) -> Option<Self> {
        Some(GlobalConfig::new(""))
    }
}

impl Document for WorkConfig {}
impl Document for Manuscript {}
impl Document for Backup {}
impl Document for serde_json::Value {}
impl<T> Document for Vec<T> where T: Serialize + DeserializeOwned + Send + Sync {}

pub fn decode_document<T: Document>(path: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| CwriterError::Parse {
        path: path.to_string(),
        source,
    })
}

pub fn encode_document<T: Document>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

pub async fn write_document<B, T>(backend: &B, path: &str, value: &T) -> Result<()>
where
    B: StorageBackend + ?Sized,
    T: Document,
{
    let bytes = encode_document(value)?;
    backend.write_file(path, &bytes).await
}

pub async fn read_document<B, T>(backend: &B, path: &str, default: Option<T>) -> Result<Option<T>>
where
    B: StorageBackend + ?Sized,
    T: Document,
{
    let Some(bytes) = backend.read_file(path).await else {
        return match default {
            Some(value) => {
                write_document(backend, path, &value).await?;
                tracing::debug!(path, "seeded missing document");
                Ok(Some(value))
            }
            None => Ok(None),
        };
    };

    match decode_document(path, &bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::error!(path, error = %e, "corrupt document");
            match T::recover(path) {
                Some(value) => {
                    write_document(backend, path, &value).await?;
                    tracing::warn!(path, "regenerated corrupt document");
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }
    }
}

/// Read a secondary document; missing or corrupt content yields the default.
pub async fn read_or_default<B, T>(backend: &B, path: &str) -> T
where
    B: StorageBackend + ?Sized,
    T: Document + Default,
{
    match backend.read_file(path).await {
        Some(bytes) => decode_document(path, &bytes).unwrap_or_else(|e| {
            tracing::warn!(path, error = %e, "unreadable document, using empty default");
            T::default()
        }),
        None => T::default(),
    }
}

/// Read-modify-write the global config under its lock.
pub async fn update_global_config<B, F>(
    backend: &B,
    locks: &UserLocks,
    storage_type: &str,
    edit: F,
) -> Result<GlobalConfig>
where
    B: StorageBackend + ?Sized,
    F: FnOnce(&mut GlobalConfig) + Send,
{
    let _guard = locks.lock_global().await;
    let path = global_config_path();
    let mut global = read_document(backend, &path, Some(GlobalConfig::new(storage_type)))
        .await?
        .unwrap_or_else(|| GlobalConfig::new(storage_type));
    if global.storage_type.is_empty() {
        global.storage_type = storage_type.to_string();
    }
    edit(&mut global);
    write_document(backend, &path, &global).await?;
    Ok(global)
}

/// Add `user_id` to the global registry if it isn't there yet.
pub async fn register_user<B>(
    backend: &B,
    locks: &UserLocks,
    storage_type: &str,
    user_id: &str,
) -> Result<()>
where
    B: StorageBackend + ?Sized,
{
    update_global_config(backend, locks, storage_type, |global| {
        global
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| GlobalUserEntry {
                created_at: Utc::now(),
            });
    })
    .await
    .map(|_| ())
}
