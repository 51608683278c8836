//! Platform detection and backend selection.
//!
//! Detecting the host is the caller's job: it hands in a [`CapabilityProbe`].
//! The store only maps the answer onto a backend and degrades to the key-value
//! fallback when a filesystem root can't be prepared.

use crate::config::CwriterConfig;
use crate::error::{CwriterError, Result};
use crate::store::backend::AnyBackend;
use crate::store::kv::KvBackend;
use crate::store::mp_fs::MiniProgramFsBackend;
use crate::store::native_fs::NativeFsBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "native-fs")]
    NativeFs,
    #[serde(rename = "mp-fs")]
    MiniProgramFs,
    #[serde(rename = "kv-fallback")]
    KvFallback,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::NativeFs => "native-fs",
            Platform::MiniProgramFs => "mp-fs",
            Platform::KvFallback => "kv-fallback",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CwriterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native-fs" | "native" => Ok(Platform::NativeFs),
            "mp-fs" | "mp" | "miniprogram" => Ok(Platform::MiniProgramFs),
            "kv-fallback" | "kv" => Ok(Platform::KvFallback),
            other => Err(CwriterError::Config(format!("unknown platform {:?}", other))),
        }
    }
}

/// Tells the store which host it runs on.
pub trait CapabilityProbe {
    fn detect(&self) -> Platform;
}

impl<F> CapabilityProbe for F
where
    F: Fn() -> Platform,
{
    fn detect(&self) -> Platform {
        self()
    }
}

/// A probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedPlatform(pub Platform);

impl CapabilityProbe for FixedPlatform {
    fn detect(&self) -> Platform {
        self.0
    }
}

/// The platform to use: the configured override, else the probe's answer.
pub fn resolve_platform(config: &CwriterConfig, probe: &dyn CapabilityProbe) -> Result<Platform> {
    Ok(config.platform()?.unwrap_or_else(|| probe.detect()))
}

/// Build the backend for `platform`, falling back to key-value storage when a
/// filesystem root is unusable.
pub fn select_backend(platform: Platform, config: &CwriterConfig) -> AnyBackend {
    let root = match platform {
        Platform::KvFallback => return kv_backend(config),
        Platform::NativeFs | Platform::MiniProgramFs => match config.data_dir() {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!(%platform, error = %e, "no data dir, falling back to kv storage");
                return kv_backend(config);
            }
        },
    };

    if let Err(e) = prepare_root(&root) {
        tracing::warn!(
            %platform,
            root = %root.display(),
            error = %e,
            "filesystem unavailable, falling back to kv storage"
        );
        return kv_backend(config);
    }

    tracing::debug!(%platform, root = %root.display(), "selected filesystem backend");
    match platform {
        Platform::MiniProgramFs => MiniProgramFsBackend::new(root).into(),
        _ => NativeFsBackend::new(root).into(),
    }
}

fn prepare_root(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root)?;
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "data dir is not a directory",
        ));
    }
    Ok(())
}

fn kv_backend(config: &CwriterConfig) -> AnyBackend {
    match &config.kv_snapshot {
        Some(path) => KvBackend::open(path).into(),
        None => KvBackend::new().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::{BackendKind, StorageBackend};
    use tempfile::tempdir;

    fn config_at(dir: &Path) -> CwriterConfig {
        CwriterConfig {
            data_dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_platform_names() {
        assert_eq!("mp-fs".parse::<Platform>().unwrap(), Platform::MiniProgramFs);
        assert_eq!(" KV ".parse::<Platform>().unwrap(), Platform::KvFallback);
        assert_eq!(Platform::NativeFs.to_string(), "native-fs");
        assert!("tape".parse::<Platform>().is_err());
    }

    #[test]
    fn test_probe_closure_and_override() {
        let dir = tempdir().unwrap();
        let probe = || Platform::MiniProgramFs;
        let config = config_at(dir.path());
        assert_eq!(resolve_platform(&config, &probe).unwrap(), Platform::MiniProgramFs);

        let forced = CwriterConfig {
            platform: Some("native-fs".into()),
            ..config
        };
        assert_eq!(
            resolve_platform(&forced, &FixedPlatform(Platform::KvFallback)).unwrap(),
            Platform::NativeFs
        );
    }

    #[test]
    fn test_select_filesystem_backends() {
        let dir = tempdir().unwrap();
        let config = config_at(&dir.path().join("data"));

        let native = select_backend(Platform::NativeFs, &config);
        assert_eq!(native.kind(), BackendKind::NativeFs);
        assert!(dir.path().join("data").is_dir());

        let mp = select_backend(Platform::MiniProgramFs, &config);
        assert_eq!(mp.kind(), BackendKind::MiniProgramFs);
    }

    #[test]
    fn test_unusable_root_falls_back_to_kv() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let backend = select_backend(Platform::NativeFs, &config_at(&blocker.join("data")));
        assert_eq!(backend.kind(), BackendKind::KvFallback);
    }
}
