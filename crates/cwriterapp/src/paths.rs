//! # Path Resolver
//!
//! Pure mapping from `(user, work, resource)` to the logical paths every backend
//! understands. Logical paths are `/`-separated and relative to the backend root;
//! filesystem backends join them onto a real directory with [`resolve_under`],
//! the key-value backend uses them verbatim as keys.
//!
//! ## Layout
//!
//! ```text
//! global.config.json
//! users/{user}/user.config.json
//! users/{user}/works/{work}/work.config.json
//! users/{user}/works/{work}/settings/manuscript.json
//! users/{user}/works/{work}/settings/settings.json
//! users/{user}/works/{work}/chapters/chapters.json
//! users/{user}/works/{work}/characters/characters.json
//! users/{user}/works/{work}/glossary/glossary.json
//! users/{user}/works/{work}/foreshadowing/foreshadowing.json
//! users/{user}/works/{work}/maps/map_data.json
//! logs/{user}/operations.json
//! backups/{user}/backup_{id}.json
//! backups/{user}/manifest.json
//! ```
//!
//! ## Identifier Guards
//!
//! - A missing or blank user id is replaced by [`DEFAULT_USER_ID`] with a warning.
//!   User-scoped operations never fail because the caller forgot the user.
//! - A missing or blank work id yields `None` from [`work_paths`]. Callers turn
//!   that into [`CwriterError::InvalidArgument`] instead of building
//!   `users/x/works//work.config.json`.
//! - Ids that could escape their directory (`/`, `\`, `..`, control characters)
//!   are rejected outright.

use crate::error::{CwriterError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_USER_ID: &str = "default_user";

pub const USERS_DIR: &str = "users";
pub const LOGS_DIR: &str = "logs";
pub const BACKUPS_DIR: &str = "backups";
pub const GLOBAL_CONFIG_FILE: &str = "global.config.json";

/// Subdirectories created under every work root.
pub const WORK_SUBDIRS: [&str; 7] = [
    "settings",
    "maps",
    "characters",
    "chapters",
    "glossary",
    "foreshadowing",
    "drafts",
];

/// A validated user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    /// Normalize a caller-supplied user id.
    ///
    /// Absent or blank ids fall back to [`DEFAULT_USER_ID`]; ids that are not
    /// safe as a single path segment are an [`CwriterError::InvalidArgument`].
    pub fn resolve(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim) {
            None | Some("") => {
                tracing::warn!(?raw, "missing user id, using {}", DEFAULT_USER_ID);
                Ok(Self::default_user())
            }
            Some(id) if is_safe_segment(id) => Ok(Self(id.to_string())),
            Some(id) => Err(CwriterError::InvalidArgument(format!(
                "user id {:?} is not a valid identifier",
                id
            ))),
        }
    }

    pub fn default_user() -> Self {
        Self(DEFAULT_USER_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True when `id` can be used as one path segment.
pub fn is_safe_segment(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && !id.contains("..")
        && !id.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

pub fn user_path(user: &UserId) -> String {
    format!("{}/{}", USERS_DIR, user)
}

pub fn user_config_path(user: &UserId) -> String {
    format!("{}/user.config.json", user_path(user))
}

pub fn works_dir(user: &UserId) -> String {
    format!("{}/works", user_path(user))
}

pub fn global_config_path() -> String {
    GLOBAL_CONFIG_FILE.to_string()
}

pub fn log_dir(user: &UserId) -> String {
    format!("{}/{}", LOGS_DIR, user)
}

pub fn log_path(user: &UserId) -> String {
    format!("{}/operations.json", log_dir(user))
}

pub fn backup_dir(user: &UserId) -> String {
    format!("{}/{}", BACKUPS_DIR, user)
}

pub fn backup_path(user: &UserId, backup_id: &str) -> String {
    format!("{}/backup_{}.json", backup_dir(user), backup_id)
}

pub fn backup_manifest_path(user: &UserId) -> String {
    format!("{}/manifest.json", backup_dir(user))
}

/// Every document path belonging to one work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPaths {
    pub work_id: String,
    pub root: String,
    pub config: String,
    pub manuscript: String,
    pub settings: String,
    pub chapters: String,
    pub characters: String,
    pub glossary: String,
    pub foreshadowing: String,
    pub map_data: String,
}

impl WorkPaths {
    pub fn subdirs(&self) -> Vec<String> {
        WORK_SUBDIRS
            .iter()
            .map(|dir| format!("{}/{}", self.root, dir))
            .collect()
    }
}

/// Resolve the paths of a work, or `None` when the work id is unusable.
pub fn work_paths(user: &UserId, work_id: Option<&str>) -> Option<WorkPaths> {
    let work_id = match work_id.map(str::trim) {
        Some(id) if is_safe_segment(id) => id,
        other => {
            tracing::error!(user_id = %user, work_id = ?other, "invalid work id");
            return None;
        }
    };

    let root = format!("{}/{}", works_dir(user), work_id);
    Some(WorkPaths {
        work_id: work_id.to_string(),
        config: format!("{}/work.config.json", root),
        manuscript: format!("{}/settings/manuscript.json", root),
        settings: format!("{}/settings/settings.json", root),
        chapters: format!("{}/chapters/chapters.json", root),
        characters: format!("{}/characters/characters.json", root),
        glossary: format!("{}/glossary/glossary.json", root),
        foreshadowing: format!("{}/foreshadowing/foreshadowing.json", root),
        map_data: format!("{}/maps/map_data.json", root),
        root,
    })
}

/// Join a logical path onto a filesystem root, one segment at a time.
pub fn resolve_under(root: &Path, logical: &str) -> PathBuf {
    logical
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
}
