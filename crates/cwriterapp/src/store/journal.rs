//! Operation log and user-config backups.
//!
//! The log is an audit trail, not a write-ahead log: entries are appended by
//! detached tasks after the primary write has finished, and a failing append
//! is logged and forgotten. Each user's log is a ring buffer of the most recent
//! `log_capacity` entries.
//!
//! Backups are immutable snapshots of a user config. A per-user manifest lists
//! them so retention works on backends that can't list directories.

use super::backend::StorageBackend;
use super::documents::{read_document, read_or_default, update_global_config, write_document};
use super::locks::UserLocks;
use super::work_store::{DocumentStore, StoreOptions};
use crate::error::{CwriterError, Result};
use crate::ids::IdGenerator;
use crate::model::{Backup, BackupEntry, CleanupReport, GlobalConfig, OperationLogEntry, UserConfig};
use crate::paths::{
    backup_dir, backup_manifest_path, backup_path, global_config_path, is_safe_segment, log_path,
    UserId, BACKUPS_DIR, LOGS_DIR,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub const BACKUP_TYPE_USER_CONFIG: &str = "user_config";

/// Appends to and trims the per-user operation logs.
pub struct OperationLog<B: StorageBackend> {
    backend: Arc<B>,
    locks: Arc<UserLocks>,
    ids: Arc<IdGenerator>,
    capacity: usize,
    user_agent: String,
}

impl<B: StorageBackend> Clone for OperationLog<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            locks: self.locks.clone(),
            ids: self.ids.clone(),
            capacity: self.capacity,
            user_agent: self.user_agent.clone(),
        }
    }
}

impl<B: StorageBackend + 'static> OperationLog<B> {
    pub fn new(
        backend: Arc<B>,
        locks: Arc<UserLocks>,
        ids: Arc<IdGenerator>,
        options: StoreOptions,
    ) -> Self {
        Self {
            backend,
            locks,
            ids,
            capacity: options.log_capacity.max(1),
            user_agent: options.user_agent,
        }
    }

    pub async fn append(&self, user: &UserId, operation: &str, data: Value) -> Result<OperationLogEntry> {
        let entry = OperationLogEntry {
            id: self.ids.next_id(),
            user_id: user.to_string(),
            operation: operation.to_string(),
            data,
            timestamp: Utc::now(),
            user_agent: self.user_agent.clone(),
        };

        {
            let _guard = self.locks.lock_log(user.as_str()).await;
            let path = log_path(user);
            let mut entries: Vec<OperationLogEntry> = read_or_default(&*self.backend, &path).await;
            entries.push(entry.clone());
            keep_last(&mut entries, self.capacity);
            write_document(&*self.backend, &path, &entries).await?;
        }

        let user_id = user.as_str();
        update_global_config(&*self.backend, &self.locks, self.backend.kind().as_str(), |global| {
            *global.logs_count.entry(user_id.to_string()).or_insert(0) += 1;
        })
        .await?;
        Ok(entry)
    }

    pub async fn entries(&self, user: &UserId) -> Vec<OperationLogEntry> {
        read_or_default(&*self.backend, &log_path(user)).await
    }

    /// Drop all but the newest `max` entries. Returns how many were dropped.
    pub async fn trim(&self, user: &UserId, max: usize) -> Result<usize> {
        let _guard = self.locks.lock_log(user.as_str()).await;
        let path = log_path(user);
        let mut entries: Vec<OperationLogEntry> = read_or_default(&*self.backend, &path).await;
        let dropped = keep_last(&mut entries, max);
        if dropped > 0 {
            write_document(&*self.backend, &path, &entries).await?;
        }
        Ok(dropped)
    }
}

/// Keep the last `max` items in order; returns how many were removed.
fn keep_last<T>(items: &mut Vec<T>, max: usize) -> usize {
    let excess = items.len().saturating_sub(max);
    items.drain(..excess);
    excess
}

impl<B: StorageBackend + 'static> DocumentStore<B> {
    /// Record an operation in the background. Never fails and never blocks
    /// the caller; errors end up in the tracing output.
    pub fn log_operation(&self, user: &UserId, operation: &str, data: Value) {
        if self.disposed.load(Ordering::SeqCst) {
            tracing::debug!(user_id = %user, operation, "store disposed, dropping log entry");
            return;
        }
        let journal = self.journal.clone();
        let user = user.clone();
        let operation = operation.to_string();
        self.tasks.spawn(async move {
            if let Err(e) = journal.append(&user, &operation, data).await {
                tracing::warn!(user_id = %user, operation = %operation, error = %e, "failed to log operation");
            }
        });
    }

    /// Append a log entry and wait for it.
    pub async fn append_operation(
        &self,
        user: Option<&str>,
        operation: &str,
        data: Value,
    ) -> Result<OperationLogEntry> {
        let user = UserId::resolve(user)?;
        self.journal.append(&user, operation, data).await
    }

    /// The user's log, oldest first.
    pub async fn operation_log(&self, user: Option<&str>) -> Result<Vec<OperationLogEntry>> {
        let user = UserId::resolve(user)?;
        Ok(self.journal.entries(&user).await)
    }

    // --- Backups ---

    pub async fn create_backup(&self, user: Option<&str>) -> Result<Backup> {
        let user = UserId::resolve(user)?;
        let data = self.user_config(Some(user.as_str())).await?;
        let id = self.next_id();
        let backup = Backup {
            size: serde_json::to_vec(&data)?.len(),
            id: id.clone(),
            user_id: user.to_string(),
            data,
            created_at: Utc::now(),
            backup_type: BACKUP_TYPE_USER_CONFIG.to_string(),
        };
        self.write_document(&backup_path(&user, &id), &backup).await?;

        {
            let _guard = self.lock_backups(&user).await;
            let path = backup_manifest_path(&user);
            let mut manifest: Vec<BackupEntry> = read_or_default(&*self.backend, &path).await;
            manifest.push(BackupEntry {
                id: id.clone(),
                created_at: backup.created_at,
                size: backup.size,
            });
            self.write_document(&path, &manifest).await?;
        }

        let user_id = user.as_str();
        update_global_config(&*self.backend, &self.locks, self.storage_type(), |global| {
            *global.backups_count.entry(user_id.to_string()).or_insert(0) += 1;
        })
        .await?;

        tracing::info!(user_id = %user, backup_id = %id, size = backup.size, "created backup");
        self.log_operation(&user, "create_backup", json!({ "backup_id": id }));
        Ok(backup)
    }

    /// Backups in the manifest, oldest first.
    pub async fn list_backups(&self, user: Option<&str>) -> Result<Vec<BackupEntry>> {
        let user = UserId::resolve(user)?;
        let mut manifest: Vec<BackupEntry> =
            read_or_default(&*self.backend, &backup_manifest_path(&user)).await;
        sort_oldest_first(&mut manifest);
        Ok(manifest)
    }

    /// Write a snapshot back as the user's config. The next listing reconciles
    /// it against the works on storage.
    pub async fn restore_backup(&self, user: Option<&str>, backup_id: &str) -> Result<UserConfig> {
        let user = UserId::resolve(user)?;
        let backup_id = backup_id.trim();
        if !is_safe_segment(backup_id) {
            return Err(CwriterError::InvalidArgument(format!(
                "invalid backup id {:?}",
                backup_id
            )));
        }

        let backup: Backup = self
            .read_document(&backup_path(&user, backup_id), None)
            .await?
            .ok_or_else(|| CwriterError::NotFound(format!("backup {}", backup_id)))?;

        let mut config = backup.data;
        config.id = user.to_string();
        {
            let _guard = self.locks.lock_user(user.as_str()).await;
            self.save_user_config(&user, &mut config).await?;
        }

        tracing::info!(user_id = %user, backup_id, "restored backup");
        self.log_operation(&user, "restore_backup", json!({ "backup_id": backup_id }));
        Ok(config)
    }

    async fn lock_backups(&self, user: &UserId) -> tokio::sync::OwnedMutexGuard<()> {
        self.locks.lock(&format!("backup:{}", user)).await
    }

    // --- Retention ---

    /// Trim every known user's log to `max_logs` entries and keep only the
    /// newest `max_backups` backups.
    pub async fn cleanup_old_data(&self, max_logs: usize, max_backups: usize) -> Result<CleanupReport> {
        let mut users = BTreeSet::new();
        if let Some(global) = self
            .read_document::<GlobalConfig>(&global_config_path(), None)
            .await?
        {
            users.extend(global.users.into_keys());
        }
        if self.backend.supports_listing() {
            users.extend(self.backend.list_dir(LOGS_DIR).await);
            users.extend(self.backend.list_dir(BACKUPS_DIR).await);
        }

        let mut report = CleanupReport::default();
        for user_id in users {
            let Ok(user) = UserId::resolve(Some(&user_id)) else {
                tracing::warn!(user_id = %user_id, "skipping unusable user directory");
                continue;
            };
            report.logs_trimmed += self.journal.trim(&user, max_logs).await?;
            report.backups_deleted += self.trim_backups(&user, max_backups).await?;
        }

        tracing::info!(
            logs_trimmed = report.logs_trimmed,
            backups_deleted = report.backups_deleted,
            "cleaned up old data"
        );
        Ok(report)
    }

    async fn trim_backups(&self, user: &UserId, max_backups: usize) -> Result<usize> {
        let _guard = self.lock_backups(user).await;
        let manifest_path = backup_manifest_path(user);
        let mut manifest: Vec<BackupEntry> = read_or_default(&*self.backend, &manifest_path).await;
        let adopted = self.adopt_unlisted_backups(user, &mut manifest).await;

        sort_oldest_first(&mut manifest);
        let excess = manifest.len().saturating_sub(max_backups);
        let expired: Vec<BackupEntry> = manifest.drain(..excess).collect();
        for entry in &expired {
            if !self.backend.delete_file(&backup_path(user, &entry.id)).await {
                tracing::debug!(user_id = %user, backup_id = %entry.id, "backup file already gone");
            }
        }

        if excess > 0 || adopted {
            self.write_document(&manifest_path, &manifest).await?;
        }
        Ok(expired.len())
    }

    /// Add backup files the manifest doesn't list. Only possible where the
    /// backend can list directories.
    async fn adopt_unlisted_backups(&self, user: &UserId, manifest: &mut Vec<BackupEntry>) -> bool {
        if !self.backend.supports_listing() {
            return false;
        }
        let known: BTreeSet<String> = manifest.iter().map(|e| e.id.clone()).collect();
        let mut adopted = false;
        for name in self.backend.list_dir(&backup_dir(user)).await {
            let Some(id) = name
                .strip_prefix("backup_")
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            if known.contains(id) {
                continue;
            }
            let backup = read_document::<_, Backup>(&*self.backend, &backup_path(user, id), None)
                .await
                .ok()
                .flatten();
            if let Some(backup) = backup {
                manifest.push(BackupEntry {
                    id: backup.id,
                    created_at: backup.created_at,
                    size: backup.size,
                });
                adopted = true;
            }
        }
        adopted
    }
}

fn sort_oldest_first(entries: &mut [BackupEntry]) {
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewWork;
    use crate::store::kv::KvBackend;

    fn make_store(capacity: usize) -> DocumentStore<KvBackend> {
        DocumentStore::new(
            KvBackend::new(),
            StoreOptions {
                log_capacity: capacity,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_keep_last() {
        let mut items: Vec<u32> = (1..=5).collect();
        assert_eq!(keep_last(&mut items, 3), 2);
        assert_eq!(items, vec![3, 4, 5]);
        assert_eq!(keep_last(&mut items, 10), 0);
    }

    // --- Log Tests ---

    #[tokio::test]
    async fn test_ring_buffer_keeps_most_recent() {
        let store = make_store(3);
        for i in 0..5 {
            store
                .append_operation(Some("a"), "op", json!({ "n": i }))
                .await
                .unwrap();
        }
        let log = store.operation_log(Some("a")).await.unwrap();
        let ns: Vec<i64> = log.iter().map(|e| e.data["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![2, 3, 4]);
        assert!(log.iter().all(|e| e.user_agent.starts_with("cwriter/")));

        let global: GlobalConfig = store
            .read_document(&global_config_path(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(global.logs_count["a"], 5);
    }

    #[tokio::test]
    async fn test_detached_log_lands_after_flush() {
        let store = make_store(10);
        store.create_work(Some("a"), NewWork::titled("W")).await.unwrap();
        store.flush_logs().await;

        let log = store.operation_log(Some("a")).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].operation, "create_work");
    }

    #[tokio::test]
    async fn test_log_failure_never_reaches_caller() {
        let store = make_store(10);
        let work = store.create_work(None, NewWork::titled("W")).await.unwrap();
        store.flush_logs().await;

        store.backend().set_simulate_write_error(true);
        store.log_operation(&UserId::default_user(), "noop", json!({}));
        store.flush_logs().await;
        store.backend().set_simulate_write_error(false);

        let log = store.operation_log(None).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].data["work_id"], json!(work.id));
    }

    #[tokio::test]
    async fn test_disposed_store_drops_log_entries() {
        let store = make_store(10);
        store.dispose().await;
        store.log_operation(&UserId::default_user(), "late", json!({}));
        store.flush_logs().await;
        assert!(store.operation_log(None).await.unwrap().is_empty());
    }

    // --- Backup Tests ---

    #[tokio::test]
    async fn test_backup_and_restore() {
        let store = make_store(10);
        let work = store.create_work(Some("a"), NewWork::titled("Saved")).await.unwrap();
        let backup = store.create_backup(Some("a")).await.unwrap();
        assert_eq!(backup.backup_type, "user_config");
        assert!(backup.data.works.contains_key(&work.id));
        assert!(backup.size > 0);

        store
            .update_work(Some("a"), &work.id, json!({"title": "Changed"}))
            .await
            .unwrap();
        let restored = store.restore_backup(Some("a"), &backup.id).await.unwrap();
        assert_eq!(restored.works[&work.id].title, "Saved");

        let works = store.get_user_works(Some("a")).await.unwrap();
        assert_eq!(works[0].title, "Changed");
    }

    #[tokio::test]
    async fn test_restore_missing_backup_is_not_found() {
        let store = make_store(10);
        let err = store.restore_backup(None, "42").await.unwrap_err();
        assert!(matches!(err, CwriterError::NotFound(_)));
        let err = store.restore_backup(None, "../42").await.unwrap_err();
        assert!(matches!(err, CwriterError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_cleanup_deletes_oldest_backups_first() {
        let store = make_store(100);
        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(store.create_backup(Some("a")).await.unwrap().id);
        }
        store.flush_logs().await;
        for i in 0..6 {
            store.append_operation(Some("a"), "op", json!(i)).await.unwrap();
        }

        // 4 create_backup entries + 6 appended
        let report = store.cleanup_old_data(2, 2).await.unwrap();
        assert_eq!(report.backups_deleted, 2);
        assert_eq!(report.logs_trimmed, 8);
        assert_eq!(store.operation_log(Some("a")).await.unwrap().len(), 2);

        let remaining: Vec<String> = store
            .list_backups(Some("a"))
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(remaining, ids[2..].to_vec());
        for old in &ids[..2] {
            assert!(!store.backend().exists(&format!("backups/a/backup_{}.json", old)).await);
        }

        let global: GlobalConfig = store
            .read_document(&global_config_path(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(global.backups_count["a"], 4);
    }
}
