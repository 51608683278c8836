//! # Index Synchronization
//!
//! [`UserConfig::works`] is a denormalized index of the canonical
//! `work.config.json` files. It drifts when a write is interrupted between the
//! two documents, when files are copied in by hand, or when a work directory
//! disappears. Every listing repairs that drift before answering.
//!
//! ## Candidates
//!
//! Which works *should* exist depends on the backend:
//!
//! - Backends that can list directories: every folder under `works/`.
//! - The key-value backend can't enumerate, so the index itself is the
//!   candidate set. Each entry is still checked against its config document,
//!   which removes stale entries. A config with no index entry can't be found
//!   there.
//!
//! ## Pass
//!
//! 1. Read each candidate's config. Missing or corrupt configs are skipped:
//!    such a work is excluded from the listing, not an error.
//! 2. Adopt configs absent from the index (orphans).
//! 3. Refresh listing fields of entries whose config changed.
//! 4. Drop entries without a readable config (zombies).
//! 5. Persist the user config only when something changed.

use super::backend::StorageBackend;
use super::documents::{read_document, read_or_default};
use super::work_store::DocumentStore;
use crate::error::Result;
use crate::model::{sort_summaries, SyncReport, UserConfig, WorkConfig, WorkSummary};
use crate::paths::{work_paths, works_dir, UserId};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A work config found on storage during a reconciliation pass.
#[derive(Debug, Clone)]
pub struct DiscoveredWork {
    pub folder: String,
    pub config: WorkConfig,
    /// Only read for works the index doesn't know yet.
    pub chapter_count: usize,
}

impl DiscoveredWork {
    pub fn id(&self) -> &str {
        if self.config.id.trim().is_empty() {
            &self.folder
        } else {
            &self.config.id
        }
    }
}

/// Bring `works` in line with the configs that were found.
pub fn reconcile_index(
    works: &mut BTreeMap<String, WorkSummary>,
    found: &[DiscoveredWork],
    skipped: usize,
) -> SyncReport {
    let mut report = SyncReport {
        skipped,
        ..Default::default()
    };
    let mut authoritative = BTreeSet::new();

    for work in found {
        let id = work.id().to_string();
        authoritative.insert(id.clone());
        match works.get_mut(&id) {
            Some(summary) => {
                if summary.refresh_listing_fields(&work.config) {
                    report.refreshed += 1;
                }
            }
            None => {
                let mut summary = WorkSummary::from_config(&work.config, work.chapter_count);
                summary.id = id.clone();
                works.insert(id, summary);
                report.added += 1;
            }
        }
    }

    let before = works.len();
    works.retain(|id, _| authoritative.contains(id));
    report.removed = before - works.len();
    report
}

impl<B: StorageBackend + 'static> DocumentStore<B> {
    /// List a user's works, newest first, after reconciling the index.
    pub async fn get_user_works(&self, user: Option<&str>) -> Result<Vec<WorkSummary>> {
        let user = UserId::resolve(user)?;
        let (config, _) = self.reconcile(&user).await?;
        let mut works: Vec<WorkSummary> = config.works.into_values().collect();
        sort_summaries(&mut works);
        Ok(works)
    }

    /// Run one reconciliation pass and report what it repaired.
    pub async fn doctor(&self, user: Option<&str>) -> Result<SyncReport> {
        let user = UserId::resolve(user)?;
        let (_, report) = self.reconcile(&user).await?;
        Ok(report)
    }

    async fn reconcile(&self, user: &UserId) -> Result<(UserConfig, SyncReport)> {
        let _guard = self.locks.lock_user(user.as_str()).await;
        let mut config = self.load_user_config(user).await?;

        let candidates: Vec<String> = if self.backend.supports_listing() {
            self.backend.list_dir(&works_dir(user)).await
        } else {
            config.works.keys().cloned().collect()
        };

        let mut found = Vec::new();
        let mut skipped = 0;
        for folder in candidates {
            let Some(paths) = work_paths(user, Some(&folder)) else {
                skipped += 1;
                continue;
            };
            match read_document::<_, WorkConfig>(&*self.backend, &paths.config, None).await? {
                Some(work) => {
                    let known = config.works.contains_key(&folder)
                        || config.works.contains_key(&work.id);
                    let chapter_count = if known {
                        0
                    } else {
                        read_or_default::<_, Vec<Value>>(&*self.backend, &paths.chapters)
                            .await
                            .len()
                    };
                    found.push(DiscoveredWork {
                        folder,
                        config: work,
                        chapter_count,
                    });
                }
                None => {
                    tracing::warn!(user_id = %user, work_id = %folder, "work config missing or unreadable, excluding");
                    skipped += 1;
                }
            }
        }

        let report = reconcile_index(&mut config.works, &found, skipped);
        if report.changed() {
            self.save_user_config(user, &mut config).await?;
            tracing::info!(
                user_id = %user,
                added = report.added,
                refreshed = report.refreshed,
                removed = report.removed,
                "reconciled work index"
            );
        }
        Ok((config, report))
    }

    pub(crate) async fn register_summary(&self, user: &UserId, summary: WorkSummary) -> Result<()> {
        let _guard = self.locks.lock_user(user.as_str()).await;
        let mut config = self.load_user_config(user).await?;
        config.works.insert(summary.id.clone(), summary);
        self.save_user_config(user, &mut config).await
    }

    /// Copy `work` into its summary, inserting the summary if it's missing.
    pub(crate) async fn refresh_summary(
        &self,
        user: &UserId,
        work: &WorkConfig,
        chapter_count: Option<usize>,
    ) -> Result<()> {
        let _guard = self.locks.lock_user(user.as_str()).await;
        let mut config = self.load_user_config(user).await?;

        match config.works.get_mut(&work.id) {
            Some(summary) => {
                summary.sync_from(work);
                if let Some(count) = chapter_count {
                    summary.chapter_count = count;
                }
            }
            None => {
                let count = match chapter_count {
                    Some(count) => count,
                    None => self.count_chapters(user, &work.id).await,
                };
                tracing::debug!(user_id = %user, work_id = %work.id, "summary was missing, re-adding");
                config
                    .works
                    .insert(work.id.clone(), WorkSummary::from_config(work, count));
            }
        }
        self.save_user_config(user, &mut config).await
    }

    /// Returns false if the work wasn't indexed.
    pub(crate) async fn remove_summary(&self, user: &UserId, work_id: &str) -> Result<bool> {
        let _guard = self.locks.lock_user(user.as_str()).await;
        let mut config = self.load_user_config(user).await?;
        if config.works.remove(work_id).is_none() {
            return Ok(false);
        }
        self.save_user_config(user, &mut config).await?;
        Ok(true)
    }

    async fn count_chapters(&self, user: &UserId, work_id: &str) -> usize {
        match work_paths(user, Some(work_id)) {
            Some(paths) => read_or_default::<_, Vec<Value>>(&*self.backend, &paths.chapters)
                .await
                .len(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewWork;
    use crate::store::kv::KvBackend;
    use crate::store::work_store::StoreOptions;
    use crate::test_utils::TestEnv;
    use chrono::Duration;

    fn discovered(folder: &str, title: &str) -> DiscoveredWork {
        let mut config = WorkConfig::new(folder, &NewWork::titled(title), "p");
        config.id = folder.to_string();
        DiscoveredWork {
            folder: folder.to_string(),
            config,
            chapter_count: 3,
        }
    }

    // --- Pure Reconciliation Tests ---

    #[test]
    fn test_reconcile_adopts_orphans() {
        let mut works = BTreeMap::new();
        let report = reconcile_index(&mut works, &[discovered("1", "A")], 0);
        assert_eq!(report.added, 1);
        assert_eq!(works["1"].title, "A");
        assert_eq!(works["1"].chapter_count, 3);
    }

    #[test]
    fn test_reconcile_removes_zombies() {
        let mut works = BTreeMap::new();
        let zombie = discovered("9", "Gone");
        works.insert(
            "9".to_string(),
            WorkSummary::from_config(&zombie.config, 0),
        );
        let report = reconcile_index(&mut works, &[], 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.skipped, 1);
        assert!(works.is_empty());
    }

    #[test]
    fn test_reconcile_refreshes_only_stale_entries() {
        let fresh = discovered("1", "Same");
        let mut stale = discovered("2", "Old");
        let mut works = BTreeMap::new();
        works.insert("1".to_string(), WorkSummary::from_config(&fresh.config, 0));
        works.insert("2".to_string(), WorkSummary::from_config(&stale.config, 5));

        stale.config.title = "New".to_string();
        stale.config.updated_at = stale.config.updated_at + Duration::seconds(1);
        let report = reconcile_index(&mut works, &[fresh, stale], 0);

        assert_eq!(report.refreshed, 1);
        assert_eq!(report.added, 0);
        assert_eq!(works["2"].title, "New");
        assert_eq!(works["2"].chapter_count, 5);
    }

    #[test]
    fn test_folder_name_used_when_config_id_empty() {
        let mut work = discovered("77", "T");
        work.config.id = String::new();
        let mut works = BTreeMap::new();
        reconcile_index(&mut works, &[work], 0);
        assert_eq!(works["77"].id, "77");
    }

    #[test]
    fn test_clean_pass_reports_no_change() {
        let work = discovered("1", "A");
        let mut works = BTreeMap::new();
        works.insert("1".to_string(), WorkSummary::from_config(&work.config, 0));
        let report = reconcile_index(&mut works, &[work], 0);
        assert!(!report.changed());
    }

    // --- Store Reconciliation Tests (key-value backend) ---

    fn make_store() -> DocumentStore<KvBackend> {
        DocumentStore::new(KvBackend::new(), StoreOptions::default())
    }

    #[tokio::test]
    async fn test_listing_empty_user_is_empty() {
        let store = make_store();
        assert!(store.get_user_works(Some("nobody")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kv_listing_drops_entries_without_config() {
        let store = make_store();
        let keep = store.create_work(None, NewWork::titled("Keep")).await.unwrap();
        let gone = store.create_work(None, NewWork::titled("Gone")).await.unwrap();
        store
            .backend()
            .delete_file(&format!("users/default_user/works/{}/work.config.json", gone.id))
            .await;

        let works = store.get_user_works(None).await.unwrap();
        let ids: Vec<&str> = works.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec![keep.id.as_str()]);
        assert!(!store.user_config(None).await.unwrap().works.contains_key(&gone.id));
    }

    #[tokio::test]
    async fn test_kv_listing_excludes_corrupt_config() {
        let store = make_store();
        let work = store.create_work(None, NewWork::titled("Broken")).await.unwrap();
        store.backend().insert_raw(
            &format!("users/default_user/works/{}/work.config.json", work.id),
            "{ not json",
        );

        let report = store.doctor(None).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.skipped, 1);
        assert!(store.get_user_works(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kv_cannot_discover_unindexed_config() {
        let store = make_store();
        let work = store.create_work(None, NewWork::titled("Hidden")).await.unwrap();
        {
            let user = UserId::default_user();
            let _guard = store.locks.lock_user(user.as_str()).await;
            let mut config = store.load_user_config(&user).await.unwrap();
            config.works.clear();
            store.save_user_config(&user, &mut config).await.unwrap();
        }

        assert!(store.get_user_works(None).await.unwrap().is_empty());
        assert!(store.get_work_detail(None, &work.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_listing_is_newest_first() {
        let store = make_store();
        let first = store.create_work(None, NewWork::titled("First")).await.unwrap();
        let second = store.create_work(None, NewWork::titled("Second")).await.unwrap();
        store
            .update_work(None, &first.id, serde_json::json!({"description": "touched"}))
            .await
            .unwrap();

        let works = store.get_user_works(None).await.unwrap();
        assert_eq!(works[0].id, first.id);
        assert_eq!(works[1].id, second.id);
    }

    // --- Store Reconciliation Tests (filesystem backend) ---

    #[tokio::test]
    async fn test_fs_listing_adopts_orphan_folder() {
        let env = TestEnv::new();
        let known = env.store.create_work(None, NewWork::titled("Known")).await.unwrap();

        let orphan = WorkConfig::new("555", &NewWork::titled("Copied"), "users/default_user/works/555");
        env.write_raw(
            "users/default_user/works/555/work.config.json",
            &serde_json::to_string(&orphan).unwrap(),
        );
        env.write_raw(
            "users/default_user/works/555/chapters/chapters.json",
            r#"[{"id": "c1"}, {"id": "c2"}]"#,
        );

        let report = env.store.doctor(None).await.unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 0);

        let works = env.store.get_user_works(None).await.unwrap();
        assert_eq!(works.len(), 2);
        let adopted = works.iter().find(|w| w.id == "555").unwrap();
        assert_eq!(adopted.title, "Copied");
        assert_eq!(adopted.chapter_count, 2);
        assert!(works.iter().any(|w| w.id == known.id));
    }

    #[tokio::test]
    async fn test_fs_listing_excludes_folder_without_config() {
        let env = TestEnv::new();
        env.write_raw("users/default_user/works/777/chapters/chapters.json", "[]");

        let report = env.store.doctor(None).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(env.store.get_user_works(None).await.unwrap().is_empty());
        assert!(env.exists("users/default_user/works/777"));
    }
}
