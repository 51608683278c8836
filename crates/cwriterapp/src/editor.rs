//! # Editor Session
//!
//! An in-memory working copy of one open work. Edits land in memory and are
//! flushed by [`EditorSession::save`] or by the auto-save timer.
//!
//! ## States
//!
//! ```text
//! Uninitialized --init--> Loading --ok--> Ready <--> Saving
//!       ^                    |              |
//!       +-------error--------+           destroy --> Destroyed
//! ```
//!
//! ## Saving
//!
//! A save snapshots the working copy and its revision, writes every
//! sub-document, and clears the dirty flag only if nothing was edited in the
//! meantime. Saves are not serialized against each other: two overlapping
//! saves write the same kind of snapshot and the later one wins.
//!
//! The auto-save timer first fires one full interval after `init` and only
//! saves a `Ready`, dirty session. `destroy` stops it without saving.

use crate::error::{CwriterError, Result};
use crate::merge::deep_merge;
use crate::model::{
    Chapter, ChapterInput, Manuscript, NewWork, WorkContent, WorkContentPatch, WorkDetail,
    WorkStats,
};
use crate::paths::UserId;
use crate::store::backend::{AnyBackend, StorageBackend};
use crate::store::work_store::{upsert, DocumentStore, ItemOwner};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const NEW_WORK_TITLE: &str = "New Work";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Loading,
    Ready,
    Saving,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveTrigger {
    Manual,
    Timer,
}

struct SessionInner {
    state: SessionState,
    user: UserId,
    work: Option<WorkDetail>,
    dirty: bool,
    revision: u64,
}

pub struct EditorSession<B: StorageBackend + 'static = AnyBackend> {
    store: Arc<DocumentStore<B>>,
    inner: Arc<Mutex<SessionInner>>,
    autosave_interval: Duration,
    timer: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<B: StorageBackend + 'static> EditorSession<B> {
    pub fn new(store: Arc<DocumentStore<B>>, autosave_interval: Duration) -> Self {
        Self {
            store,
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Uninitialized,
                user: UserId::default_user(),
                work: None,
                dirty: false,
                revision: 0,
            })),
            autosave_interval,
            timer: parking_lot::Mutex::new(None),
        }
    }

    /// Open `work_id`, or create a fresh work when none is given, then start
    /// the auto-save timer.
    pub async fn init(&self, work_id: Option<&str>, user_id: Option<&str>) -> Result<WorkDetail> {
        let user = UserId::resolve(user_id)?;
        {
            let mut inner = self.inner.lock().await;
            if inner.state != SessionState::Uninitialized {
                return Err(CwriterError::Session(format!(
                    "init called in state {:?}",
                    inner.state
                )));
            }
            inner.state = SessionState::Loading;
        }

        let loaded = self.load(&user, work_id).await;

        let mut inner = self.inner.lock().await;
        let detail = match loaded {
            Ok(detail) => detail,
            Err(e) => {
                if inner.state == SessionState::Loading {
                    inner.state = SessionState::Uninitialized;
                }
                return Err(e);
            }
        };
        if inner.state == SessionState::Destroyed {
            return Err(CwriterError::Session(
                "session destroyed while loading".to_string(),
            ));
        }

        inner.state = SessionState::Ready;
        inner.user = user;
        inner.work = Some(detail.clone());
        inner.dirty = false;
        drop(inner);

        self.start_timer();
        tracing::debug!(work_id = %detail.config.id, "editor session ready");
        Ok(detail)
    }

    async fn load(&self, user: &UserId, work_id: Option<&str>) -> Result<WorkDetail> {
        let work_id = match work_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                self.store
                    .create_work(Some(user.as_str()), NewWork::titled(NEW_WORK_TITLE))
                    .await?
                    .id
            }
        };
        self.store.get_work_detail(Some(user.as_str()), &work_id).await
    }

    fn start_timer(&self) {
        let store = self.store.clone();
        let inner = self.inner.clone();
        let period = self.autosave_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match persist(&store, &inner, SaveTrigger::Timer).await {
                    Ok(true) => tracing::debug!("auto-saved editor session"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(error = %e, "auto-save failed"),
                }
            }
        });

        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Write the working copy. Returns false when there was nothing to save.
    pub async fn save(&self) -> Result<bool> {
        persist(&self.store, &self.inner, SaveTrigger::Manual).await
    }

    /// Deep-merge `partial` into the working copy. Objects merge key by key;
    /// arrays replace. Storage is not touched.
    pub async fn update_content(&self, mut partial: Value) -> Result<()> {
        let Some(fields) = partial.as_object_mut() else {
            return Err(CwriterError::InvalidArgument(
                "content update must be an object".to_string(),
            ));
        };
        if let Some(manuscript) = fields.get_mut("manuscript") {
            *manuscript = Manuscript::normalize_patch(manuscript);
        }

        let mut inner = self.inner.lock().await;
        ensure_editable(inner.state)?;
        let current = inner
            .work
            .as_ref()
            .map(|work| &work.content)
            .ok_or_else(|| CwriterError::Session("no work loaded".to_string()))?;

        let mut value = serde_json::to_value(current)?;
        deep_merge(&mut value, &partial);
        let mut content: WorkContent = serde_json::from_value(value)
            .map_err(|e| CwriterError::InvalidArgument(format!("content update: {}", e)))?;
        content.manuscript.recount();

        if let Some(work) = inner.work.as_mut() {
            work.content = content;
        }
        inner.dirty = true;
        inner.revision += 1;
        Ok(())
    }

    /// Insert or update one chapter of the working copy.
    pub async fn update_chapter(&self, chapter_id: &str, mut input: ChapterInput) -> Result<Chapter> {
        input.id = Some(chapter_id.to_string());

        let mut guard = self.inner.lock().await;
        ensure_editable(guard.state)?;
        let inner = &mut *guard;
        let work = inner
            .work
            .as_mut()
            .ok_or_else(|| CwriterError::Session("no work loaded".to_string()))?;

        let owner = ItemOwner {
            user_id: inner.user.as_str(),
            work_id: &work.config.id,
        };
        let chapter = upsert(&mut work.content.chapters, input, &owner, &self.store.ids)?;
        inner.dirty = true;
        inner.revision += 1;
        Ok(chapter)
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn current_work(&self) -> Option<WorkDetail> {
        self.inner.lock().await.work.clone()
    }

    pub async fn has_unsaved_changes(&self) -> bool {
        self.inner.lock().await.dirty
    }

    /// Counts over the working copy, unsaved edits included.
    pub async fn stats(&self) -> Option<WorkStats> {
        let inner = self.inner.lock().await;
        inner
            .work
            .as_ref()
            .map(|work| WorkStats::of(&work.config, &work.content))
    }

    /// Stop the timer and drop the working copy. Unsaved edits are lost.
    pub async fn destroy(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        let mut inner = self.inner.lock().await;
        if inner.dirty {
            tracing::debug!("destroying editor session with unsaved changes");
        }
        inner.state = SessionState::Destroyed;
        inner.work = None;
        inner.dirty = false;
    }
}

impl<B: StorageBackend + 'static> Drop for EditorSession<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

fn ensure_editable(state: SessionState) -> Result<()> {
    match state {
        SessionState::Ready | SessionState::Saving => Ok(()),
        other => Err(CwriterError::Session(format!(
            "session is not editable in state {:?}",
            other
        ))),
    }
}

async fn persist<B: StorageBackend + 'static>(
    store: &DocumentStore<B>,
    inner: &Mutex<SessionInner>,
    trigger: SaveTrigger,
) -> Result<bool> {
    let (user, work_id, patch, revision) = {
        let mut guard = inner.lock().await;
        let allowed = match guard.state {
            SessionState::Ready => true,
            SessionState::Saving => trigger == SaveTrigger::Manual,
            _ => false,
        };
        if !allowed {
            return match trigger {
                SaveTrigger::Timer => Ok(false),
                SaveTrigger::Manual => Err(CwriterError::Session(format!(
                    "cannot save in state {:?}",
                    guard.state
                ))),
            };
        }
        if !guard.dirty {
            return Ok(false);
        }
        let Some(work) = guard.work.as_ref() else {
            return Ok(false);
        };
        let snapshot = (
            guard.user.clone(),
            work.config.id.clone(),
            WorkContentPatch::full(&work.content)?,
            guard.revision,
        );
        guard.state = SessionState::Saving;
        snapshot
    };

    let result = store
        .save_work_content(Some(user.as_str()), &work_id, patch)
        .await;

    let mut guard = inner.lock().await;
    if guard.state == SessionState::Saving {
        guard.state = SessionState::Ready;
    }
    let config = result?;
    if guard.revision == revision {
        guard.dirty = false;
    }
    if let Some(work) = guard.work.as_mut() {
        work.config = config;
    }
    Ok(true)
}
