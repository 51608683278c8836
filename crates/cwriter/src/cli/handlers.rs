//! Command handlers for the cwriter CLI.
//!
//! Each handler makes one store call, then passes the result to
//! [`render::emit`] with the matching view. Errors bubble up as `anyhow`
//! errors and become a non-zero exit in `main`.

use super::render::{self, OutputMode};
use anyhow::Context;
use cwriterapp::config::CwriterConfig;
use cwriterapp::model::NewWork;
use cwriterapp::store::work_store::DocumentStore;
use serde_json::json;

/// Everything a handler needs: the opened store plus the global flags.
pub struct AppState {
    pub store: DocumentStore,
    pub config: CwriterConfig,
    pub user: Option<String>,
    pub output_mode: OutputMode,
}

impl AppState {
    fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn emit_message(&self, message: &str, value: serde_json::Value) -> anyhow::Result<()> {
        render::emit(self.output_mode, &value, |_| render::success(message))
    }
}

// --- Setup ---

pub async fn init(state: &AppState) -> anyhow::Result<()> {
    state
        .store
        .init()
        .await
        .context("failed to initialize data directory")?;
    let user = state.store.user_config(state.user()).await?;

    let location = match state.config.data_dir() {
        Ok(dir) if state.store.storage_type() != "kv-fallback" => dir.display().to_string(),
        _ => "key-value storage".to_string(),
    };
    state.emit_message(
        &format!(
            "Initialized {} store at {} for user {}",
            state.store.storage_type(),
            location,
            user.id
        ),
        json!({
            "storage_type": state.store.storage_type(),
            "location": location,
            "user_id": user.id,
        }),
    )
}

// --- Works ---

pub async fn works_list(state: &AppState) -> anyhow::Result<()> {
    let works = state.store.get_user_works(state.user()).await?;
    render::emit(state.output_mode, &works, |works| render::works_view(works))
}

pub async fn works_show(state: &AppState, id: &str) -> anyhow::Result<()> {
    let work = state.store.get_work_detail(state.user(), id).await?;
    render::emit(state.output_mode, &work, render::work_detail_view)
}

pub async fn works_create(
    state: &AppState,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
) -> anyhow::Result<()> {
    let input = NewWork {
        title,
        description,
        initial_content: content,
        ..Default::default()
    };
    let work = state.store.create_work(state.user(), input).await?;
    match state.output_mode {
        OutputMode::Json => render::emit(state.output_mode, &work, |_| String::new()),
        OutputMode::Term => state.emit_message(
            &format!("Created work {} ({})", work.id, work.title),
            json!({}),
        ),
    }
}

pub async fn works_delete(state: &AppState, id: &str) -> anyhow::Result<()> {
    state.store.delete_work(state.user(), id).await?;
    state.emit_message(
        &format!("Deleted work {}", id),
        json!({ "deleted": id }),
    )
}

// --- Reports ---

pub async fn stats(state: &AppState) -> anyhow::Result<()> {
    let stats = state.store.get_user_stats(state.user()).await?;
    render::emit(state.output_mode, &stats, render::stats_view)
}

pub async fn doctor(state: &AppState) -> anyhow::Result<()> {
    let report = state.store.doctor(state.user()).await?;
    render::emit(state.output_mode, &report, render::sync_report_view)
}

pub async fn log(state: &AppState, limit: Option<usize>) -> anyhow::Result<()> {
    let mut entries = state.store.operation_log(state.user()).await?;
    if let Some(limit) = limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }
    render::emit(state.output_mode, &entries, |entries| render::log_view(entries))
}

// --- Backups ---

pub async fn backup_create(state: &AppState) -> anyhow::Result<()> {
    let backup = state.store.create_backup(state.user()).await?;
    state.emit_message(
        &format!(
            "Created backup {} ({} works)",
            backup.id,
            backup.data.works.len()
        ),
        json!({
            "id": backup.id,
            "created_at": backup.created_at,
            "size": backup.size,
        }),
    )
}

pub async fn backup_list(state: &AppState) -> anyhow::Result<()> {
    let backups = state.store.list_backups(state.user()).await?;
    render::emit(state.output_mode, &backups, |backups| {
        render::backups_view(backups)
    })
}

pub async fn backup_restore(state: &AppState, id: &str) -> anyhow::Result<()> {
    let config = state.store.restore_backup(state.user(), id).await?;
    // Re-list so the restored index is reconciled against storage.
    let works = state.store.get_user_works(Some(config.id.as_str())).await?;
    state.emit_message(
        &format!("Restored backup {} ({} works)", id, works.len()),
        json!({ "restored": id, "works": works.len() }),
    )
}

pub async fn cleanup(
    state: &AppState,
    max_logs: Option<usize>,
    max_backups: Option<usize>,
) -> anyhow::Result<()> {
    let report = state
        .store
        .cleanup_old_data(
            max_logs.unwrap_or(state.config.max_logs),
            max_backups.unwrap_or(state.config.max_backups),
        )
        .await?;
    render::emit(state.output_mode, &report, render::cleanup_view)
}
