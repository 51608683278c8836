//! # Rendering
//!
//! Every handler produces a plain value and hands it to [`emit`], which
//! prints it as pretty JSON in `--json` mode or passes it through one of the
//! `*_view` functions below for the terminal.
//!
//! The view functions are pure (`&T -> String`) so they can be tested with
//! canned values. Styling goes through `console`, which drops the escape
//! codes on its own when stdout is not a terminal.
//!
//! ## Works Table
//!
//! - `id` (`COL_ID`): work id, dimmed
//! - `title` (fill): truncated to the remaining width
//! - `chapters` (`COL_CHAPTERS`, right-aligned)
//! - `time_ago` (`COL_TIME`, right-aligned): last update

use chrono::{DateTime, Utc};
use console::style;
use cwriterapp::model::{
    BackupEntry, CleanupReport, OperationLogEntry, SyncReport, UserStats, WorkDetail, WorkSummary,
};
use serde::Serialize;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const LINE_WIDTH: usize = 100;

pub const COL_ID: usize = 15;
pub const COL_CHAPTERS: usize = 6;
pub const COL_TIME: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Term,
    Json,
}

impl OutputMode {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Term
        }
    }
}

/// Print `value` in the requested mode.
pub fn emit<T, F>(mode: OutputMode, value: &T, view: F) -> anyhow::Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    match mode {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputMode::Term => {
            let text = view(value);
            if !text.is_empty() {
                println!("{}", text.trim_end());
            }
        }
    }
    Ok(())
}

pub fn success(message: &str) -> String {
    style(message).green().to_string()
}

// --- Works ---

pub fn works_view(works: &[WorkSummary]) -> String {
    if works.is_empty() {
        return format!(
            "No works yet. Create one with {}",
            style("cwriter works create --title <TITLE>").bold()
        );
    }

    let title_width = LINE_WIDTH.saturating_sub(COL_ID + COL_CHAPTERS + COL_TIME + 3);
    let mut out = String::new();
    for work in works {
        let title = if work.title.trim().is_empty() {
            "(untitled)".to_string()
        } else {
            truncate_to_width(&work.title, title_width)
        };
        let time = work
            .sort_key()
            .map(format_time_ago)
            .unwrap_or_default();
        out.push_str(&format!(
            "{} {} {} {}\n",
            style(pad_to_width(&work.id, COL_ID)).dim(),
            pad_to_width(&title, title_width),
            pad_left(&format!("{} ch", work.chapter_count), COL_CHAPTERS),
            style(pad_left(&time, COL_TIME)).dim().italic(),
        ));
    }
    out
}

pub fn work_detail_view(work: &WorkDetail) -> String {
    let config = &work.config;
    let content = &work.content;
    let mut out = String::new();

    out.push_str(&format!(
        "{} {}\n",
        style(&config.title).bold(),
        style(format!("[{}]", config.id)).dim()
    ));
    if !config.description.is_empty() {
        out.push_str(&format!("{}\n", config.description));
    }
    out.push_str(&format!(
        "{} · {} · updated {}\n",
        config.category,
        config.structure_type,
        format_time_ago(config.updated_at).trim()
    ));
    out.push('\n');

    out.push_str(&format!(
        "Manuscript   {} words\n",
        content.manuscript.word_count
    ));
    out.push_str(&format!("Chapters     {}\n", content.chapters.len()));
    for chapter in &content.chapters {
        out.push_str(&format!(
            "  {} {}\n",
            style("•").dim(),
            truncate_to_width(&chapter.title, LINE_WIDTH - 4)
        ));
    }
    out.push_str(&format!("Characters   {}\n", content.characters.len()));
    out.push_str(&format!("Settings     {}\n", content.settings.len()));
    out.push_str(&format!("Glossary     {}\n", content.glossary.len()));
    out.push_str(&format!("Foreshadowing {}\n", content.foreshadowing.len()));
    out.push_str(&format!("Maps         {}\n", content.map_data.len()));
    out
}

// --- Reports ---

pub fn stats_view(stats: &UserStats) -> String {
    let rows = [
        ("Works", stats.total_works.to_string()),
        ("Words", stats.total_words.to_string()),
        ("Characters", stats.total_characters.to_string()),
        ("Maps", stats.total_maps.to_string()),
        ("Files", stats.total_files.to_string()),
        ("Storage", format_bytes(stats.storage_used)),
        ("Backend", stats.storage_type.clone()),
    ];
    rows.iter()
        .map(|(label, value)| format!("{}{}\n", style(format!("{:<12}", label)).bold(), value))
        .collect()
}

pub fn backups_view(backups: &[BackupEntry]) -> String {
    if backups.is_empty() {
        return "No backups.".to_string();
    }
    backups
        .iter()
        .map(|backup| {
            format!(
                "{} {:>10} {}\n",
                style(pad_to_width(&backup.id, COL_ID)).dim(),
                format_bytes(backup.size),
                style(format_time_ago(backup.created_at)).dim().italic()
            )
        })
        .collect()
}

pub fn log_view(entries: &[OperationLogEntry]) -> String {
    if entries.is_empty() {
        return "No operations logged.".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            let detail = match entry.data.get("work_id").and_then(|v| v.as_str()) {
                Some(work_id) => format!(" {}", style(work_id).dim()),
                None => String::new(),
            };
            format!(
                "{} {}{}\n",
                style(entry.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
                entry.operation,
                detail
            )
        })
        .collect()
}

pub fn sync_report_view(report: &SyncReport) -> String {
    if !report.changed() && report.skipped == 0 {
        return success("Index is consistent with storage.");
    }
    let mut out = String::new();
    if report.changed() {
        out.push_str(&format!(
            "{}\n",
            success(&format!(
                "Repaired index: {} added, {} refreshed, {} removed.",
                report.added, report.refreshed, report.removed
            ))
        ));
    }
    if report.skipped > 0 {
        out.push_str(&format!(
            "{}\n",
            style(format!(
                "Skipped {} work folder(s) without a readable config.",
                report.skipped
            ))
            .yellow()
        ));
    }
    out
}

pub fn cleanup_view(report: &CleanupReport) -> String {
    success(&format!(
        "Trimmed {} log entr{} and deleted {} backup{}.",
        report.logs_trimmed,
        if report.logs_trimmed == 1 { "y" } else { "ies" },
        report.backups_deleted,
        if report.backups_deleted == 1 { "" } else { "s" }
    ))
}

// --- Helpers ---

pub fn truncate_to_width(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;
    for c in s.chars() {
        let char_width = c.width().unwrap_or(0);
        if current_width + char_width > max_width.saturating_sub(1) {
            break;
        }
        result.push(c);
        current_width += char_width;
    }
    result.push('…');
    result
}

fn pad_to_width(s: &str, width: usize) -> String {
    let fill = width.saturating_sub(s.width());
    format!("{}{}", s, " ".repeat(fill))
}

fn pad_left(s: &str, width: usize) -> String {
    let fill = width.saturating_sub(s.width());
    format!("{}{}", " ".repeat(fill), s)
}

fn format_time_ago(timestamp: DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(timestamp);
    let formatter = timeago::Formatter::new();
    formatter.convert(duration.to_std().unwrap_or_default())
}

fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
