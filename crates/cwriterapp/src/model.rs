//! # Domain Model
//!
//! Every document the store persists, plus the input and report types its
//! operations exchange with callers.
//!
//! ## Canonical vs Denormalized
//!
//! A work is described twice:
//!
//! - [`WorkConfig`] (`work.config.json`) is canonical. It lives inside the work's
//!   own directory and disappears with it.
//! - [`WorkSummary`] is a denormalized copy embedded in [`UserConfig::works`], so
//!   listings never have to open per-work files. The index synchronizer keeps the
//!   two in step.
//!
//! ## Forward Compatibility
//!
//! Documents written by other app versions may carry keys this crate does not
//! know. The extensible documents keep those keys in a flattened `extra` map so a
//! read-modify-write cycle never drops them.
//!
//! ## Word Counting
//!
//! [`word_count`] counts each CJK ideograph (and kana / Hangul syllable) as one
//! word and each run of other non-whitespace characters as one word. CJK
//! punctuation separates words without being counted. Prose written in Chinese
//! and prose written in English both get a natural count:
//!
//! ```text
//! "hello world"   -> 2
//! "你好，世界"      -> 4
//! "第1章 start"    -> 4   (第, 1, 章, start)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const DEFAULT_WORK_TITLE: &str = "Untitled Work";
pub const DEFAULT_CHAPTER_TITLE: &str = "New Chapter";
pub const DEFAULT_FORESHADOWING_TITLE: &str = "New Foreshadowing";
pub const DEFAULT_ENTITY_NAME: &str = "Unnamed";
pub const DEFAULT_CATEGORY: &str = "novel";
pub const DEFAULT_STRUCTURE_TYPE: &str = "single";
pub const DEFAULT_GLOSSARY_CATEGORY: &str = "character";
pub const DEFAULT_GLOSSARY_COLOR: &str = "#FF6B35";
pub const FILE_STRUCTURE_VERSION: &str = "v2";
pub const GLOBAL_CONFIG_VERSION: &str = "2.0.0";
pub const DEFAULT_AUTOSAVE_SECS: u64 = 30;

/// Chapter length accepted by the import pipeline. Advisory: the store itself
/// never enforces it.
pub const MAX_CHAPTER_CHARS: usize = 20_000;

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_structure_type() -> String {
    DEFAULT_STRUCTURE_TYPE.to_string()
}

fn default_file_structure() -> String {
    FILE_STRUCTURE_VERSION.to_string()
}

fn default_glossary_category() -> String {
    DEFAULT_GLOSSARY_CATEGORY.to_string()
}

fn default_glossary_color() -> String {
    DEFAULT_GLOSSARY_COLOR.to_string()
}

fn default_autosave() -> u64 {
    DEFAULT_AUTOSAVE_SECS
}

fn default_true() -> bool {
    true
}

// --- Global & User ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalUserEntry {
    pub created_at: DateTime<Utc>,
}

/// `global.config.json`: registry of users plus per-user log/backup counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub version: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub users: BTreeMap<String, GlobalUserEntry>,
    #[serde(default)]
    pub logs_count: BTreeMap<String, u64>,
    #[serde(default)]
    pub backups_count: BTreeMap<String, u64>,
    #[serde(default)]
    pub storage_type: String,
}

impl GlobalConfig {
    pub fn new(storage_type: &str) -> Self {
        Self {
            version: GLOBAL_CONFIG_VERSION.to_string(),
            created_at: Utc::now(),
            users: BTreeMap::new(),
            logs_count: BTreeMap::new(),
            backups_count: BTreeMap::new(),
            storage_type: storage_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(rename = "autoSaveInterval", default = "default_autosave")]
    pub auto_save_interval: u64,
    #[serde(rename = "lastLogin", default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_save_interval: DEFAULT_AUTOSAVE_SECS,
            last_login: Some(Utc::now()),
            extra: Map::new(),
        }
    }
}

/// `user.config.json`: per-user settings and the work index.
///
/// `works` is keyed by work id. Ids are fixed-width millisecond timestamps, so
/// key order is creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub works: BTreeMap<String, WorkSummary>,
}

impl UserConfig {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: user_id.to_string(),
            created_at: now,
            updated_at: now,
            preferences: Preferences::default(),
            works: BTreeMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// --- Works ---

/// Input for creating a work. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewWork {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub structure_type: Option<String>,
    #[serde(default, alias = "initialContent")]
    pub initial_content: Option<String>,
}

impl NewWork {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// `work.config.json`: canonical metadata of one work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkConfig {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_structure_type")]
    pub structure_type: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_file_structure")]
    pub file_structure: String,
    #[serde(default)]
    pub local_file_path: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkConfig {
    pub fn new(id: &str, input: &NewWork, local_file_path: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            title: non_blank(input.title.as_deref()).unwrap_or(DEFAULT_WORK_TITLE).to_string(),
            description: input.description.clone().unwrap_or_default(),
            category: non_blank(input.category.as_deref())
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
            structure_type: non_blank(input.structure_type.as_deref())
                .unwrap_or(DEFAULT_STRUCTURE_TYPE)
                .to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
            file_structure: FILE_STRUCTURE_VERSION.to_string(),
            local_file_path: local_file_path.to_string(),
            extra: Map::new(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Denormalized listing entry embedded in [`UserConfig::works`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_structure_type")]
    pub structure_type: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub local_file_path: String,
    #[serde(default)]
    pub chapter_count: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkSummary {
    pub fn from_config(config: &WorkConfig, chapter_count: usize) -> Self {
        Self {
            id: config.id.clone(),
            title: config.title.clone(),
            description: config.description.clone(),
            category: config.category.clone(),
            structure_type: config.structure_type.clone(),
            is_active: config.is_active,
            created_at: Some(config.created_at),
            updated_at: Some(config.updated_at),
            local_file_path: config.local_file_path.clone(),
            chapter_count,
            extra: Map::new(),
        }
    }

    /// Refresh the fields a listing shows. Returns whether anything changed.
    /// Fields that only exist on the summary (`chapter_count`, extras) survive.
    pub fn refresh_listing_fields(&mut self, config: &WorkConfig) -> bool {
        let before = (
            self.title.clone(),
            self.description.clone(),
            self.category.clone(),
            self.updated_at,
        );
        self.title = config.title.clone();
        self.description = config.description.clone();
        self.category = config.category.clone();
        self.updated_at = Some(config.updated_at);
        before
            != (
                self.title.clone(),
                self.description.clone(),
                self.category.clone(),
                self.updated_at,
            )
    }

    /// Copy every mutable field of `config`, after an explicit update.
    pub fn sync_from(&mut self, config: &WorkConfig) {
        self.refresh_listing_fields(config);
        self.structure_type = config.structure_type.clone();
        self.is_active = config.is_active;
        if self.created_at.is_none() {
            self.created_at = Some(config.created_at);
        }
        if self.local_file_path.is_empty() {
            self.local_file_path = config.local_file_path.clone();
        }
    }

    /// Listing order key: `updated_at`, else `created_at`.
    pub fn sort_key(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }
}

/// Sort newest first. Stable, so equal keys keep their map order; entries
/// without any timestamp go last.
pub fn sort_summaries(works: &mut [WorkSummary]) {
    works.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
}

// --- Work content ---

/// `settings/manuscript.json`.
///
/// Older writers stored the body under `text`, sometimes next to `content`.
/// Decoding folds `text` into `content` (a present `content` wins) and only
/// `content` is written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ManuscriptRecord")]
pub struct Manuscript {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manuscript {
    pub fn new(title: &str, content: &str) -> Self {
        Self {
            title: title.to_string(),
            content: content.to_string(),
            word_count: word_count(content),
            last_modified: Some(Utc::now()),
            extra: Map::new(),
        }
    }

    pub fn recount(&mut self) {
        self.word_count = word_count(&self.content);
    }

    /// Rename a patch's `text` key to `content`. A `content` key already in
    /// the patch wins.
    pub fn normalize_patch(patch: &Value) -> Value {
        let mut patch = patch.clone();
        if let Some(obj) = patch.as_object_mut() {
            if let Some(text) = obj.remove("text") {
                obj.entry("content").or_insert(text);
            }
        }
        patch
    }
}

#[derive(Deserialize)]
struct ManuscriptRecord {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    word_count: usize,
    #[serde(default)]
    last_modified: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<ManuscriptRecord> for Manuscript {
    fn from(record: ManuscriptRecord) -> Self {
        Self {
            title: record.title,
            content: record.content.or(record.text).unwrap_or_default(),
            word_count: record.word_count,
            last_modified: record.last_modified,
            extra: record.extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A character or a world setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryItem {
    pub id: String,
    #[serde(default)]
    pub work_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "default_glossary_category")]
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_glossary_color")]
    pub color_code: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlossaryInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color_code: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Foreshadowing {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeshadowingInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// All sub-documents of a work, as one aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkContent {
    #[serde(default)]
    pub manuscript: Manuscript,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub characters: Vec<NamedEntity>,
    #[serde(default)]
    pub settings: Vec<NamedEntity>,
    #[serde(default)]
    pub glossary: Vec<GlossaryItem>,
    #[serde(default)]
    pub foreshadowing: Vec<Foreshadowing>,
    #[serde(default)]
    pub map_data: Vec<Value>,
}

/// A partial content update: only the present sub-documents are written.
///
/// `manuscript` is a JSON object merged onto the stored manuscript; the
/// sequences replace their stored counterparts wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkContentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manuscript: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<Chapter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<Vec<NamedEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Vec<NamedEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossary: Option<Vec<GlossaryItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreshadowing: Option<Vec<Foreshadowing>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_data: Option<Vec<Value>>,
}

impl WorkContentPatch {
    /// A patch that rewrites every sub-document from `content`.
    pub fn full(content: &WorkContent) -> crate::error::Result<Self> {
        Ok(Self {
            manuscript: Some(serde_json::to_value(&content.manuscript)?),
            chapters: Some(content.chapters.clone()),
            characters: Some(content.characters.clone()),
            settings: Some(content.settings.clone()),
            glossary: Some(content.glossary.clone()),
            foreshadowing: Some(content.foreshadowing.clone()),
            map_data: Some(content.map_data.clone()),
        })
    }

    pub fn manuscript_text(text: impl Into<String>) -> Self {
        Self {
            manuscript: Some(serde_json::json!({ "content": text.into() })),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// [`WorkConfig`] plus every sub-document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkDetail {
    #[serde(flatten)]
    pub config: WorkConfig,
    pub content: WorkContent,
}

/// Read-only view handed to the export pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullWorkData {
    #[serde(flatten)]
    pub config: WorkConfig,
    pub chapters: Vec<Chapter>,
}

// --- Journal ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub id: String,
    pub user_id: String,
    pub operation: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    pub user_id: String,
    pub data: UserConfig,
    pub created_at: DateTime<Utc>,
    pub size: usize,
    #[serde(default)]
    pub backup_type: String,
}

/// One line of `backups/{user}/manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub size: usize,
}

// --- Reports ---

/// Counts for one work, from storage or from an editor's working copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStats {
    pub work_id: String,
    /// Words in the manuscript plus every chapter.
    pub word_count: usize,
    /// Characters of the same text.
    pub text_length: usize,
    pub chapter_count: usize,
    pub character_count: usize,
    pub setting_count: usize,
    pub map_count: usize,
    pub last_modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
    /// Stored documents and their bytes. Zero for a working copy.
    #[serde(default)]
    pub file_count: usize,
    #[serde(default)]
    pub storage_used: usize,
}

impl WorkStats {
    pub fn of(config: &WorkConfig, content: &WorkContent) -> Self {
        let texts = std::iter::once(content.manuscript.content.as_str())
            .chain(content.chapters.iter().map(|chapter| chapter.content.as_str()));
        let (words, length) = texts.fold((0, 0), |(words, length), text| {
            (words + word_count(text), length + text.chars().count())
        });
        Self {
            work_id: config.id.clone(),
            word_count: words,
            text_length: length,
            chapter_count: content.chapters.len(),
            character_count: content.characters.len(),
            setting_count: content.settings.len(),
            map_count: content.map_data.len(),
            last_modified: config.updated_at,
            created: config.created_at,
            file_count: 0,
            storage_used: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_works: usize,
    pub total_words: usize,
    pub total_characters: usize,
    pub total_maps: usize,
    pub total_files: usize,
    pub storage_used: usize,
    pub storage_type: String,
}

impl UserStats {
    pub fn add_work(&mut self, work: &WorkStats) {
        self.total_words += work.word_count;
        self.total_characters += work.text_length;
        self.total_maps += work.map_count;
        self.total_files += work.file_count;
        self.storage_used += work.storage_used;
    }
}

/// Outcome of one index reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Works found on storage but missing from the index.
    pub added: usize,
    /// Index entries whose listing fields were stale.
    pub refreshed: usize,
    /// Index entries without a readable work config.
    pub removed: usize,
    /// Work directories whose config was missing or corrupt.
    pub skipped: usize,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        self.added + self.refreshed + self.removed > 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub logs_trimmed: usize,
    pub backups_deleted: usize,
}

// --- Counting ---

fn is_cjk_letter(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF      // hiragana, katakana
        | 0x3400..=0x4DBF    // CJK extension A
        | 0x4E00..=0x9FFF    // CJK unified ideographs
        | 0xAC00..=0xD7AF    // hangul syllables
        | 0xF900..=0xFAFF    // compatibility ideographs
        | 0x20000..=0x2FA1F) // extensions B..
}

fn is_cjk_punctuation(c: char) -> bool {
    matches!(c as u32, 0x3000..=0x303F | 0xFF00..=0xFF0F | 0xFF1A..=0xFF20 | 0xFF3B..=0xFF40 | 0xFF5B..=0xFF65)
}

/// Count words in manuscript text. See the module docs for the rules.
pub fn word_count(text: &str) -> usize {
    let mut count = 0;
    let mut in_run = false;
    for c in text.chars() {
        if c.is_whitespace() || is_cjk_punctuation(c) {
            in_run = false;
        } else if is_cjk_letter(c) {
            count += 1;
            in_run = false;
        } else if !in_run {
            count += 1;
            in_run = true;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_word_count_latin() {
        assert_eq!(word_count("hello world"), 2);
        assert_eq!(word_count("  hello\n\nworld  "), 2);
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn test_word_count_cjk() {
        assert_eq!(word_count("你好，世界"), 4);
        assert_eq!(word_count("你好 world"), 3);
        assert_eq!(word_count("第1章 start"), 4);
    }

    #[test]
    fn test_work_config_defaults() {
        let config = WorkConfig::new("1", &NewWork::default(), "users/u/works/1");
        assert_eq!(config.title, DEFAULT_WORK_TITLE);
        assert_eq!(config.category, "novel");
        assert_eq!(config.structure_type, "single");
        assert!(config.is_active);
        assert_eq!(config.file_structure, "v2");
    }

    #[test]
    fn test_blank_title_uses_default() {
        let config = WorkConfig::new("1", &NewWork::titled("   "), "p");
        assert_eq!(config.title, DEFAULT_WORK_TITLE);
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let raw = json!({
            "id": "1",
            "title": "T",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "cover": "cover.png"
        });
        let config: WorkConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.extra.get("cover"), Some(&json!("cover.png")));
        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["cover"], json!("cover.png"));
    }

    #[test]
    fn test_manuscript_accepts_text_alias() {
        let m: Manuscript = serde_json::from_value(json!({"text": "legacy body"})).unwrap();
        assert_eq!(m.content, "legacy body");
        assert!(m.extra.is_empty());
    }

    #[test]
    fn test_manuscript_with_text_and_content_prefers_content() {
        let m: Manuscript = serde_json::from_value(json!({
            "title": "T",
            "content": "chapter one body",
            "text": "stale body",
            "word_count": 3,
            "mood": "dark"
        }))
        .unwrap();
        assert_eq!(m.content, "chapter one body");
        assert_eq!(m.extra.get("mood"), Some(&json!("dark")));

        let back = serde_json::to_value(&m).unwrap();
        assert!(back.get("text").is_none());
        assert_eq!(back["content"], json!("chapter one body"));
    }

    #[test]
    fn test_manuscript_patch_accepts_text_key() {
        let patch = Manuscript::normalize_patch(&json!({"text": "hi"}));
        assert_eq!(patch, json!({"content": "hi"}));
        let both = Manuscript::normalize_patch(&json!({"text": "old", "content": "new"}));
        assert_eq!(both, json!({"content": "new"}));
    }

    #[test]
    fn test_refresh_listing_fields_keeps_summary_only_fields() {
        let mut config = WorkConfig::new("1", &NewWork::titled("Old"), "p");
        let mut summary = WorkSummary::from_config(&config, 7);
        summary.extra.insert("pinned".into(), json!(true));

        config.title = "New".into();
        config.updated_at = config.updated_at + Duration::seconds(5);
        assert!(summary.refresh_listing_fields(&config));
        assert_eq!(summary.title, "New");
        assert_eq!(summary.chapter_count, 7);
        assert_eq!(summary.extra.get("pinned"), Some(&json!(true)));

        assert!(!summary.refresh_listing_fields(&config));
    }

    #[test]
    fn test_sort_summaries_newest_first_and_stable() {
        let base = Utc::now();
        let mk = |id: &str, updated: Option<i64>, created: Option<i64>| WorkSummary {
            id: id.into(),
            title: id.into(),
            description: String::new(),
            category: default_category(),
            structure_type: default_structure_type(),
            is_active: true,
            created_at: created.map(|s| base + Duration::seconds(s)),
            updated_at: updated.map(|s| base + Duration::seconds(s)),
            local_file_path: String::new(),
            chapter_count: 0,
            extra: Map::new(),
        };
        let mut works = vec![
            mk("a", Some(10), None),
            mk("b", None, Some(20)),
            mk("c", Some(10), None),
            mk("d", None, None),
            mk("e", Some(30), None),
        ];
        sort_summaries(&mut works);
        let ids: Vec<&str> = works.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["e", "b", "a", "c", "d"]);
    }

    #[test]
    fn test_work_stats_counts_manuscript_and_chapters() {
        let config = WorkConfig::new("1", &NewWork::titled("T"), "p");
        let now = Utc::now();
        let content = WorkContent {
            manuscript: Manuscript::new("T", "hello world"),
            chapters: vec![Chapter {
                id: "c1".into(),
                title: "One".into(),
                content: "你好".into(),
                created_at: now,
                updated_at: now,
                extra: Map::new(),
            }],
            map_data: vec![json!({"name": "north"})],
            ..Default::default()
        };

        let stats = WorkStats::of(&config, &content);
        assert_eq!(stats.work_id, "1");
        assert_eq!(stats.word_count, 4);
        assert_eq!(stats.text_length, 13);
        assert_eq!(stats.chapter_count, 1);
        assert_eq!(stats.character_count, 0);
        assert_eq!(stats.map_count, 1);
        assert_eq!(stats.created, config.created_at);
        assert_eq!(stats.file_count, 0);

        let mut totals = UserStats::default();
        totals.add_work(&stats);
        totals.add_work(&stats);
        assert_eq!(totals.total_words, 8);
        assert_eq!(totals.total_maps, 2);
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(WorkContentPatch::default().is_empty());
        assert!(!WorkContentPatch::manuscript_text("x").is_empty());
    }
}
