use super::backend::{AnyBackend, StorageBackend};
use super::documents::{
    decode_document, read_document, read_or_default, register_user, update_global_config,
    write_document, Document,
};
use super::journal::OperationLog;
use super::locks::UserLocks;
use crate::config::CwriterConfig;
use crate::error::{CwriterError, Result};
use crate::ids::IdGenerator;
use crate::merge::deep_merge;
use crate::model::{
    Chapter, ChapterInput, EntityInput, Foreshadowing, ForeshadowingInput, FullWorkData,
    GlossaryInput, GlossaryItem, Manuscript, NamedEntity, NewWork, UserConfig, UserStats,
    WorkConfig, WorkContent, WorkContentPatch, WorkDetail, WorkStats, WorkSummary,
    DEFAULT_CHAPTER_TITLE,
    DEFAULT_ENTITY_NAME, DEFAULT_FORESHADOWING_TITLE, DEFAULT_GLOSSARY_CATEGORY,
    DEFAULT_GLOSSARY_COLOR,
};
use crate::paths::{
    global_config_path, user_config_path, work_paths, UserId, WorkPaths, BACKUPS_DIR, LOGS_DIR,
    USERS_DIR,
};
use crate::platform::{resolve_platform, select_backend, CapabilityProbe};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Operation log entries kept per user.
    pub log_capacity: usize,
    /// Recorded on every log entry.
    pub user_agent: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            log_capacity: 1000,
            user_agent: format!("cwriter/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &CwriterConfig) -> Self {
        Self {
            log_capacity: config.log_capacity,
            ..Default::default()
        }
    }
}

/// The document store: every read and write of user, work and journal
/// documents goes through here.
///
/// Share it with `Arc`. Call [`init`](Self::init) once before use and
/// [`dispose`](Self::dispose) before shutdown so pending log writes land.
pub struct DocumentStore<B: StorageBackend = AnyBackend> {
    pub(crate) backend: Arc<B>,
    pub(crate) locks: Arc<UserLocks>,
    pub(crate) ids: Arc<IdGenerator>,
    pub(crate) journal: OperationLog<B>,
    pub(crate) tasks: TaskTracker,
    pub(crate) disposed: AtomicBool,
}

impl DocumentStore<AnyBackend> {
    /// Pick a backend from `config` and `probe`, degrading to key-value
    /// storage when the filesystem is unusable.
    pub fn open(config: &CwriterConfig, probe: &dyn CapabilityProbe) -> Result<Self> {
        let platform = resolve_platform(config, probe)?;
        let backend = select_backend(platform, config);
        tracing::info!(%platform, backend = %backend.kind(), "opening document store");
        Ok(Self::new(backend, StoreOptions::from_config(config)))
    }
}

impl<B: StorageBackend + 'static> DocumentStore<B> {
    pub fn new(backend: B, options: StoreOptions) -> Self {
        let backend = Arc::new(backend);
        let locks = Arc::new(UserLocks::new());
        let ids = Arc::new(IdGenerator::new());
        let journal = OperationLog::new(backend.clone(), locks.clone(), ids.clone(), options);
        Self {
            backend,
            locks,
            ids,
            journal,
            tasks: TaskTracker::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn storage_type(&self) -> &'static str {
        self.backend.kind().as_str()
    }

    pub(crate) fn next_id(&self) -> String {
        self.ids.next_id()
    }

    /// Create the top-level directories, the global config and the default
    /// user. Safe to call repeatedly.
    pub async fn init(&self) -> Result<()> {
        for dir in [USERS_DIR, LOGS_DIR, BACKUPS_DIR] {
            self.backend.mkdir(dir).await?;
        }
        update_global_config(&*self.backend, &self.locks, self.storage_type(), |_| {}).await?;
        self.user_config(None).await?;
        tracing::debug!(storage_type = self.storage_type(), "store initialized");
        Ok(())
    }

    /// Stop accepting background log writes and wait for the pending ones.
    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Wait for every background log write issued so far.
    pub async fn flush_logs(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        if !self.disposed.load(Ordering::SeqCst) {
            self.tasks.reopen();
        }
    }

    pub async fn read_document<T: Document>(&self, path: &str, default: Option<T>) -> Result<Option<T>> {
        read_document(&*self.backend, path, default).await
    }

    pub async fn write_document<T: Document>(&self, path: &str, value: &T) -> Result<()> {
        write_document(&*self.backend, path, value).await
    }

    pub(crate) fn resolve_work(&self, user: &UserId, work_id: &str) -> Result<WorkPaths> {
        work_paths(user, Some(work_id))
            .ok_or_else(|| CwriterError::InvalidArgument(format!("invalid work id {:?}", work_id)))
    }

    pub(crate) async fn load_work_config(&self, paths: &WorkPaths) -> Result<WorkConfig> {
        read_document::<_, WorkConfig>(&*self.backend, &paths.config, None)
            .await?
            .ok_or_else(|| CwriterError::NotFound(format!("work {}", paths.work_id)))
    }

    // --- Users ---

    /// The user's config, provisioning the user on first access.
    pub async fn user_config(&self, user: Option<&str>) -> Result<UserConfig> {
        let user = UserId::resolve(user)?;
        let _guard = self.locks.lock_user(user.as_str()).await;
        self.load_user_config(&user).await
    }

    /// Caller must hold the user's lock.
    pub(crate) async fn load_user_config(&self, user: &UserId) -> Result<UserConfig> {
        let path = user_config_path(user);
        if let Some(config) = read_document::<_, UserConfig>(&*self.backend, &path, None).await? {
            return Ok(config);
        }

        let config = UserConfig::new(user.as_str());
        write_document(&*self.backend, &path, &config).await?;
        register_user(&*self.backend, &self.locks, self.storage_type(), user.as_str()).await?;
        tracing::info!(user_id = %user, "provisioned user");
        Ok(config)
    }

    /// Caller must hold the user's lock.
    pub(crate) async fn save_user_config(&self, user: &UserId, config: &mut UserConfig) -> Result<()> {
        config.touch();
        write_document(&*self.backend, &user_config_path(user), config).await
    }

    pub async fn update_preferences(&self, user: Option<&str>, patch: Value) -> Result<UserConfig> {
        let user = UserId::resolve(user)?;
        if !patch.is_object() {
            return Err(CwriterError::InvalidArgument(
                "preferences patch must be an object".to_string(),
            ));
        }

        let config = {
            let _guard = self.locks.lock_user(user.as_str()).await;
            let mut config = self.load_user_config(&user).await?;
            let mut value = serde_json::to_value(&config.preferences)?;
            deep_merge(&mut value, &patch);
            config.preferences = serde_json::from_value(value)
                .map_err(|e| CwriterError::InvalidArgument(format!("preferences: {}", e)))?;
            self.save_user_config(&user, &mut config).await?;
            config
        };

        self.log_operation(&user, "update_preferences", patch);
        Ok(config)
    }

    // --- Works ---

    pub async fn create_work(&self, user: Option<&str>, input: NewWork) -> Result<WorkConfig> {
        let user = UserId::resolve(user)?;
        let id = self.next_id();
        let paths = self.resolve_work(&user, &id)?;

        for dir in paths.subdirs() {
            self.backend.mkdir(&dir).await?;
        }

        let config = WorkConfig::new(&id, &input, &paths.root);
        self.write_document(&paths.config, &config).await?;

        let manuscript = Manuscript::new(&config.title, input.initial_content.as_deref().unwrap_or(""));
        self.write_document(&paths.manuscript, &manuscript).await?;
        let empty: Vec<Value> = Vec::new();
        for path in [
            &paths.chapters,
            &paths.characters,
            &paths.settings,
            &paths.glossary,
            &paths.foreshadowing,
            &paths.map_data,
        ] {
            self.write_document(path, &empty).await?;
        }

        self.register_summary(&user, WorkSummary::from_config(&config, 0))
            .await?;

        tracing::info!(user_id = %user, work_id = %id, title = %config.title, "created work");
        self.log_operation(
            &user,
            "create_work",
            json!({ "work_id": id, "title": config.title }),
        );
        Ok(config)
    }

    /// Deep-merge `patch` into the work config. `id`, `created_at` and
    /// `local_file_path` can't be changed this way.
    pub async fn update_work(&self, user: Option<&str>, work_id: &str, patch: Value) -> Result<WorkConfig> {
        let user = UserId::resolve(user)?;
        let paths = self.resolve_work(&user, work_id)?;
        if !patch.is_object() {
            return Err(CwriterError::InvalidArgument(
                "work patch must be an object".to_string(),
            ));
        }

        let current = self.load_work_config(&paths).await?;
        let mut value = serde_json::to_value(&current)?;
        deep_merge(&mut value, &patch);
        let mut updated: WorkConfig = serde_json::from_value(value)
            .map_err(|e| CwriterError::InvalidArgument(format!("work patch: {}", e)))?;

        updated.id = current.id;
        updated.created_at = current.created_at;
        updated.local_file_path = current.local_file_path;
        updated.updated_at = Utc::now();

        self.write_document(&paths.config, &updated).await?;
        self.refresh_summary(&user, &updated, None).await?;

        tracing::debug!(user_id = %user, work_id, "updated work");
        self.log_operation(&user, "update_work", json!({ "work_id": work_id, "patch": patch }));
        Ok(updated)
    }

    /// Remove a work: index entry first, then its files.
    pub async fn delete_work(&self, user: Option<&str>, work_id: &str) -> Result<()> {
        let user = UserId::resolve(user)?;
        let paths = self.resolve_work(&user, work_id)?;

        if !self.remove_summary(&user, &paths.work_id).await? {
            return Err(CwriterError::NotFound(format!("work {}", work_id)));
        }
        if !self.backend.delete_dir(&paths.root).await {
            tracing::warn!(user_id = %user, work_id, "work files were already gone");
        }

        tracing::info!(user_id = %user, work_id, "deleted work");
        self.log_operation(&user, "delete_work", json!({ "work_id": work_id }));
        Ok(())
    }

    pub async fn get_work_detail(&self, user: Option<&str>, work_id: &str) -> Result<WorkDetail> {
        let user = UserId::resolve(user)?;
        let paths = self.resolve_work(&user, work_id)?;
        let config = self.load_work_config(&paths).await?;
        let content = self.load_content(&paths).await;
        Ok(WorkDetail { config, content })
    }

    async fn load_content(&self, paths: &WorkPaths) -> WorkContent {
        let backend = &*self.backend;
        WorkContent {
            manuscript: read_or_default(backend, &paths.manuscript).await,
            chapters: read_or_default(backend, &paths.chapters).await,
            characters: read_or_default(backend, &paths.characters).await,
            settings: read_or_default(backend, &paths.settings).await,
            glossary: read_or_default(backend, &paths.glossary).await,
            foreshadowing: read_or_default(backend, &paths.foreshadowing).await,
            map_data: read_or_default(backend, &paths.map_data).await,
        }
    }

    /// Write the sub-documents present in `patch`, leaving the others alone.
    pub async fn save_work_content(
        &self,
        user: Option<&str>,
        work_id: &str,
        patch: WorkContentPatch,
    ) -> Result<WorkConfig> {
        let user = UserId::resolve(user)?;
        let paths = self.resolve_work(&user, work_id)?;
        let mut config = self.load_work_config(&paths).await?;
        let mut parts = Vec::new();

        if let Some(manuscript_patch) = &patch.manuscript {
            let manuscript = self.merge_manuscript(&paths, manuscript_patch).await?;
            self.write_document(&paths.manuscript, &manuscript).await?;
            parts.push("manuscript");
        }

        let mut chapter_count = None;
        if let Some(chapters) = &patch.chapters {
            self.write_document(&paths.chapters, chapters).await?;
            chapter_count = Some(chapters.len());
            parts.push("chapters");
        }
        if let Some(characters) = &patch.characters {
            self.write_document(&paths.characters, characters).await?;
            parts.push("characters");
        }
        if let Some(settings) = &patch.settings {
            self.write_document(&paths.settings, settings).await?;
            parts.push("settings");
        }
        if let Some(glossary) = &patch.glossary {
            self.write_document(&paths.glossary, glossary).await?;
            parts.push("glossary");
        }
        if let Some(foreshadowing) = &patch.foreshadowing {
            self.write_document(&paths.foreshadowing, foreshadowing).await?;
            parts.push("foreshadowing");
        }
        if let Some(map_data) = &patch.map_data {
            self.write_document(&paths.map_data, map_data).await?;
            parts.push("map_data");
        }

        self.touch_work(&user, &mut config, chapter_count).await?;

        tracing::debug!(user_id = %user, work_id, ?parts, "saved work content");
        self.log_operation(
            &user,
            "save_work_content",
            json!({ "work_id": work_id, "parts": parts }),
        );
        Ok(config)
    }

    async fn merge_manuscript(&self, paths: &WorkPaths, patch: &Value) -> Result<Manuscript> {
        let current: Manuscript = read_or_default(&*self.backend, &paths.manuscript).await;
        let mut value = serde_json::to_value(&current)?;
        deep_merge(&mut value, &Manuscript::normalize_patch(patch));

        let mut manuscript: Manuscript = serde_json::from_value(value)
            .map_err(|e| CwriterError::InvalidArgument(format!("manuscript patch: {}", e)))?;
        manuscript.recount();
        manuscript.last_modified = Some(Utc::now());
        Ok(manuscript)
    }

    /// Bump the work's `updated_at` in its config and its summary.
    pub(crate) async fn touch_work(
        &self,
        user: &UserId,
        config: &mut WorkConfig,
        chapter_count: Option<usize>,
    ) -> Result<()> {
        let paths = self.resolve_work(user, &config.id)?;
        config.updated_at = Utc::now();
        self.write_document(&paths.config, config).await?;
        self.refresh_summary(user, config, chapter_count).await
    }

    /// Read-only view for the export pipeline.
    pub async fn full_work_data(&self, user: Option<&str>, work_id: &str) -> Result<FullWorkData> {
        let user = UserId::resolve(user)?;
        let paths = self.resolve_work(&user, work_id)?;
        let config = self.load_work_config(&paths).await?;
        let chapters = read_or_default(&*self.backend, &paths.chapters).await;
        Ok(FullWorkData { config, chapters })
    }

    // --- Sequences ---

    async fn edit_sequence<T, R, F>(
        &self,
        user: &UserId,
        work_id: &str,
        sequence: Sequence,
        edit: F,
    ) -> Result<(Vec<T>, R)>
    where
        Vec<T>: Document + Default,
        F: FnOnce(&mut Vec<T>) -> Result<R> + Send,
        R: Send,
    {
        let paths = self.resolve_work(user, work_id)?;
        let mut config = self.load_work_config(&paths).await?;
        let path = sequence.path(&paths);

        let mut items: Vec<T> = read_or_default(&*self.backend, path).await;
        let result = edit(&mut items)?;
        self.write_document(path, &items).await?;

        let chapter_count = (sequence == Sequence::Chapters).then_some(items.len());
        self.touch_work(user, &mut config, chapter_count).await?;

        self.log_operation(
            user,
            sequence.operation(),
            json!({ "work_id": work_id, "count": items.len() }),
        );
        Ok((items, result))
    }

    /// Insert or update a glossary entry. `name` is required for new entries.
    pub async fn add_glossary_item(
        &self,
        user: Option<&str>,
        work_id: &str,
        input: GlossaryInput,
    ) -> Result<GlossaryItem> {
        let user = UserId::resolve(user)?;
        let owner = ItemOwner {
            user_id: user.as_str(),
            work_id,
        };
        let (_, item) = self
            .edit_sequence(&user, work_id, Sequence::Glossary, |items: &mut Vec<GlossaryItem>| {
                upsert(items, input, &owner, &self.ids)
            })
            .await?;
        Ok(item)
    }

    pub async fn save_chapter(&self, user: Option<&str>, work_id: &str, input: ChapterInput) -> Result<Vec<Chapter>> {
        self.upsert_into(user, work_id, Sequence::Chapters, input).await
    }

    pub async fn save_character(&self, user: Option<&str>, work_id: &str, input: EntityInput) -> Result<Vec<NamedEntity>> {
        self.upsert_into(user, work_id, Sequence::Characters, input).await
    }

    pub async fn save_world_setting(&self, user: Option<&str>, work_id: &str, input: EntityInput) -> Result<Vec<NamedEntity>> {
        self.upsert_into(user, work_id, Sequence::Settings, input).await
    }

    pub async fn save_foreshadowing(
        &self,
        user: Option<&str>,
        work_id: &str,
        input: ForeshadowingInput,
    ) -> Result<Vec<Foreshadowing>> {
        self.upsert_into(user, work_id, Sequence::Foreshadowing, input).await
    }

    async fn upsert_into<T>(&self, user: Option<&str>, work_id: &str, sequence: Sequence, input: T::Input) -> Result<Vec<T>>
    where
        T: SequenceItem,
        Vec<T>: Document + Default,
    {
        let user = UserId::resolve(user)?;
        let owner = ItemOwner {
            user_id: user.as_str(),
            work_id,
        };
        let (items, _) = self
            .edit_sequence(&user, work_id, sequence, |items: &mut Vec<T>| {
                upsert(items, input, &owner, &self.ids)
            })
            .await?;
        Ok(items)
    }

    // --- Stats ---

    pub async fn get_work_stats(&self, user: Option<&str>, work_id: &str) -> Result<WorkStats> {
        let user = UserId::resolve(user)?;
        let paths = self.resolve_work(&user, work_id)?;
        self.work_stats_at(&paths).await
    }

    async fn work_stats_at(&self, paths: &WorkPaths) -> Result<WorkStats> {
        let config = self.load_work_config(paths).await?;
        let mut usage = Usage::default();
        usage.add(self.backend.read_file(&paths.config).await.as_deref());

        let content = WorkContent {
            manuscript: self.read_measured(&paths.manuscript, &mut usage).await,
            chapters: self.read_measured(&paths.chapters, &mut usage).await,
            characters: self.read_measured(&paths.characters, &mut usage).await,
            settings: self.read_measured(&paths.settings, &mut usage).await,
            glossary: self.read_measured(&paths.glossary, &mut usage).await,
            foreshadowing: self.read_measured(&paths.foreshadowing, &mut usage).await,
            map_data: self.read_measured(&paths.map_data, &mut usage).await,
        };

        let mut stats = WorkStats::of(&config, &content);
        stats.file_count = usage.files;
        stats.storage_used = usage.bytes;
        Ok(stats)
    }

    async fn read_measured<T: Document + Default>(&self, path: &str, usage: &mut Usage) -> T {
        let Some(bytes) = self.backend.read_file(path).await else {
            return T::default();
        };
        usage.add(Some(&bytes));
        decode_document(path, &bytes).unwrap_or_else(|e| {
            tracing::warn!(path, error = %e, "unreadable document, counting as empty");
            T::default()
        })
    }

    /// Totals over every indexed work, plus the user and global configs.
    pub async fn get_user_stats(&self, user: Option<&str>) -> Result<UserStats> {
        let user = UserId::resolve(user)?;
        let works = self.get_user_works(Some(user.as_str())).await?;
        let mut stats = UserStats {
            total_works: works.len(),
            storage_type: self.storage_type().to_string(),
            ..Default::default()
        };

        for summary in &works {
            let Some(paths) = work_paths(&user, Some(&summary.id)) else {
                continue;
            };
            match self.work_stats_at(&paths).await {
                Ok(work) => stats.add_work(&work),
                Err(e) => tracing::warn!(work_id = %summary.id, error = %e, "skipping work in stats"),
            }
        }

        let mut usage = Usage::default();
        for path in [user_config_path(&user), global_config_path()] {
            usage.add(self.backend.read_file(&path).await.as_deref());
        }
        stats.storage_used += usage.bytes;
        Ok(stats)
    }
}

#[derive(Debug, Default)]
struct Usage {
    files: usize,
    bytes: usize,
}

impl Usage {
    fn add(&mut self, bytes: Option<&[u8]>) {
        if let Some(bytes) = bytes {
            self.files += 1;
            self.bytes += bytes.len();
        }
    }
}

// --- Sequence upserts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    Chapters,
    Characters,
    Settings,
    Glossary,
    Foreshadowing,
}

impl Sequence {
    fn path<'a>(&self, paths: &'a WorkPaths) -> &'a str {
        match self {
            Sequence::Chapters => &paths.chapters,
            Sequence::Characters => &paths.characters,
            Sequence::Settings => &paths.settings,
            Sequence::Glossary => &paths.glossary,
            Sequence::Foreshadowing => &paths.foreshadowing,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            Sequence::Chapters => "save_chapter",
            Sequence::Characters => "save_character",
            Sequence::Settings => "save_world_setting",
            Sequence::Glossary => "add_glossary_item",
            Sequence::Foreshadowing => "save_foreshadowing",
        }
    }
}

/// Who a new sequence item belongs to.
pub(crate) struct ItemOwner<'a> {
    pub user_id: &'a str,
    pub work_id: &'a str,
}

/// An element of a per-work sequence that is upserted by id.
pub(crate) trait SequenceItem: Clone + Send + Sync {
    type Input: Send;

    fn id(&self) -> &str;
    fn input_id(input: &Self::Input) -> Option<&str>;
    fn apply(&mut self, input: Self::Input, now: DateTime<Utc>);
    fn create(id: String, input: Self::Input, owner: &ItemOwner<'_>, now: DateTime<Utc>) -> Result<Self>;
}

/// Update the item whose id matches the input, or append a new one.
pub(crate) fn upsert<T: SequenceItem>(
    items: &mut Vec<T>,
    input: T::Input,
    owner: &ItemOwner<'_>,
    ids: &IdGenerator,
) -> Result<T> {
    let now = Utc::now();
    let wanted = T::input_id(&input)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    if let Some(id) = &wanted {
        if let Some(existing) = items.iter_mut().find(|item| item.id() == id) {
            existing.apply(input, now);
            return Ok(existing.clone());
        }
    }

    let id = wanted.unwrap_or_else(|| ids.next_id());
    let item = T::create(id, input, owner, now)?;
    items.push(item.clone());
    Ok(item)
}

impl SequenceItem for Chapter {
    type Input = ChapterInput;

    fn id(&self) -> &str {
        &self.id
    }

    fn input_id(input: &ChapterInput) -> Option<&str> {
        input.id.as_deref()
    }

    fn apply(&mut self, input: ChapterInput, now: DateTime<Utc>) {
        if let Some(title) = input.title {
            self.title = title;
        }
        if let Some(content) = input.content {
            self.content = content;
        }
        self.updated_at = now;
    }

    fn create(id: String, input: ChapterInput, _owner: &ItemOwner<'_>, now: DateTime<Utc>) -> Result<Self> {
        Ok(Chapter {
            id,
            title: input.title.unwrap_or_else(|| DEFAULT_CHAPTER_TITLE.to_string()),
            content: input.content.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            extra: Default::default(),
        })
    }
}

impl SequenceItem for NamedEntity {
    type Input = EntityInput;

    fn id(&self) -> &str {
        &self.id
    }

    fn input_id(input: &EntityInput) -> Option<&str> {
        input.id.as_deref()
    }

    fn apply(&mut self, input: EntityInput, now: DateTime<Utc>) {
        if let Some(name) = input.name {
            self.name = name;
        }
        if let Some(description) = input.description {
            self.description = description;
        }
        self.updated_at = now;
    }

    fn create(id: String, input: EntityInput, _owner: &ItemOwner<'_>, now: DateTime<Utc>) -> Result<Self> {
        Ok(NamedEntity {
            id,
            name: input.name.unwrap_or_else(|| DEFAULT_ENTITY_NAME.to_string()),
            description: input.description.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            extra: Default::default(),
        })
    }
}

impl SequenceItem for Foreshadowing {
    type Input = ForeshadowingInput;

    fn id(&self) -> &str {
        &self.id
    }

    fn input_id(input: &ForeshadowingInput) -> Option<&str> {
        input.id.as_deref()
    }

    fn apply(&mut self, input: ForeshadowingInput, now: DateTime<Utc>) {
        if let Some(title) = input.title {
            self.title = title;
        }
        if let Some(description) = input.description {
            self.description = description;
        }
        self.updated_at = now;
    }

    fn create(id: String, input: ForeshadowingInput, _owner: &ItemOwner<'_>, now: DateTime<Utc>) -> Result<Self> {
        Ok(Foreshadowing {
            id,
            title: input.title.unwrap_or_else(|| DEFAULT_FORESHADOWING_TITLE.to_string()),
            description: input.description.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            extra: Default::default(),
        })
    }
}

impl SequenceItem for GlossaryItem {
    type Input = GlossaryInput;

    fn id(&self) -> &str {
        &self.id
    }

    fn input_id(input: &GlossaryInput) -> Option<&str> {
        input.id.as_deref()
    }

    fn apply(&mut self, input: GlossaryInput, _now: DateTime<Utc>) {
        if let Some(name) = input.name.filter(|n| !n.trim().is_empty()) {
            self.name = name;
        }
        if let Some(category) = input.category {
            self.category = category;
        }
        if let Some(description) = input.description {
            self.description = description;
        }
        if let Some(color_code) = input.color_code {
            self.color_code = color_code;
        }
        if let Some(is_active) = input.is_active {
            self.is_active = is_active;
        }
    }

    fn create(id: String, input: GlossaryInput, owner: &ItemOwner<'_>, now: DateTime<Utc>) -> Result<Self> {
        let name = input
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| CwriterError::InvalidArgument("glossary item needs a name".to_string()))?;
        Ok(GlossaryItem {
            id,
            work_id: owner.work_id.to_string(),
            user_id: owner.user_id.to_string(),
            category: input
                .category
                .unwrap_or_else(|| DEFAULT_GLOSSARY_CATEGORY.to_string()),
            name,
            description: input.description.unwrap_or_default(),
            color_code: input
                .color_code
                .unwrap_or_else(|| DEFAULT_GLOSSARY_COLOR.to_string()),
            is_active: input.is_active.unwrap_or(true),
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::kv::KvBackend;

    fn make_store() -> DocumentStore<KvBackend> {
        DocumentStore::new(KvBackend::new(), StoreOptions::default())
    }

    fn owner() -> ItemOwner<'static> {
        ItemOwner {
            user_id: "u",
            work_id: "w",
        }
    }

    // --- Upsert Tests ---

    #[test]
    fn test_upsert_appends_then_updates() {
        let ids = IdGenerator::new();
        let mut chapters: Vec<Chapter> = Vec::new();

        let created = upsert(
            &mut chapters,
            ChapterInput {
                title: Some("One".into()),
                ..Default::default()
            },
            &owner(),
            &ids,
        )
        .unwrap();
        assert_eq!(chapters.len(), 1);

        let updated = upsert(
            &mut chapters,
            ChapterInput {
                id: Some(created.id.clone()),
                content: Some("body".into()),
                ..Default::default()
            },
            &owner(),
            &ids,
        )
        .unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(updated.title, "One");
        assert_eq!(updated.content, "body");
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn test_upsert_keeps_caller_supplied_id() {
        let ids = IdGenerator::new();
        let mut items: Vec<NamedEntity> = Vec::new();
        let item = upsert(
            &mut items,
            EntityInput {
                id: Some("hero".into()),
                name: Some("Lin".into()),
                ..Default::default()
            },
            &owner(),
            &ids,
        )
        .unwrap();
        assert_eq!(item.id, "hero");
    }

    #[test]
    fn test_glossary_requires_name_and_applies_defaults() {
        let ids = IdGenerator::new();
        let mut items: Vec<GlossaryItem> = Vec::new();

        let err = upsert(&mut items, GlossaryInput::default(), &owner(), &ids).unwrap_err();
        assert!(matches!(err, CwriterError::InvalidArgument(_)));
        assert!(items.is_empty());

        let item = upsert(
            &mut items,
            GlossaryInput {
                name: Some("Dragon".into()),
                ..Default::default()
            },
            &owner(),
            &ids,
        )
        .unwrap();
        assert_eq!(item.category, "character");
        assert_eq!(item.color_code, "#FF6B35");
        assert!(item.is_active);
        assert_eq!(item.work_id, "w");
        assert_eq!(item.user_id, "u");
    }

    // --- Store Tests ---

    #[tokio::test]
    async fn test_init_provisions_default_user_and_global_config() {
        let store = make_store();
        store.init().await.unwrap();
        store.init().await.unwrap();

        let keys = store.backend().keys();
        assert!(keys.contains(&"global.config.json".to_string()));
        assert!(keys.contains(&"users/default_user/user.config.json".to_string()));

        let global: crate::model::GlobalConfig = store
            .read_document("global.config.json", None)
            .await
            .unwrap()
            .unwrap();
        assert!(global.users.contains_key("default_user"));
        assert_eq!(global.storage_type, "kv-fallback");
    }

    #[tokio::test]
    async fn test_create_work_writes_all_documents() {
        let store = make_store();
        let work = store
            .create_work(
                Some("alice"),
                NewWork {
                    title: Some("Draft One".into()),
                    initial_content: Some("hello world".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(work.is_active);
        assert_eq!(work.structure_type, "single");
        assert_eq!(work.local_file_path, format!("users/alice/works/{}", work.id));

        let detail = store.get_work_detail(Some("alice"), &work.id).await.unwrap();
        assert_eq!(detail.content.manuscript.content, "hello world");
        assert_eq!(detail.content.manuscript.word_count, 2);
        assert!(detail.content.chapters.is_empty());

        let user = store.user_config(Some("alice")).await.unwrap();
        assert_eq!(user.works[&work.id].chapter_count, 0);
    }

    #[tokio::test]
    async fn test_update_work_keeps_immutable_fields() {
        let store = make_store();
        let work = store.create_work(None, NewWork::titled("A")).await.unwrap();

        let updated = store
            .update_work(
                None,
                &work.id,
                json!({"title": "B", "id": "hijack", "local_file_path": "/elsewhere"}),
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "B");
        assert_eq!(updated.id, work.id);
        assert_eq!(updated.local_file_path, work.local_file_path);
        assert!(updated.updated_at >= work.updated_at);

        let summary = &store.user_config(None).await.unwrap().works[&work.id];
        assert_eq!(summary.title, "B");
    }

    #[tokio::test]
    async fn test_update_work_rejects_schema_breaking_patch() {
        let store = make_store();
        let work = store.create_work(None, NewWork::titled("A")).await.unwrap();

        let err = store
            .update_work(None, &work.id, json!({"is_active": "yes"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CwriterError::InvalidArgument(_)));

        let err = store.update_work(None, &work.id, json!([1])).await.unwrap_err();
        assert!(matches!(err, CwriterError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_work_scoped_ops_reject_blank_work_id() {
        let store = make_store();
        let err = store.get_work_detail(None, "  ").await.unwrap_err();
        assert!(matches!(err, CwriterError::InvalidArgument(_)));
        let err = store.update_work(None, "../x", json!({})).await.unwrap_err();
        assert!(matches!(err, CwriterError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_missing_work_is_not_found() {
        let store = make_store();
        let err = store.get_work_detail(None, "123").await.unwrap_err();
        assert!(matches!(err, CwriterError::NotFound(_)));
        let err = store
            .save_work_content(None, "123", WorkContentPatch::manuscript_text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CwriterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_save_chapter_refreshes_chapter_count() {
        let store = make_store();
        let work = store.create_work(None, NewWork::titled("A")).await.unwrap();

        let chapters = store
            .save_chapter(
                None,
                &work.id,
                ChapterInput {
                    title: Some("One".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(chapters.len(), 1);

        let user = store.user_config(None).await.unwrap();
        assert_eq!(user.works[&work.id].chapter_count, 1);
        assert!(user.works[&work.id].updated_at >= Some(work.updated_at));
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_io() {
        let store = make_store();
        let work = store.create_work(None, NewWork::titled("A")).await.unwrap();
        store.backend().set_simulate_write_error(true);

        let err = store
            .save_work_content(None, &work.id, WorkContentPatch::manuscript_text("x"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_update_preferences_merges() {
        let store = make_store();
        let config = store
            .update_preferences(Some("bob"), json!({"autoSaveInterval": 60, "theme": "dark"}))
            .await
            .unwrap();
        assert_eq!(config.preferences.auto_save_interval, 60);
        assert_eq!(config.preferences.extra.get("theme"), Some(&json!("dark")));
        assert!(config.preferences.last_login.is_some());

        let err = store
            .update_preferences(Some("bob"), json!({"autoSaveInterval": "soon"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CwriterError::InvalidArgument(_)));
    }
}
