use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::Date;

use crate::archive;
use crate::backups::BackupRotator;
use crate::completions::CompletionsError;
use crate::config::{ConfigError, Settings};
use crate::document::Document;
use crate::doctor::{run_doctor, DoctorError, DoctorOptions, DoctorReport};
use crate::domain::bug::{BugPatch, ParseBugFieldError};
use crate::domain::dates::{now_utc_rfc3339, today_utc, ParseDueError};
use crate::domain::priority::{ParsePriorityError, Priority};
use crate::domain::task::{normalize_tag, Task};
use crate::listing::{
    apply_filters, compute_stats, sort_tasks, ParseSortKeyError, SortKey, TaskListFilter,
    TaskStats,
};
use crate::migrate::{migrate, MigrationError, MigrationReport};
use crate::store::{archive_path_for, Store, StoreError, ARCHIVE_FILE_NAME};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Doctor(#[from] DoctorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Completions(#[from] CompletionsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("task #{0} not found")]
    NotFound(u64),
    #[error("no backup found for {}", .0.display())]
    NoBackup(PathBuf),
    #[error("document is corrupt: {0}; run `todo doctor` to inspect it")]
    Corrupt(String),
}

impl From<ParsePriorityError> for AppError {
    fn from(value: ParsePriorityError) -> Self {
        AppError::InvalidArgument(value.to_string())
    }
}

impl From<ParseDueError> for AppError {
    fn from(value: ParseDueError) -> Self {
        AppError::InvalidArgument(value.to_string())
    }
}

impl From<ParseBugFieldError> for AppError {
    fn from(value: ParseBugFieldError) -> Self {
        AppError::InvalidArgument(value.to_string())
    }
}

impl From<ParseSortKeyError> for AppError {
    fn from(value: ParseSortKeyError) -> Self {
        AppError::InvalidArgument(value.to_string())
    }
}

/// Fields accepted by `add`. Validated before the document is locked.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub text: String,
    pub priority: Priority,
    pub due: Option<Date>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DoneChange {
    pub id: u64,
    pub text: String,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TagChange {
    pub task: Task,
    pub tag: String,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub report: MigrationReport,
    pub written: bool,
    pub dry_run: bool,
}

/// Command operations over the primary document and its archive.
pub struct App {
    store: Store,
    archive: Store,
}

impl App {
    pub fn open(path: &Path, backups: BackupRotator) -> Self {
        Self {
            store: Store::new(path, backups.clone()),
            archive: Store::new(archive_path_for(path), backups),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::open(&settings.db_path, settings.backups.clone())
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn archive_path(&self) -> &Path {
        self.archive.path()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Creates an empty document when none exists. Returns whether one was created.
    pub fn init(&self) -> Result<bool, AppError> {
        let _guard = self.store.lock()?;
        if self.store.path().exists() {
            self.store.load()?;
            return Ok(false);
        }
        Ok(self.store.create_if_missing()?)
    }

    pub fn add(&self, input: NewTask) -> Result<Task, AppError> {
        let text = require_text(&input.text)?;
        let created_at = now_utc_rfc3339();
        let created = self.store.update(|document| {
            let mut task = Task::new(0, text, &created_at);
            task.priority = input.priority;
            task.due = input.due;
            for tag in &input.tags {
                task.add_tag(tag);
            }
            Ok::<_, AppError>(document.push_new(task).clone())
        })?;
        tracing::info!(id = created.id, "task added");
        Ok(created)
    }

    /// Marks every id done (or pending with `done = false`). Unknown ids abort
    /// the whole command before anything is written.
    pub fn set_done(&self, ids: &[u64], done: bool) -> Result<Vec<DoneChange>, AppError> {
        if ids.is_empty() {
            return Err(AppError::InvalidArgument(
                "at least one task id is required".to_string(),
            ));
        }
        let now = now_utc_rfc3339();
        self.store.update(|document| {
            if let Some(missing) = ids.iter().find(|id| document.find(**id).is_none()) {
                return Err(AppError::NotFound(*missing));
            }
            let mut changes = Vec::with_capacity(ids.len());
            for id in ids {
                let task = find_mut(document, *id)?;
                let changed = task.set_done(done, &now);
                changes.push(DoneChange {
                    id: task.id,
                    text: task.text.clone(),
                    changed,
                });
            }
            Ok(changes)
        })
    }

    pub fn remove(&self, id: u64) -> Result<Task, AppError> {
        self.store.update(|document| {
            let position = document
                .tasks
                .iter()
                .position(|task| task.id == id)
                .ok_or(AppError::NotFound(id))?;
            Ok(document.tasks.remove(position))
        })
    }

    pub fn edit(&self, id: u64, text: &str) -> Result<Task, AppError> {
        let text = require_text(text)?;
        self.modify(id, |task| task.text = text.to_string())
    }

    pub fn set_priority(&self, id: u64, priority: Priority) -> Result<Task, AppError> {
        self.modify(id, |task| task.priority = priority)
    }

    pub fn set_due(&self, id: u64, due: Option<Date>) -> Result<Task, AppError> {
        self.modify(id, |task| task.due = due)
    }

    pub fn add_tag(&self, id: u64, tag: &str) -> Result<TagChange, AppError> {
        self.change_tag(id, tag, true)
    }

    pub fn remove_tag(&self, id: u64, tag: &str) -> Result<TagChange, AppError> {
        self.change_tag(id, tag, false)
    }

    fn change_tag(&self, id: u64, tag: &str, add: bool) -> Result<TagChange, AppError> {
        let tag = normalize_tag(tag)
            .ok_or_else(|| AppError::InvalidArgument("tag must not be empty".to_string()))?;
        self.store.update(|document| {
            let task = find_mut(document, id)?;
            let changed = if add {
                task.add_tag(&tag)
            } else {
                task.remove_tag(&tag)
            };
            Ok(TagChange {
                task: task.clone(),
                tag: tag.clone(),
                changed,
            })
        })
    }

    pub fn update_bug(&self, id: u64, patch: &BugPatch) -> Result<Task, AppError> {
        if !patch.has_changes() {
            return Err(AppError::InvalidArgument(
                "no bug fields given; pass at least one of --status, --assignee, --severity, --steps, --env or --clear".to_string(),
            ));
        }
        self.modify(id, |task| patch.apply(&mut task.bug))
    }

    /// Deletes every done task. Returns how many were removed.
    pub fn clear_done(&self) -> Result<usize, AppError> {
        self.store.update(|document| {
            let before = document.tasks.len();
            document.tasks.retain(|task| !task.done);
            Ok(before - document.tasks.len())
        })
    }

    pub fn archive_done(&self) -> Result<usize, AppError> {
        if self.store.path() == self.archive.path()
            || self.store.path().file_name().is_some_and(|name| name == ARCHIVE_FILE_NAME)
        {
            return Err(AppError::InvalidArgument(format!(
                "cannot archive from {}: the name {ARCHIVE_FILE_NAME} is reserved for the archive",
                self.store.path().display()
            )));
        }
        if self.store.lock_path() == self.archive.lock_path() {
            return Err(AppError::InvalidArgument(format!(
                "cannot archive from {}: it shares the lock file {} with {}",
                self.store.path().display(),
                self.archive.lock_path().display(),
                self.archive.path().display()
            )));
        }
        Ok(archive::archive_done(&self.store, &self.archive)?)
    }

    pub fn list(&self, filter: &TaskListFilter, sort: SortKey) -> Result<Vec<Task>, AppError> {
        list_from(&self.store, filter, sort)
    }

    pub fn list_archived(
        &self,
        filter: &TaskListFilter,
        sort: SortKey,
    ) -> Result<Vec<Task>, AppError> {
        list_from(&self.archive, filter, sort)
    }

    pub fn show(&self, id: u64) -> Result<Task, AppError> {
        self.store
            .load()?
            .find(id)
            .cloned()
            .ok_or(AppError::NotFound(id))
    }

    pub fn stats(&self) -> Result<TaskStats, AppError> {
        let document = self.store.load()?;
        Ok(compute_stats(&document.tasks, today_utc()))
    }

    pub fn doctor(&self, options: DoctorOptions) -> Result<DoctorReport, AppError> {
        Ok(run_doctor(&self.store, Some(&self.archive), options)?)
    }

    /// Upgrades the document to the current schema. Nothing is written when it
    /// is already current or `dry_run` is set.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrationOutcome, AppError> {
        let _guard = self.store.lock()?;
        let Some(raw) = self.store.read_raw()? else {
            let current = Document::default().version;
            return Ok(MigrationOutcome {
                report: MigrationReport {
                    from_version: current,
                    to_version: current,
                    notes: vec!["document does not exist yet".to_string()],
                },
                written: false,
                dry_run,
            });
        };

        let parsed: Value =
            serde_json::from_slice(&raw).map_err(|err| AppError::Corrupt(err.to_string()))?;
        let Value::Object(mut root) = parsed else {
            return Err(AppError::Corrupt(
                "document root must be a JSON object".to_string(),
            ));
        };
        let report = migrate(&mut root)?;
        let written = report.changed() && !dry_run;
        if written {
            let document = Document::from_value(&Value::Object(root))
                .map_err(|err| AppError::Corrupt(err.to_string()))?;
            self.store.save(&document)?;
            tracing::info!(
                from = report.from_version,
                to = report.to_version,
                "document migrated"
            );
        }
        Ok(MigrationOutcome {
            report,
            written,
            dry_run,
        })
    }

    /// Copies the newest backup over the document.
    pub fn restore(&self) -> Result<PathBuf, AppError> {
        let _guard = self.store.lock()?;
        self.store
            .restore_latest_backup()?
            .ok_or_else(|| AppError::NoBackup(self.store.path().to_path_buf()))
    }

    fn modify(&self, id: u64, change: impl FnOnce(&mut Task)) -> Result<Task, AppError> {
        self.store.update(|document| {
            let task = find_mut(document, id)?;
            change(task);
            Ok(task.clone())
        })
    }
}

fn list_from(store: &Store, filter: &TaskListFilter, sort: SortKey) -> Result<Vec<Task>, AppError> {
    let document = store.load()?;
    let mut tasks = apply_filters(document.tasks, filter);
    sort_tasks(&mut tasks, sort);
    Ok(tasks)
}

fn find_mut(document: &mut Document, id: u64) -> Result<&mut Task, AppError> {
    document.find_mut(id).ok_or(AppError::NotFound(id))
}

fn require_text(raw: &str) -> Result<&str, AppError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(AppError::InvalidArgument(
            "task text must not be empty".to_string(),
        ));
    }
    Ok(text)
}
