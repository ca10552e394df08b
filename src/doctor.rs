use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::{self, Document, DocumentError};
use crate::domain::bug::{BugSeverity, BugStatus};
use crate::domain::dates::parse_due;
use crate::locks::FileLock;
use crate::migrate::{kind, migrate, MigrationError, MigrationReport};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DoctorStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DoctorCheck {
    pub name: String,
    pub status: DoctorStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DoctorReport {
    pub path: PathBuf,
    pub issues: Vec<String>,
    pub notes: Vec<String>,
    pub checks: Vec<DoctorCheck>,
    pub migration: Option<MigrationReport>,
    pub restored_from: Option<PathBuf>,
    pub written: bool,
    pub resolved: bool,
    /// The document on disk is still not valid JSON.
    pub unparseable: bool,
}

impl DoctorReport {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            issues: Vec::new(),
            notes: Vec::new(),
            checks: Vec::new(),
            migration: None,
            restored_from: None,
            written: false,
            resolved: false,
            unparseable: false,
        }
    }

    /// True when the document is healthy now, either as found or after repair.
    pub fn ok(&self) -> bool {
        self.issues.is_empty() || self.resolved
    }

    /// What to rerun with when the document is still unhealthy.
    pub fn remedy(&self) -> &'static str {
        if self.unparseable {
            "rerun with --restore to recover the newest backup (--fix cannot repair invalid JSON)"
        } else {
            "rerun with --fix to repair"
        }
    }

    pub fn failure_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|check| check.status == DoctorStatus::Fail)
            .count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoctorOptions {
    pub fix: bool,
    pub restore: bool,
}

#[derive(Debug, Error)]
pub enum DoctorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lock(#[from] crate::locks::LockError),
    #[error(transparent)]
    SchemaTooNew(#[from] MigrationError),
    #[error("repaired document still fails to decode: {0}")]
    Document(#[from] DocumentError),
}

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("invalid JSON: {0}")]
    Unparseable(#[from] serde_json::Error),
    #[error(transparent)]
    SchemaTooNew(#[from] MigrationError),
    #[error("repaired document still fails to decode: {0}")]
    Document(#[from] DocumentError),
}

/// Result of validating one raw document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// The decoded document; `None` when issues were found and `fix` was off.
    pub document: Option<Document>,
    pub issues: Vec<String>,
    pub notes: Vec<String>,
    pub migration: Option<MigrationReport>,
}

impl RepairOutcome {
    /// Whether writing `document` back would change anything.
    pub fn needs_write(&self) -> bool {
        !self.issues.is_empty() || !self.notes.is_empty()
    }
}

/// Validates `raw` field by field. With `fix`, every violation is corrected in
/// memory; without it, the document is only returned when it is clean.
pub fn repair(raw: &[u8], fix: bool) -> Result<RepairOutcome, RepairError> {
    let parsed: Value = if raw.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(raw)?
    };

    let mut issues = Vec::new();
    let mut notes = Vec::new();
    let mut root = match parsed {
        Value::Object(root) => root,
        other => {
            issues.push(format!(
                "document root must be an object (found {})",
                kind(&other)
            ));
            if !fix {
                return Ok(RepairOutcome {
                    document: None,
                    issues,
                    notes,
                    migration: None,
                });
            }
            Map::new()
        }
    };

    if let Some(found) = root.get("tasks").filter(|tasks| !tasks.is_array() && !tasks.is_null()) {
        issues.push(format!(
            "tasks must be a list (found {}); its records cannot be recovered",
            kind(found)
        ));
    }

    let migration = migrate(&mut root)?;
    notes.extend(migration.notes.iter().cloned());

    let items = match root.remove("tasks") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    let tasks = repair_tasks(items, &mut issues, &mut notes);
    let max_id = tasks
        .iter()
        .filter_map(|task| task.get("id").and_then(Value::as_u64))
        .max()
        .unwrap_or(0);

    let expected_next = max_id + 1;
    let next_id = root.get("next_id").and_then(Value::as_u64).unwrap_or(1);
    if next_id != expected_next {
        let message = format!("next_id {next_id} reconciled to {expected_next}");
        if next_id <= max_id {
            issues.push(format!("{message} (it must exceed the highest id {max_id})"));
        } else {
            notes.push(message);
        }
        root.insert("next_id".to_string(), Value::from(expected_next));
    }
    root.insert(
        "tasks".to_string(),
        Value::Array(tasks.into_iter().map(Value::Object).collect()),
    );

    let document = if fix || issues.is_empty() {
        Some(Document::from_value(&Value::Object(root))?)
    } else {
        None
    };
    Ok(RepairOutcome {
        document,
        issues,
        notes,
        migration: Some(migration),
    })
}

fn repair_tasks(
    items: Vec<Value>,
    issues: &mut Vec<String>,
    notes: &mut Vec<String>,
) -> Vec<Map<String, Value>> {
    let mut tasks = Vec::with_capacity(items.len());
    let mut seen = HashSet::new();
    let mut needs_id = Vec::new();

    for (index, item) in items.into_iter().enumerate() {
        let mut task = match item {
            Value::Object(task) => task,
            other => {
                issues.push(format!(
                    "task at index {index}: entry must be an object (found {}); dropped",
                    kind(&other)
                ));
                continue;
            }
        };
        let label = format!("task at index {index}");

        match task.get("id").and_then(Value::as_u64).filter(|id| *id > 0) {
            Some(id) if seen.insert(id) => {}
            Some(id) => {
                issues.push(format!("{label}: duplicate id {id}"));
                task.insert("id".to_string(), Value::from(0u64));
                needs_id.push(tasks.len());
            }
            None => {
                match task.get("id") {
                    Some(found) => issues.push(format!("{label}: invalid id {found}")),
                    None => issues.push(format!("{label}: missing id")),
                }
                task.insert("id".to_string(), Value::from(0u64));
                needs_id.push(tasks.len());
            }
        }

        check_field(&mut task, "text", issues, &label, Value::is_string, || {
            Value::String(String::new())
        });
        check_field(&mut task, "done", issues, &label, Value::is_boolean, || {
            Value::Bool(false)
        });
        check_field(&mut task, "priority", issues, &label, valid_priority, empty_string);
        check_field(&mut task, "due", issues, &label, valid_due, empty_string);
        check_field(&mut task, "bug_status", issues, &label, valid_bug_status, empty_string);
        check_field(&mut task, "bug_severity", issues, &label, valid_bug_severity, empty_string);
        repair_tags(&mut task, issues, &label);

        tasks.push(task);
    }

    let mut next = seen.iter().copied().max().unwrap_or(0);
    for position in needs_id {
        next += 1;
        tasks[position].insert("id".to_string(), Value::from(next));
        notes.push(format!("assigned id {next} to a task with an invalid or duplicate id"));
    }
    tasks
}

fn check_field(
    task: &mut Map<String, Value>,
    key: &str,
    issues: &mut Vec<String>,
    label: &str,
    valid: impl Fn(&Value) -> bool,
    fallback: impl Fn() -> Value,
) {
    let Some(value) = task.get(key) else {
        return;
    };
    if valid(value) {
        return;
    }
    issues.push(format!("{label}: invalid {key} {value}; reset"));
    task.insert(key.to_string(), fallback());
}

fn repair_tags(task: &mut Map<String, Value>, issues: &mut Vec<String>, label: &str) {
    let replacement = match task.get("tags") {
        None | Some(Value::Null) => return,
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => return,
        Some(Value::Array(items)) => {
            issues.push(format!("{label}: tags must be strings; non-strings dropped"));
            items.iter().filter(|item| item.is_string()).cloned().collect()
        }
        Some(other) => {
            issues.push(format!("{label}: tags must be a list (found {})", kind(other)));
            Vec::new()
        }
    };
    task.insert("tags".to_string(), Value::Array(replacement));
}

fn empty_string() -> Value {
    Value::String(String::new())
}

fn valid_priority(value: &Value) -> bool {
    matches!(value.as_str(), Some("" | "low" | "med" | "high"))
}

fn valid_due(value: &Value) -> bool {
    match value.as_str() {
        Some("") => true,
        Some(raw) => parse_due(raw).is_ok(),
        None => false,
    }
}

fn valid_bug_status(value: &Value) -> bool {
    match value.as_str() {
        Some("") => true,
        Some(raw) => BugStatus::from_str(raw).is_ok_and(|status| status.as_str() == raw),
        None => false,
    }
}

fn valid_bug_severity(value: &Value) -> bool {
    match value.as_str() {
        Some("") => true,
        Some(raw) => BugSeverity::from_str(raw).is_ok_and(|severity| severity.as_str() == raw),
        None => false,
    }
}

/// Validates the document at `store` and, when asked, restores or rewrites it.
///
/// The document lock is held for the whole run.
pub fn run_doctor(
    store: &Store,
    archive: Option<&Store>,
    options: DoctorOptions,
) -> Result<DoctorReport, DoctorError> {
    let mut report = DoctorReport::new(store.path().to_path_buf());
    let _guard = match FileLock::try_acquire(&store.lock_path())? {
        Some(guard) => {
            report.checks.push(check(
                "lock_health",
                DoctorStatus::Pass,
                "document lock is acquirable",
            ));
            guard
        }
        None => {
            report.checks.push(check(
                "lock_health",
                DoctorStatus::Warn,
                "document lock is held by another process; waiting",
            ));
            store.lock()?
        }
    };

    validate_document(store, options, &mut report)?;
    report.checks.push(check_backups(store));
    if let Some(archive) = archive {
        report.checks.push(check_archive(archive));
    }

    let (status, detail) = if report.issues.is_empty() {
        (DoctorStatus::Pass, "document is valid".to_string())
    } else if report.resolved {
        (
            DoctorStatus::Warn,
            format!("{} issue(s) repaired", report.issues.len()),
        )
    } else {
        (
            DoctorStatus::Fail,
            format!("{} issue(s) found; {}", report.issues.len(), report.remedy()),
        )
    };
    report.checks.insert(0, check("document", status, &detail));
    Ok(report)
}

fn validate_document(
    store: &Store,
    options: DoctorOptions,
    report: &mut DoctorReport,
) -> Result<(), DoctorError> {
    let Some(raw) = store.read_raw()? else {
        report.notes.push("document does not exist yet".to_string());
        if options.fix {
            report.written = store.create_if_missing()?;
        }
        return Ok(());
    };

    let outcome = match repair(&raw, options.fix) {
        Ok(outcome) => outcome,
        Err(RepairError::Unparseable(err)) => {
            report.issues.push(format!("invalid JSON: {err}"));
            report.unparseable = true;
            if !options.restore {
                return Ok(());
            }
            let Some(backup) = store.restore_latest_backup()? else {
                report.notes.push("no backup available to restore".to_string());
                return Ok(());
            };
            report.restored_from = Some(backup.clone());
            let restored = store.read_raw()?.unwrap_or_default();
            match repair(&restored, options.fix) {
                Ok(outcome) => {
                    report.resolved = true;
                    report.unparseable = false;
                    outcome
                }
                Err(RepairError::Unparseable(err)) => {
                    report.issues.push(format!(
                        "backup {} is also invalid JSON: {err}",
                        backup.display()
                    ));
                    report.resolved = false;
                    return Ok(());
                }
                Err(err) => return Err(lift(err)),
            }
        }
        Err(err) => return Err(lift(err)),
    };

    let outcome_issues = !outcome.issues.is_empty();
    if outcome_issues {
        // Issues in a restored backup must be repaired before the run counts as resolved.
        report.resolved = false;
    }
    report.issues.extend(outcome.issues.iter().cloned());
    report.notes.extend(outcome.notes.iter().cloned());
    report.migration = outcome.migration.clone();

    if options.fix && outcome.needs_write() {
        if let Some(document) = outcome.document.as_ref() {
            store.save(document)?;
            report.written = true;
            report.resolved = true;
            tracing::info!(
                path = %store.path().display(),
                issues = outcome.issues.len(),
                notes = outcome.notes.len(),
                "repaired document written"
            );
        }
    }
    Ok(())
}

fn lift(err: RepairError) -> DoctorError {
    match err {
        RepairError::SchemaTooNew(err) => DoctorError::SchemaTooNew(err),
        RepairError::Document(err) => DoctorError::Document(err),
        RepairError::Unparseable(err) => DoctorError::Document(DocumentError::Json(err)),
    }
}

fn check_backups(store: &Store) -> DoctorCheck {
    let available = store.backups().list(store.path());
    if available.is_empty() {
        check("backups", DoctorStatus::Warn, "no backups yet")
    } else {
        check(
            "backups",
            DoctorStatus::Pass,
            &format!(
                "{} of {} backup slot(s) in use; newest {}",
                available.len(),
                store.backups().keep(),
                available[0].display()
            ),
        )
    }
}

fn check_archive(archive: &Store) -> DoctorCheck {
    match archive.read_raw() {
        Ok(None) => check("archive", DoctorStatus::Pass, "no archive yet"),
        Ok(Some(raw)) => match document::parse_strict(&raw) {
            Ok(parsed) => check(
                "archive",
                DoctorStatus::Pass,
                &format!("{} archived task(s)", parsed.tasks.len()),
            ),
            Err(err) => check(
                "archive",
                DoctorStatus::Warn,
                &format!(
                    "{} is not valid ({err}); run doctor with --db pointing at it",
                    archive.path().display()
                ),
            ),
        },
        Err(err) => check("archive", DoctorStatus::Warn, &err.to_string()),
    }
}

fn check(name: &str, status: DoctorStatus, detail: &str) -> DoctorCheck {
    DoctorCheck {
        name: name.to_string(),
        status,
        detail: detail.to_string(),
    }
}

#[cfg(test)]
#[path = "doctor_tests_ext.rs"]
mod tests_ext;
