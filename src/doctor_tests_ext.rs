use std::path::PathBuf;

use serde_json::{json, Value};
use uuid::Uuid;

use super::{repair, run_doctor, DoctorError, DoctorOptions, DoctorStatus, RepairError};
use crate::backups::BackupRotator;
use crate::document::{self, Document};
use crate::domain::priority::Priority;
use crate::domain::task::Task;
use crate::store::{archive_path_for, Store};

fn unique_workspace() -> PathBuf {
    let root = std::env::temp_dir().join(format!("todo-doctor-ext-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&root).expect("workspace should be creatable");
    root
}

fn bytes(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).expect("test value serializes")
}

fn fix() -> DoctorOptions {
    DoctorOptions {
        fix: true,
        restore: false,
    }
}

#[test]
fn clean_document_has_no_issues() {
    let raw = bytes(json!({
        "version": 1,
        "next_id": 3,
        "tasks": [
            {"id": 1, "text": "a", "done": false, "priority": "high", "due": "2024-05-01", "tags": ["x"]},
            {"id": 2, "text": "b", "done": true, "bug_status": "in-progress", "bug_severity": "low"}
        ]
    }));
    let outcome = repair(&raw, false).expect("repair");
    assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
    assert!(outcome.notes.is_empty(), "{:?}", outcome.notes);
    let document = outcome.document.expect("clean document decodes");
    assert_eq!(document.tasks.len(), 2);
    assert!(!outcome_needs_write(&raw));
}

fn outcome_needs_write(raw: &[u8]) -> bool {
    repair(raw, true).expect("repair").needs_write()
}

#[test]
fn duplicate_and_invalid_ids_are_reassigned_after_max() {
    let raw = bytes(json!({
        "version": 1,
        "next_id": 2,
        "tasks": [
            {"id": 4, "text": "first"},
            {"id": 4, "text": "dup"},
            {"id": -1, "text": "negative"},
            {"text": "no id"},
            {"id": 2, "text": "second"}
        ]
    }));
    let outcome = repair(&raw, true).expect("repair");
    // Four id problems plus a next_id below the highest id.
    assert_eq!(outcome.issues.len(), 5, "{:?}", outcome.issues);
    let document = outcome.document.expect("fixed document");
    let ids: Vec<u64> = document.tasks.iter().map(|task| task.id).collect();
    assert_eq!(ids, vec![4, 5, 6, 7, 2]);
    assert_eq!(document.next_id, 8);
}

#[test]
fn invalid_fields_are_reset_to_defaults() {
    let raw = bytes(json!({
        "version": 1,
        "next_id": 2,
        "tasks": [{
            "id": 1,
            "text": 42,
            "done": "yes",
            "priority": "urgent",
            "due": "next week",
            "tags": ["ok", 7],
            "bug_status": "wontfix",
            "bug_severity": "meh"
        }]
    }));
    let outcome = repair(&raw, true).expect("repair");
    assert_eq!(outcome.issues.len(), 7, "{:?}", outcome.issues);
    let task = &outcome.document.expect("fixed document").tasks[0];
    assert_eq!(task.text, "");
    assert!(!task.done);
    assert_eq!(task.priority, Priority::None);
    assert_eq!(task.due, None);
    assert_eq!(task.tags.iter().cloned().collect::<Vec<_>>(), vec!["ok"]);
    assert!(task.bug.status.is_none());
    assert!(task.bug.severity.is_none());
}

#[test]
fn non_object_entries_and_tags_are_handled() {
    let raw = bytes(json!({
        "version": 1,
        "next_id": 2,
        "tasks": ["junk", {"id": 1, "text": "kept", "tags": "not-a-list"}]
    }));
    let outcome = repair(&raw, true).expect("repair");
    assert_eq!(outcome.issues.len(), 2, "{:?}", outcome.issues);
    let document = outcome.document.expect("fixed document");
    assert_eq!(document.tasks.len(), 1);
    assert!(document.tasks[0].tags.is_empty());
}

#[test]
fn without_fix_issues_withhold_the_document() {
    let raw = bytes(json!({"version": 1, "next_id": 2, "tasks": [{"id": 0}]}));
    let outcome = repair(&raw, false).expect("repair");
    assert!(!outcome.issues.is_empty());
    assert!(outcome.document.is_none());

    let outcome = repair(b"[1, 2]", false).expect("repair");
    assert_eq!(outcome.issues.len(), 1);
    assert!(outcome.document.is_none());
    let fixed = repair(b"[1, 2]", true).expect("repair");
    assert_eq!(fixed.document, Some(Document::default()));
}

#[test]
fn tasks_that_are_not_a_list_are_an_issue() {
    let raw = bytes(json!({
        "version": 1,
        "next_id": 3,
        "tasks": {"1": {"id": 1, "text": "a"}, "2": {"id": 2, "text": "b"}}
    }));
    let outcome = repair(&raw, false).expect("repair");
    assert!(outcome.document.is_none());
    assert!(
        outcome.issues.iter().any(|issue| issue.contains("tasks must be a list (found object)")),
        "{:?}",
        outcome.issues
    );

    let fixed = repair(&raw, true).expect("repair");
    assert!(!fixed.issues.is_empty());
    let document = fixed.document.expect("fixed document");
    assert!(document.tasks.is_empty());
    assert_eq!(document.next_id, 1);

    let null_tasks = bytes(json!({"version": 1, "next_id": 1, "tasks": null}));
    assert!(repair(&null_tasks, false).expect("repair").issues.is_empty());
}

#[test]
fn run_doctor_fails_when_tasks_is_not_a_list() {
    let root = unique_workspace();
    let store = Store::new(root.join("todos.json"), BackupRotator::default());
    let raw = bytes(json!({"version": 1, "next_id": 2, "tasks": {"1": {"id": 1}}}));
    std::fs::write(store.path(), &raw).expect("seed");

    let report = run_doctor(&store, None, DoctorOptions::default()).expect("doctor");
    assert!(!report.ok());
    assert_eq!(report.checks[0].status, DoctorStatus::Fail);
    assert!(report.remedy().contains("--fix"));
    assert_eq!(std::fs::read(store.path()).expect("read"), raw);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn next_id_is_reconciled_either_direction() {
    let low = bytes(json!({"version": 1, "next_id": 2, "tasks": [{"id": 5}]}));
    let outcome = repair(&low, true).expect("repair");
    assert_eq!(outcome.issues.len(), 1);
    assert_eq!(outcome.document.expect("document").next_id, 6);

    let high = bytes(json!({"version": 1, "next_id": 40, "tasks": [{"id": 5}]}));
    let outcome = repair(&high, false).expect("repair");
    assert!(outcome.issues.is_empty());
    assert_eq!(outcome.notes.len(), 1);
    assert_eq!(outcome.document.expect("document").next_id, 6);
}

#[test]
fn unparseable_and_future_inputs_are_errors() {
    assert!(matches!(
        repair(b"{not json", true),
        Err(RepairError::Unparseable(_))
    ));
    assert!(matches!(
        repair(br#"{"version": 3, "tasks": []}"#, true),
        Err(RepairError::SchemaTooNew(_))
    ));
}

#[test]
fn repair_is_idempotent() {
    let raw = bytes(json!({
        "next_id": "1",
        "tasks": [
            {"id": 3, "text": "x", "priority": "bogus", "tags": ["#Home", "home"]},
            {"id": 3, "text": "y", "due": "2024-13-45"},
            {"id": "abc", "text": "z"}
        ]
    }));
    let first = repair(&raw, true).expect("first repair");
    assert!(first.needs_write());
    let written = document::dump(&first.document.expect("fixed document"));

    let second = repair(&written, true).expect("second repair");
    assert!(second.issues.is_empty(), "{:?}", second.issues);
    assert!(second.notes.is_empty(), "{:?}", second.notes);
    assert!(!second.needs_write());
    assert_eq!(document::dump(&second.document.expect("document")), written);
}

#[test]
fn run_doctor_without_fix_reports_and_leaves_file_untouched() {
    let root = unique_workspace();
    let store = Store::new(root.join("todos.json"), BackupRotator::default());
    let raw = bytes(json!({"version": 1, "next_id": 1, "tasks": [{"id": 1}, {"id": 1}]}));
    std::fs::write(store.path(), &raw).expect("seed");

    let report = run_doctor(&store, None, DoctorOptions::default()).expect("doctor");
    assert!(!report.ok());
    assert!(!report.written);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(std::fs::read(store.path()).expect("read"), raw);
    assert!(!root.join("todos.json.1").exists());
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn run_doctor_with_fix_writes_and_rotates_backup() {
    let root = unique_workspace();
    let store = Store::new(root.join("todos.json"), BackupRotator::default());
    let raw = bytes(json!({"version": 1, "next_id": 1, "tasks": [{"id": 1}, {"id": 1}]}));
    std::fs::write(store.path(), &raw).expect("seed");

    let report = run_doctor(&store, None, fix()).expect("doctor");
    assert!(report.ok());
    assert!(report.written);
    assert_eq!(std::fs::read(root.join("todos.json.1")).expect("backup"), raw);
    let repaired = store.load().expect("load");
    assert_eq!(repaired.tasks.len(), 2);
    assert_eq!(repaired.next_id, 3);

    let again = run_doctor(&store, None, fix()).expect("second doctor");
    assert!(again.issues.is_empty());
    assert!(!again.written);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn run_doctor_restores_backup_for_corrupt_json() {
    let root = unique_workspace();
    let store = Store::new(root.join("todos.json"), BackupRotator::default());
    let mut good = Document::default();
    good.push_new(Task::new(0, "survivor", "2024-01-01T00:00:00Z"));
    store.save(&good).expect("first save");
    store.save(&good).expect("second save creates backup");
    std::fs::write(store.path(), b"{\"tasks\": [").expect("corrupt");

    let refused = run_doctor(&store, None, DoctorOptions::default()).expect("doctor");
    assert!(!refused.ok());
    assert!(refused.restored_from.is_none());
    assert!(refused.unparseable);
    assert!(refused.remedy().contains("--restore"));
    assert!(refused.checks[0].detail.contains("--restore"));

    let options = DoctorOptions {
        fix: false,
        restore: true,
    };
    let report = run_doctor(&store, None, options).expect("doctor with restore");
    assert!(report.ok());
    assert!(!report.unparseable);
    assert_eq!(report.restored_from, Some(root.join("todos.json.1")));
    assert_eq!(store.load().expect("load"), good);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn run_doctor_refuses_newer_schema() {
    let root = unique_workspace();
    let store = Store::new(root.join("todos.json"), BackupRotator::default());
    let raw = br#"{"version": 2, "next_id": 1, "tasks": []}"#;
    std::fs::write(store.path(), raw).expect("seed");

    let err = run_doctor(&store, None, fix()).expect_err("newer schema");
    assert!(matches!(err, DoctorError::SchemaTooNew(_)));
    assert_eq!(std::fs::read(store.path()).expect("read"), raw);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn run_doctor_reports_lock_backups_and_archive() {
    let root = unique_workspace();
    let primary = root.join("todos.json");
    let store = Store::new(&primary, BackupRotator::default());
    let archive = Store::new(archive_path_for(&primary), BackupRotator::default());
    store.create_if_missing().expect("create");
    std::fs::write(archive.path(), b"garbage").expect("seed archive");

    let report = run_doctor(&store, Some(&archive), DoctorOptions::default()).expect("doctor");
    assert!(report.ok());
    let status = |name: &str| {
        report
            .checks
            .iter()
            .find(|check| check.name == name)
            .map(|check| check.status)
    };
    assert_eq!(status("document"), Some(DoctorStatus::Pass));
    assert_eq!(status("lock_health"), Some(DoctorStatus::Pass));
    assert_eq!(status("backups"), Some(DoctorStatus::Warn));
    assert_eq!(status("archive"), Some(DoctorStatus::Warn));
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn missing_document_is_created_only_with_fix() {
    let root = unique_workspace();
    let store = Store::new(root.join("todos.json"), BackupRotator::default());
    let report = run_doctor(&store, None, DoctorOptions::default()).expect("doctor");
    assert!(report.ok());
    assert!(!store.path().exists());

    let report = run_doctor(&store, None, fix()).expect("doctor with fix");
    assert!(report.written);
    assert_eq!(store.load().expect("load"), Document::default());
    let _ = std::fs::remove_dir_all(root);
}
