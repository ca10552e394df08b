use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use uuid::Uuid;

fn unique_workspace(prefix: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&path).expect("workspace should be creatable");
    path
}

fn run_todo(root: &Path, db_path: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_todo"))
        .arg("--db")
        .arg(db_path)
        .args(args)
        .env("TODO_CONFIG", root.join("config.toml"))
        .env_remove("TODO_DB")
        .env_remove("TODO_LOG")
        .env("NO_COLOR", "1")
        .output()
        .expect("todo command should run")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_failure(output: &Output) {
    assert!(
        !output.status.success(),
        "expected failure, stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

fn read_document(path: &Path) -> Value {
    let raw = std::fs::read(path).expect("document should exist");
    serde_json::from_slice(&raw).expect("document should be json")
}

#[test]
fn add_done_list_and_stats_round_trip() {
    let root = unique_workspace("todo-cli-flow");
    let db = root.join("todos.json");

    let add = run_todo(
        &root,
        &db,
        &["add", "buy", "milk", "-p", "high", "--due", "2030-01-05", "-t", "home"],
    );
    assert_success(&add);
    assert!(String::from_utf8_lossy(&add.stdout).contains("added #1 buy milk"));

    assert_success(&run_todo(&root, &db, &["add", "call", "mom"]));
    assert_success(&run_todo(&root, &db, &["done", "1"]));

    let listed = stdout_json(&run_todo(&root, &db, &["ls", "--pending", "--json"]));
    let tasks = listed.as_array().expect("task list");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["text"], "call mom");

    let document = read_document(&db);
    assert_eq!(document["version"], 1);
    assert_eq!(document["next_id"], 3);
    let first = &document["tasks"][0];
    assert_eq!(first["done"], true);
    assert_eq!(first["priority"], "high");
    assert_eq!(first["due"], "2030-01-05");
    assert_eq!(first["tags"], serde_json::json!(["home"]));
    assert!(!first["done_at"].as_str().unwrap_or_default().is_empty());

    let stats = stdout_json(&run_todo(&root, &db, &["stats", "--json"]));
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["done"], 1);
    assert_eq!(stats["pending"], 1);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn concurrent_adds_get_unique_ids() {
    let root = unique_workspace("todo-cli-concurrent");
    let db = root.join("todos.json");

    let workers = (0..2)
        .map(|worker| {
            let root = root.clone();
            let db = db.clone();
            std::thread::spawn(move || {
                for n in 0..25 {
                    let text = format!("worker {worker} task {n}");
                    let output = run_todo(&root, &db, &["add", &text]);
                    assert_success(&output);
                }
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().expect("worker should finish");
    }

    let document = read_document(&db);
    let mut ids = document["tasks"]
        .as_array()
        .expect("tasks")
        .iter()
        .map(|task| task["id"].as_u64().expect("numeric id"))
        .collect::<Vec<_>>();
    ids.sort_unstable();
    assert_eq!(ids, (1..=50).collect::<Vec<_>>());
    assert_eq!(document["next_id"], 51);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn second_write_leaves_a_backup_of_the_first() {
    let root = unique_workspace("todo-cli-backup");
    let db = root.join("todos.json");

    assert_success(&run_todo(&root, &db, &["add", "first"]));
    let before = std::fs::read(&db).expect("document");
    assert_success(&run_todo(&root, &db, &["add", "second"]));

    let backup = root.join("todos.json.1");
    assert_eq!(std::fs::read(&backup).expect("backup should exist"), before);

    assert_success(&run_todo(&root, &db, &["restore"]));
    let restored = read_document(&db);
    assert_eq!(restored["tasks"].as_array().map(Vec::len), Some(1));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn newer_schema_is_refused_without_touching_the_file() {
    let root = unique_workspace("todo-cli-future");
    let db = root.join("todos.json");
    let raw = br#"{"version": 99, "next_id": 1, "tasks": []}"#;
    std::fs::write(&db, raw).expect("seed document");

    let output = run_todo(&root, &db, &["add", "anything"]);
    assert_failure(&output);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("error:"));
    assert_eq!(std::fs::read(&db).expect("document"), raw);
    assert!(!root.join("todos.json.1").exists());

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn invalid_arguments_exit_with_one_and_write_nothing() {
    let root = unique_workspace("todo-cli-invalid");
    let db = root.join("todos.json");

    let output = run_todo(&root, &db, &["add", "x", "-p", "urgent"]);
    assert_failure(&output);
    assert_eq!(output.status.code(), Some(1));
    assert!(!db.exists());

    assert_success(&run_todo(&root, &db, &["add", "x"]));
    let missing = run_todo(&root, &db, &["done", "42"]);
    assert_eq!(missing.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&missing.stderr).contains("#42"));

    let bad_sort = run_todo(&root, &db, &["ls", "--sort", "alphabetical"]);
    assert_eq!(bad_sort.status.code(), Some(1));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn doctor_fix_repairs_and_archive_moves_done_tasks() {
    let root = unique_workspace("todo-cli-doctor");
    let db = root.join("todos.json");
    std::fs::write(
        &db,
        r#"{"version": 1, "next_id": 1, "tasks": [
            {"id": 1, "text": "a", "done": true},
            {"id": 1, "text": "b", "done": "nope"}
        ]}"#,
    )
    .expect("seed document");

    let check = run_todo(&root, &db, &["doctor"]);
    assert_eq!(check.status.code(), Some(1));

    assert_success(&run_todo(&root, &db, &["doctor", "--fix"]));
    assert_success(&run_todo(&root, &db, &["doctor"]));

    let archive = run_todo(&root, &db, &["archive"]);
    assert_success(&archive);
    assert!(String::from_utf8_lossy(&archive.stdout).contains("archived 1 task(s)"));

    let archived = stdout_json(&run_todo(&root, &db, &["ls", "--archived", "--json"]));
    assert_eq!(archived.as_array().map(Vec::len), Some(1));
    assert_eq!(archived[0]["text"], "a");

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn path_reports_the_flag_value() {
    let root = unique_workspace("todo-cli-path");
    let db = root.join("lists").join("mine.json");

    let output = run_todo(&root, &db, &["path"]);
    assert_success(&output);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        db.display().to_string()
    );

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn doctor_points_at_the_right_remedy() {
    let root = unique_workspace("todo-cli-remedy");
    let db = root.join("todos.json");

    std::fs::write(&db, b"{\"tasks\": [").expect("seed corrupt document");
    let corrupt = run_todo(&root, &db, &["doctor"]);
    assert_eq!(corrupt.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&corrupt.stderr);
    assert!(stderr.contains("--restore"), "{stderr}");

    std::fs::write(
        &db,
        r#"{"version": 1, "next_id": 2, "tasks": {"1": {"id": 1, "text": "a"}}}"#,
    )
    .expect("seed object tasks");
    let shaped = run_todo(&root, &db, &["doctor"]);
    assert_eq!(shaped.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&shaped.stderr);
    assert!(stderr.contains("--fix"), "{stderr}");
    assert!(!stderr.contains("--restore"), "{stderr}");

    let _ = std::fs::remove_dir_all(root);
}
