use time::macros::date;

use super::{filter_summary, format_task_row, task_show_fields, Palette};
use crate::domain::bug::{BugSeverity, BugStatus};
use crate::domain::priority::Priority;
use crate::domain::task::Task;
use crate::listing::{DoneFilter, SortKey, TaskListFilter};

fn sample_task() -> Task {
    let mut task = Task::new(7, "Fix login", "2026-02-24T10:00:00Z");
    task.priority = Priority::High;
    task.due = Some(date!(2026 - 02 - 20));
    task.add_tag("auth");
    task.add_tag("web");
    task
}

#[test]
fn row_formatting_covers_priority_due_tags_and_bug_paths() {
    let palette = Palette::plain();
    let today = date!(2026 - 02 - 25);
    let mut task = sample_task();

    let row = format_task_row(&task, &palette, today);
    assert_eq!(
        row,
        "[ ] #  7 Fix login !HIGH due 2026-02-20 (5d overdue) #auth #web"
    );

    task.bug.status = Some(BugStatus::Fixed);
    task.bug.severity = Some(BugSeverity::Critical);
    task.set_done(true, "2026-02-25T09:00:00Z");
    let row = format_task_row(&task, &palette, today);
    assert!(row.starts_with("[x] #  7 Fix login"));
    assert!(row.contains("due 2026-02-20"));
    assert!(!row.contains("overdue"));
    assert!(row.ends_with("[bug:fixed]"));
}

#[test]
fn due_labels_are_relative_to_today() {
    let palette = Palette::plain();
    let today = date!(2026 - 02 - 25);
    let mut task = Task::new(1, "call", "");

    task.due = Some(today);
    assert!(format_task_row(&task, &palette, today).ends_with("due today"));
    task.due = Some(date!(2026 - 02 - 26));
    assert!(format_task_row(&task, &palette, today).ends_with("due tomorrow"));
    task.due = Some(date!(2026 - 02 - 28));
    assert!(format_task_row(&task, &palette, today).ends_with("due 2026-02-28 (3d)"));
    task.due = Some(date!(2026 - 04 - 01));
    assert!(format_task_row(&task, &palette, today).ends_with("due 2026-04-01"));
}

#[test]
fn colors_wrap_when_enabled() {
    let palette = Palette { enabled: true };
    assert_eq!(palette.heading("Tasks"), "\x1b[1;36mTasks\x1b[0m");
    assert_eq!(Palette::plain().heading("Tasks"), "Tasks");
}

#[test]
fn show_fields_skip_empty_values_and_include_bug_details() {
    let mut task = sample_task();
    let labels = |task: &Task| {
        task_show_fields(task)
            .into_iter()
            .map(|(label, _)| label)
            .collect::<Vec<_>>()
    };
    assert_eq!(
        labels(&task),
        vec!["id", "text", "status", "created", "priority", "due", "tags"]
    );

    task.bug.severity = Some(BugSeverity::Medium);
    task.bug.steps = "open app\nclick login".to_string();
    let fields = task_show_fields(&task);
    assert!(fields.contains(&("severity", "medium".to_string())));
    assert!(fields.contains(&("steps", "open app\nclick login".to_string())));
    assert!(!fields.iter().any(|(label, _)| *label == "bug status"));
}

#[test]
fn filter_summary_formats_only_active_filters() {
    let filter = TaskListFilter {
        done: DoneFilter::Pending,
        tag: Some("home".to_string()),
        query: Some(" ".to_string()),
        bugs_only: true,
    };
    assert_eq!(
        filter_summary(&filter, SortKey::Due).expect("summary should exist"),
        "status=pending tag=home bugs=true sort=due"
    );
    assert!(filter_summary(&TaskListFilter::default(), SortKey::Created).is_none());
}
