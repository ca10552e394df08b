use std::io::{self, IsTerminal};

use time::Date;

use crate::app::MigrationOutcome;
use crate::doctor::{DoctorReport, DoctorStatus};
use crate::domain::dates::format_due;
use crate::domain::priority::Priority;
use crate::domain::task::Task;
use crate::listing::{due_state, DoneFilter, DueState, SortKey, TaskListFilter, TaskStats};

pub fn print_task_list(
    heading: &str,
    tasks: &[Task],
    filter: &TaskListFilter,
    sort: SortKey,
    palette: &Palette,
    today: Date,
) {
    println!("{}", palette.heading(heading));
    if let Some(summary) = filter_summary(filter, sort) {
        println!("{}", palette.dim(&format!("filters: {summary}")));
    }

    if tasks.is_empty() {
        println!("{}", palette.dim("no tasks matched"));
        return;
    }

    for task in tasks {
        println!("{}", format_task_row(task, palette, today));
    }
    let done = tasks.iter().filter(|task| task.done).count();
    println!(
        "{}",
        palette.dim(&format!(
            "{} task(s), {} pending, {} done",
            tasks.len(),
            tasks.len() - done,
            done
        ))
    );
}

pub(crate) fn format_task_row(task: &Task, palette: &Palette, today: Date) -> String {
    let marker = if task.done { "[x]" } else { "[ ]" };
    let text = if task.done {
        palette.dim(&task.text)
    } else if task.priority == Priority::High {
        palette.bold(&task.text)
    } else {
        task.text.clone()
    };
    let mut line = format!(
        "{} {} {}",
        palette.marker(marker, task.done),
        palette.id(&format!("#{:>3}", task.id)),
        text
    );

    if task.priority.is_set() {
        line.push(' ');
        line.push_str(&palette.priority(task.priority));
    }
    if let Some(due) = task.due {
        line.push(' ');
        line.push_str(&palette.due(due, today, task.done));
    }
    if !task.tags.is_empty() {
        let tags = task
            .tags
            .iter()
            .map(|tag| format!("#{tag}"))
            .collect::<Vec<_>>()
            .join(" ");
        line.push(' ');
        line.push_str(&palette.tags(&tags));
    }
    if task.is_bug() {
        let status = task
            .bug
            .status
            .map(|status| status.as_str())
            .unwrap_or("open");
        line.push(' ');
        line.push_str(&palette.bug(&format!("[bug:{status}]")));
    }
    line
}

/// Lines of `label: value` pairs for `show`. Empty values are skipped.
pub(crate) fn task_show_fields(task: &Task) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("id", task.id.to_string()),
        ("text", task.text.clone()),
        (
            "status",
            if task.done { "done" } else { "pending" }.to_string(),
        ),
        ("created", task.created_at.clone()),
        ("completed", task.done_at.clone()),
        ("priority", task.priority.as_str().to_string()),
        ("due", task.due.map(format_due).unwrap_or_default()),
        (
            "tags",
            task.tags.iter().cloned().collect::<Vec<_>>().join(", "),
        ),
    ];
    if task.is_bug() {
        fields.extend([
            (
                "bug status",
                task.bug
                    .status
                    .map(|status| status.as_str().to_string())
                    .unwrap_or_default(),
            ),
            (
                "severity",
                task.bug
                    .severity
                    .map(|severity| severity.as_str().to_string())
                    .unwrap_or_default(),
            ),
            ("assignee", task.bug.assignee.clone()),
            ("environment", task.bug.environment.clone()),
            ("steps", task.bug.steps.clone()),
        ]);
    }
    fields.retain(|(_, value)| !value.is_empty());
    fields
}

pub fn print_task_show(task: &Task, palette: &Palette) {
    println!(
        "{} {}",
        palette.id(&format!("#{}", task.id)),
        palette.heading(&task.text)
    );
    for (label, value) in task_show_fields(task)
        .into_iter()
        .filter(|(label, _)| !matches!(*label, "id" | "text"))
    {
        let mut lines = value.lines();
        let first = lines.next().unwrap_or_default();
        println!("  {} {}", palette.dim(&format!("{label:>11}:")), first);
        for rest in lines {
            println!("  {:>12} {}", "", rest);
        }
    }
}

pub fn print_stats(stats: &TaskStats, palette: &Palette) {
    println!("{}", palette.heading("Stats"));
    if stats.total == 0 {
        println!("{}", palette.dim("no tasks yet"));
        return;
    }
    let rows = [
        ("total", stats.total, ""),
        ("pending", stats.pending, "33"),
        ("done", stats.done, "32"),
        ("high priority", stats.high_priority, "31"),
        ("overdue", stats.overdue, "1;31"),
        ("due today", stats.due_today, "33"),
        ("due soon", stats.due_soon, "36"),
        ("bugs", stats.bugs, "35"),
        ("open bugs", stats.open_bugs, "35"),
    ];
    for (label, count, code) in rows {
        let value = count.to_string();
        let value = if count > 0 && !code.is_empty() {
            palette.paint(code, &value)
        } else {
            value
        };
        println!("  {:>13}  {}", label, value);
    }
}

pub fn print_doctor_report(report: &DoctorReport, palette: &Palette) {
    println!(
        "{} {}",
        palette.heading("doctor"),
        palette.dim(&report.path.display().to_string())
    );
    for check in &report.checks {
        println!(
            "{} {} {}",
            palette.status(check.status),
            check.name,
            palette.dim(&check.detail)
        );
    }
    if let Some(backup) = report.restored_from.as_ref() {
        println!("restored from {}", backup.display());
    }
    for issue in &report.issues {
        println!("  {} {}", palette.paint("31", "issue:"), issue);
    }
    for note in &report.notes {
        println!("  {} {}", palette.dim("note:"), note);
    }
    if report.written {
        println!("{}", palette.paint("32", "document written"));
    }
    let failures = report.failure_count();
    if failures > 0 {
        println!("{}", palette.paint("1;31", &format!("{failures} failing check(s)")));
    }
}

pub fn print_migration(outcome: &MigrationOutcome, palette: &Palette) {
    let report = &outcome.report;
    let verb = if outcome.written {
        "migrated"
    } else if outcome.dry_run && report.changed() {
        "would migrate"
    } else {
        "up to date"
    };
    println!(
        "{} version {} -> {}",
        palette.heading(verb),
        report.from_version,
        report.to_version
    );
    for note in &report.notes {
        println!("  - {note}");
    }
}

pub(crate) fn filter_summary(filter: &TaskListFilter, sort: SortKey) -> Option<String> {
    let mut parts = Vec::new();
    match filter.done {
        DoneFilter::Any => {}
        DoneFilter::Pending => parts.push("status=pending".to_string()),
        DoneFilter::Done => parts.push("status=done".to_string()),
    }
    if let Some(tag) = filter.tag.as_deref().and_then(non_empty) {
        parts.push(format!("tag={tag}"));
    }
    if let Some(query) = filter.query.as_deref().and_then(non_empty) {
        parts.push(format!("search={query}"));
    }
    if filter.bugs_only {
        parts.push("bugs=true".to_string());
    }
    if sort != SortKey::Created {
        parts.push(format!("sort={sort}"));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    pub fn plain() -> Self {
        Self { enabled: false }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    pub fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn marker(&self, marker: &str, done: bool) -> String {
        self.paint(if done { "32" } else { "37" }, marker)
    }

    fn priority(&self, priority: Priority) -> String {
        let label = format!("!{}", priority.as_str().to_ascii_uppercase());
        let code = match priority {
            Priority::High => "1;31",
            Priority::Med => "33",
            Priority::Low => "34",
            Priority::None => "2",
        };
        self.paint(code, &label)
    }

    fn due(&self, due: Date, today: Date, done: bool) -> String {
        let date = format_due(due);
        if done {
            return self.dim(&format!("due {date}"));
        }
        match due_state(due, today) {
            DueState::Overdue(days) => self.paint("1;31", &format!("due {date} ({days}d overdue)")),
            DueState::Today => self.paint("1;33", "due today"),
            DueState::Soon(1) => self.paint("33", "due tomorrow"),
            DueState::Soon(days) => self.paint("33", &format!("due {date} ({days}d)")),
            DueState::Later(_) => self.paint("36", &format!("due {date}")),
        }
    }

    fn tags(&self, text: &str) -> String {
        self.paint("90", text)
    }

    fn bug(&self, text: &str) -> String {
        self.paint("35", text)
    }

    fn status(&self, status: DoctorStatus) -> String {
        match status {
            DoctorStatus::Pass => self.paint("32", "[pass]"),
            DoctorStatus::Warn => self.paint("33", "[warn]"),
            DoctorStatus::Fail => self.paint("1;31", "[fail]"),
        }
    }
}

#[cfg(test)]
#[path = "ui_tests_ext.rs"]
mod tests_ext;
