use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use time::Date;

use crate::domain::dates::days_until;
use crate::domain::priority::Priority;
use crate::domain::task::{normalize_tag, Task};

/// Tasks due within this many days (after today) count as due soon.
pub const DUE_SOON_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DoneFilter {
    #[default]
    Any,
    Pending,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskListFilter {
    pub done: DoneFilter,
    pub tag: Option<String>,
    pub query: Option<String>,
    pub bugs_only: bool,
}

pub fn apply_filters(tasks: Vec<Task>, filter: &TaskListFilter) -> Vec<Task> {
    let tag = filter.tag.as_deref().and_then(normalize_tag);
    let query = filter
        .query
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .map(str::to_lowercase);

    tasks
        .into_iter()
        .filter(|task| match filter.done {
            DoneFilter::Any => true,
            DoneFilter::Pending => !task.done,
            DoneFilter::Done => task.done,
        })
        .filter(|task| tag.as_ref().is_none_or(|tag| task.tags.contains(tag)))
        .filter(|task| {
            query
                .as_deref()
                .is_none_or(|query| task.text.to_lowercase().contains(query))
        })
        .filter(|task| !filter.bugs_only || task.is_bug())
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Created,
    Due,
    Priority,
}

impl SortKey {
    pub const ALL: [SortKey; 3] = [SortKey::Created, SortKey::Due, SortKey::Priority];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Created => "created",
            SortKey::Due => "due",
            SortKey::Priority => "priority",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid sort '{0}': must be one of created, due, priority")]
pub struct ParseSortKeyError(String);

impl FromStr for SortKey {
    type Err = ParseSortKeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        SortKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| ParseSortKeyError(value.to_string()))
    }
}

/// Presentation order only; the stored order is never changed.
///
/// `Due` puts overdue tasks first, then upcoming ones, then tasks with no due date.
pub fn sort_tasks(tasks: &mut [Task], key: SortKey) {
    match key {
        SortKey::Created => {
            tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
        }
        SortKey::Due => tasks.sort_by(|a, b| {
            due_order(a.due, b.due)
                .then(a.priority.rank().cmp(&b.priority.rank()))
                .then(a.id.cmp(&b.id))
        }),
        SortKey::Priority => tasks.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(due_order(a.due, b.due))
                .then(a.id.cmp(&b.id))
        }),
    }
}

fn due_order(a: Option<Date>, b: Option<Date>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// How a pending task's due date relates to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueState {
    Overdue(i64),
    Today,
    Soon(i64),
    Later(i64),
}

pub fn due_state(due: Date, today: Date) -> DueState {
    let days = days_until(due, today);
    match days {
        ..=-1 => DueState::Overdue(-days),
        0 => DueState::Today,
        1..=DUE_SOON_DAYS => DueState::Soon(days),
        _ => DueState::Later(days),
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub done: usize,
    pub pending: usize,
    pub high_priority: usize,
    pub overdue: usize,
    pub due_today: usize,
    pub due_soon: usize,
    pub bugs: usize,
    pub open_bugs: usize,
}

/// Counts over `tasks`. Due buckets and priority only consider pending tasks.
pub fn compute_stats(tasks: &[Task], today: Date) -> TaskStats {
    let mut stats = TaskStats {
        total: tasks.len(),
        ..TaskStats::default()
    };
    for task in tasks {
        if task.is_bug() {
            stats.bugs += 1;
            if !task.done {
                stats.open_bugs += 1;
            }
        }
        if task.done {
            stats.done += 1;
            continue;
        }
        stats.pending += 1;
        if task.priority == Priority::High {
            stats.high_priority += 1;
        }
        match task.due.map(|due| due_state(due, today)) {
            Some(DueState::Overdue(_)) => stats.overdue += 1,
            Some(DueState::Today) => stats.due_today += 1,
            Some(DueState::Soon(_)) => stats.due_soon += 1,
            Some(DueState::Later(_)) | None => {}
        }
    }
    stats
}
