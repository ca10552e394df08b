use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use time::Date;

use crate::domain::bug::{BugFields, BugSeverity, BugStatus};
use crate::domain::dates::{format_due, parse_due};
use crate::domain::priority::Priority;

/// One task entry. A task counts as a bug when it carries bug fields or the `bug` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub text: String,
    pub done: bool,
    pub created_at: String,
    pub done_at: String,
    pub priority: Priority,
    pub due: Option<Date>,
    pub tags: BTreeSet<String>,
    pub bug: BugFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("task entry must be a JSON object")]
    NotAnObject,
    #[error("task entry is missing required field 'id'")]
    MissingId,
    #[error("task id {0} is not a positive integer")]
    InvalidId(String),
}

impl Task {
    pub fn new(id: u64, text: &str, created_at: &str) -> Self {
        Self {
            id,
            text: text.trim().to_string(),
            done: false,
            created_at: created_at.to_string(),
            done_at: String::new(),
            priority: Priority::None,
            due: None,
            tags: BTreeSet::new(),
            bug: BugFields::default(),
        }
    }

    pub fn is_bug(&self) -> bool {
        !self.bug.is_empty() || self.tags.iter().any(|tag| tag.eq_ignore_ascii_case("bug"))
    }

    /// Returns whether the flag actually changed.
    pub fn set_done(&mut self, done: bool, now: &str) -> bool {
        if self.done == done {
            return false;
        }
        self.done = done;
        self.done_at = if done { now.to_string() } else { String::new() };
        true
    }

    pub fn add_tag(&mut self, raw: &str) -> bool {
        match normalize_tag(raw) {
            Some(tag) => self.tags.insert(tag),
            None => false,
        }
    }

    pub fn remove_tag(&mut self, raw: &str) -> bool {
        match normalize_tag(raw) {
            Some(tag) => self.tags.remove(&tag),
            None => false,
        }
    }

    pub fn encode(&self) -> Value {
        serde_json::to_value(self).expect("task serialization should never fail")
    }

    pub fn decode(value: &Value) -> Result<Task, DecodeError> {
        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
        let id = decode_id(object.get("id"))?;
        let bug = BugFields {
            status: string_field(object, "bug_status")
                .and_then(|raw| BugStatus::from_str(raw).ok()),
            assignee: string_field(object, "bug_assignee")
                .unwrap_or_default()
                .to_string(),
            severity: string_field(object, "bug_severity")
                .and_then(|raw| BugSeverity::from_str(raw).ok()),
            steps: string_field(object, "bug_steps")
                .unwrap_or_default()
                .to_string(),
            environment: string_field(object, "bug_environment")
                .unwrap_or_default()
                .to_string(),
        };

        Ok(Task {
            id,
            text: string_field(object, "text").unwrap_or_default().to_string(),
            done: object.get("done").and_then(Value::as_bool).unwrap_or(false),
            created_at: string_field(object, "created_at")
                .unwrap_or_default()
                .to_string(),
            done_at: string_field(object, "done_at")
                .unwrap_or_default()
                .to_string(),
            priority: Priority::from_stored(string_field(object, "priority").unwrap_or_default()),
            due: string_field(object, "due")
                .filter(|raw| !raw.trim().is_empty())
                .and_then(|raw| parse_due(raw).ok()),
            tags: object
                .get("tags")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .filter(|tag| !tag.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            bug,
        })
    }
}

/// Trims, lowercases and strips a leading `#`. Empty input yields `None`.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('#').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

fn decode_id(value: Option<&Value>) -> Result<u64, DecodeError> {
    let parsed = match value {
        None | Some(Value::Null) => return Err(DecodeError::MissingId),
        Some(Value::Number(number)) => number.as_u64(),
        Some(Value::String(raw)) => raw.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    match parsed {
        Some(id) if id > 0 => Ok(id),
        _ => Err(DecodeError::InvalidId(
            value.map(Value::to_string).unwrap_or_default(),
        )),
    }
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

#[derive(Serialize)]
struct TaskWire<'a> {
    id: u64,
    text: &'a str,
    done: bool,
    created_at: &'a str,
    done_at: &'a str,
    priority: Priority,
    due: String,
    tags: &'a BTreeSet<String>,
    #[serde(flatten)]
    bug: Option<BugWire<'a>>,
}

#[derive(Serialize)]
struct BugWire<'a> {
    bug_status: &'static str,
    bug_assignee: &'a str,
    bug_severity: &'static str,
    bug_steps: &'a str,
    bug_environment: &'a str,
}

impl Serialize for Task {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bug = (!self.bug.is_empty()).then(|| BugWire {
            bug_status: self.bug.status.map(BugStatus::as_str).unwrap_or_default(),
            bug_assignee: &self.bug.assignee,
            bug_severity: self.bug.severity.map(BugSeverity::as_str).unwrap_or_default(),
            bug_steps: &self.bug.steps,
            bug_environment: &self.bug.environment,
        });
        TaskWire {
            id: self.id,
            text: &self.text,
            done: self.done,
            created_at: &self.created_at,
            done_at: &self.done_at,
            priority: self.priority,
            due: self.due.map(format_due).unwrap_or_default(),
            tags: &self.tags,
            bug,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Task {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Task::decode(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::date;

    use super::{normalize_tag, DecodeError, Task};
    use crate::domain::bug::{BugSeverity, BugStatus};
    use crate::domain::priority::Priority;

    fn sample() -> Task {
        let mut task = Task::new(7, "  write release notes ", "2024-03-01T09:00:00Z");
        task.priority = Priority::High;
        task.due = Some(date!(2024 - 03 - 15));
        task.add_tag("Docs");
        task.add_tag("#release");
        task
    }

    #[test]
    fn round_trip_without_bug_fields_omits_them() {
        let task = sample();
        let encoded = task.encode();
        let object = encoded.as_object().expect("encoded task is an object");
        assert!(!object.contains_key("bug_status"));
        assert!(!object.contains_key("bug_environment"));
        assert_eq!(object["due"], json!("2024-03-15"));
        assert_eq!(object["tags"], json!(["docs", "release"]));
        assert_eq!(Task::decode(&encoded).expect("decode"), task);
    }

    #[test]
    fn round_trip_with_some_bug_fields_writes_all_of_them() {
        let mut task = sample();
        task.bug.severity = Some(BugSeverity::Critical);
        task.bug.steps = "open app\nclick save".to_string();
        let encoded = task.encode();
        let object = encoded.as_object().expect("encoded task is an object");
        assert_eq!(object["bug_severity"], json!("critical"));
        assert_eq!(object["bug_status"], json!(""));
        assert_eq!(object["bug_assignee"], json!(""));
        assert_eq!(Task::decode(&encoded).expect("decode"), task);
    }

    #[test]
    fn encoding_keeps_declaration_key_order() {
        let text = serde_json::to_string(&sample()).expect("serialize");
        let id_at = text.find("\"id\"").expect("id key");
        let text_at = text.find("\"text\"").expect("text key");
        let tags_at = text.find("\"tags\"").expect("tags key");
        assert!(id_at < text_at && text_at < tags_at);
    }

    #[test]
    fn decode_degrades_bad_fields_to_defaults() {
        let task = Task::decode(&json!({
            "id": "12",
            "text": 5,
            "done": "yes",
            "priority": "urgent",
            "due": "someday",
            "tags": ["b", 3, "a", "a", " "],
            "bug_status": "triaged"
        }))
        .expect("only id is mandatory");
        assert_eq!(task.id, 12);
        assert_eq!(task.text, "");
        assert!(!task.done);
        assert_eq!(task.priority, Priority::None);
        assert_eq!(task.due, None);
        assert_eq!(task.tags.iter().cloned().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(task.bug.is_empty());
    }

    #[test]
    fn decode_requires_positive_id() {
        assert_eq!(
            Task::decode(&json!({"text": "x"})),
            Err(DecodeError::MissingId)
        );
        assert!(matches!(
            Task::decode(&json!({"id": 0})),
            Err(DecodeError::InvalidId(_))
        ));
        assert!(matches!(
            Task::decode(&json!({"id": -3})),
            Err(DecodeError::InvalidId(_))
        ));
        assert_eq!(Task::decode(&json!([1])), Err(DecodeError::NotAnObject));
    }

    #[test]
    fn is_bug_is_derived_from_fields_and_tag() {
        let mut task = sample();
        assert!(!task.is_bug());
        task.add_tag("BUG");
        assert!(task.is_bug());
        task.remove_tag("bug");
        assert!(!task.is_bug());
        task.bug.status = Some(BugStatus::Open);
        assert!(task.is_bug());
    }

    #[test]
    fn set_done_stamps_and_clears_done_at() {
        let mut task = sample();
        assert!(task.set_done(true, "2024-03-02T10:00:00Z"));
        assert_eq!(task.done_at, "2024-03-02T10:00:00Z");
        assert!(!task.set_done(true, "2024-03-05T10:00:00Z"));
        assert_eq!(task.done_at, "2024-03-02T10:00:00Z");
        assert!(task.set_done(false, "2024-03-06T10:00:00Z"));
        assert_eq!(task.done_at, "");
    }

    #[test]
    fn normalize_tag_strips_hash_and_case() {
        assert_eq!(normalize_tag(" #Home "), Some("home".to_string()));
        assert_eq!(normalize_tag("#"), None);
    }
}
