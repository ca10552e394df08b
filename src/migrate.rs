use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::CURRENT_VERSION;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u64,
    pub to_version: u64,
    pub notes: Vec<String>,
}

impl MigrationReport {
    pub fn changed(&self) -> bool {
        self.from_version != self.to_version || !self.notes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("document schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: u64, supported: u64 },
}

/// Normalizes a parsed document root to the current schema shape in place.
///
/// Newer schemas are rejected before anything is touched.
pub fn migrate(root: &mut Map<String, Value>) -> Result<MigrationReport, MigrationError> {
    let from_version = root.get("version").and_then(as_counter).unwrap_or(0);
    if from_version > CURRENT_VERSION {
        return Err(MigrationError::SchemaTooNew {
            found: from_version,
            supported: CURRENT_VERSION,
        });
    }

    let mut notes = Vec::new();
    match root.get("version") {
        Some(Value::Number(number)) if number.as_u64().is_some() => {}
        Some(other) => notes.push(format!("version {other} stamped as {CURRENT_VERSION}")),
        None => notes.push(format!("missing version stamped as {CURRENT_VERSION}")),
    }

    let next_id_fix = match root.get("next_id") {
        Some(Value::Number(number)) if number.as_u64().is_some_and(|id| id > 0) => None,
        Some(value) => match as_counter(value).filter(|id| *id > 0) {
            Some(coerced) => Some((coerced, format!("next_id {value} coerced to {coerced}"))),
            None => Some((1, format!("invalid next_id {value} reset to 1"))),
        },
        None => Some((1, "missing next_id set to 1".to_string())),
    };
    if let Some((next_id, note)) = next_id_fix {
        notes.push(note);
        root.insert("next_id".to_string(), Value::from(next_id));
    }

    let tasks_note = match root.get("tasks") {
        Some(Value::Array(_)) => None,
        Some(other) => Some(format!(
            "tasks of type {} replaced with an empty list",
            kind(other)
        )),
        None => Some("missing tasks set to an empty list".to_string()),
    };
    if let Some(note) = tasks_note {
        notes.push(note);
        root.insert("tasks".to_string(), Value::Array(Vec::new()));
    }

    root.insert("version".to_string(), Value::from(CURRENT_VERSION));
    Ok(MigrationReport {
        from_version,
        to_version: CURRENT_VERSION,
        notes,
    })
}

pub(crate) fn as_counter(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(raw) => raw.trim().parse::<u64>().ok(),
        _ => None,
    }
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{migrate, MigrationError};
    use crate::document::CURRENT_VERSION;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("test input is an object")
    }

    #[test]
    fn current_document_is_unchanged() {
        let original = object(json!({"version": 1, "next_id": 3, "tasks": [{"id": 2}]}));
        let mut root = original.clone();
        let report = migrate(&mut root).expect("migrate");
        assert!(!report.changed());
        assert_eq!(root, original);
    }

    #[test]
    fn legacy_document_is_upgraded_with_notes() {
        let mut root = object(json!({"next_id": "4", "tasks": null}));
        let report = migrate(&mut root).expect("migrate");
        assert_eq!(report.from_version, 0);
        assert_eq!(report.to_version, CURRENT_VERSION);
        assert_eq!(report.notes.len(), 3);
        assert_eq!(root["version"], json!(CURRENT_VERSION));
        assert_eq!(root["next_id"], json!(4));
        assert_eq!(root["tasks"], json!([]));
    }

    #[test]
    fn invalid_counter_is_reset() {
        let mut root = object(json!({"version": 1, "next_id": -2, "tasks": []}));
        let report = migrate(&mut root).expect("migrate");
        assert!(report.changed());
        assert_eq!(root["next_id"], json!(1));
    }

    #[test]
    fn future_version_fails_without_touching_input() {
        let original = object(json!({"version": 7, "next_id": "x"}));
        let mut root = original.clone();
        let err = migrate(&mut root).expect_err("newer schema");
        assert_eq!(
            err,
            MigrationError::SchemaTooNew {
                found: 7,
                supported: CURRENT_VERSION
            }
        );
        assert_eq!(root, original);
    }
}
