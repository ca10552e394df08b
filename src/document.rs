use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::task::{DecodeError, Task};

pub const CURRENT_VERSION: u64 = 1;

/// One JSON document: the primary list or the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub version: u64,
    pub next_id: u64,
    pub tasks: Vec<Task>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            next_id: 1,
            tasks: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document root must be a JSON object")]
    RootNotObject,
    #[error("field '{0}' must be a non-negative integer")]
    InvalidCounter(&'static str),
    #[error("field 'tasks' must be a list")]
    TasksNotList,
    #[error("task at index {index}: {source}")]
    Task {
        index: usize,
        #[source]
        source: DecodeError,
    },
}

impl Document {
    pub fn max_id(&self) -> u64 {
        self.tasks.iter().map(|task| task.id).max().unwrap_or(0)
    }

    pub fn find(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn find_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    /// Assigns the next id and appends. `next_id` is kept above every stored id.
    pub fn push_new(&mut self, mut task: Task) -> &Task {
        let id = self.next_id.max(self.max_id() + 1);
        task.id = id;
        self.next_id = id + 1;
        self.tasks.push(task);
        &self.tasks[self.tasks.len() - 1]
    }

    pub fn from_value(value: &Value) -> Result<Document, DocumentError> {
        let object = value.as_object().ok_or(DocumentError::RootNotObject)?;
        let version = counter_field(object, "version", CURRENT_VERSION)?;
        let next_id = counter_field(object, "next_id", 1)?;
        let tasks = match object.get("tasks") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    Task::decode(item).map_err(|source| DocumentError::Task { index, source })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(DocumentError::TasksNotList),
        };
        Ok(Document {
            version,
            next_id,
            tasks,
        })
    }
}

fn counter_field(
    object: &Map<String, Value>,
    key: &'static str,
    default: u64,
) -> Result<u64, DocumentError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(number)) => number
            .as_u64()
            .ok_or(DocumentError::InvalidCounter(key)),
        Some(Value::String(raw)) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| DocumentError::InvalidCounter(key)),
        Some(_) => Err(DocumentError::InvalidCounter(key)),
    }
}

/// Strict parse used by the repair path. Empty input is a fresh document.
pub fn parse_strict(raw: &[u8]) -> Result<Document, DocumentError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::default());
    }
    let value: Value = serde_json::from_slice(raw)?;
    Document::from_value(&value)
}

/// Lenient load for routine commands: anything unparseable becomes an empty document.
pub fn load(raw: &[u8]) -> Document {
    match parse_strict(raw) {
        Ok(document) => document,
        Err(err) => {
            tracing::warn!(error = %err, "document is not readable; treating it as empty");
            Document::default()
        }
    }
}

#[derive(Serialize)]
struct DocumentWire<'a> {
    version: u64,
    next_id: u64,
    tasks: &'a [Task],
}

pub fn dump(document: &Document) -> Vec<u8> {
    let mut out = serde_json::to_vec_pretty(&DocumentWire {
        version: document.version,
        next_id: document.next_id,
        tasks: &document.tasks,
    })
    .expect("document serialization should never fail");
    out.push(b'\n');
    out
}
