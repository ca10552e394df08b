use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BugStatus {
    #[default]
    Open,
    InProgress,
    Fixed,
    Closed,
}

impl BugStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BugStatus::Open => "open",
            BugStatus::InProgress => "in-progress",
            BugStatus::Fixed => "fixed",
            BugStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for BugStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BugStatus {
    type Err = ParseBugFieldError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "open" => Ok(BugStatus::Open),
            "in-progress" | "inprogress" | "wip" => Ok(BugStatus::InProgress),
            "fixed" => Ok(BugStatus::Fixed),
            "closed" => Ok(BugStatus::Closed),
            _ => Err(ParseBugFieldError::Status(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BugSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl BugSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            BugSeverity::Critical => "critical",
            BugSeverity::High => "high",
            BugSeverity::Medium => "medium",
            BugSeverity::Low => "low",
        }
    }
}

impl fmt::Display for BugSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BugSeverity {
    type Err = ParseBugFieldError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" | "crit" => Ok(BugSeverity::Critical),
            "high" => Ok(BugSeverity::High),
            "medium" | "med" => Ok(BugSeverity::Medium),
            "low" => Ok(BugSeverity::Low),
            _ => Err(ParseBugFieldError::Severity(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseBugFieldError {
    #[error("invalid bug status '{0}': expected one of open, in-progress, fixed, closed")]
    Status(String),
    #[error("invalid bug severity '{0}': expected one of critical, high, medium, low")]
    Severity(String),
}

/// Bug-tracking fields carried by a task. Everything unset means "not a bug record".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BugFields {
    pub status: Option<BugStatus>,
    pub assignee: String,
    pub severity: Option<BugSeverity>,
    pub steps: String,
    pub environment: String,
}

impl BugFields {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.severity.is_none()
            && self.assignee.is_empty()
            && self.steps.is_empty()
            && self.environment.is_empty()
    }
}

/// Partial update for [`BugFields`]. `Some("")` clears a text field.
#[derive(Debug, Clone, Default)]
pub struct BugPatch {
    pub status: Option<BugStatus>,
    pub assignee: Option<String>,
    pub severity: Option<BugSeverity>,
    pub steps: Option<String>,
    pub environment: Option<String>,
    pub clear: bool,
}

impl BugPatch {
    pub fn has_changes(&self) -> bool {
        self.clear
            || self.status.is_some()
            || self.assignee.is_some()
            || self.severity.is_some()
            || self.steps.is_some()
            || self.environment.is_some()
    }

    pub fn apply(&self, fields: &mut BugFields) {
        if self.clear {
            *fields = BugFields::default();
        }
        if let Some(status) = self.status {
            fields.status = Some(status);
        }
        if let Some(severity) = self.severity {
            fields.severity = Some(severity);
        }
        if let Some(assignee) = self.assignee.as_deref() {
            fields.assignee = assignee.trim().to_string();
        }
        if let Some(steps) = self.steps.as_deref() {
            fields.steps = steps.trim_end().to_string();
        }
        if let Some(environment) = self.environment.as_deref() {
            fields.environment = environment.trim().to_string();
        }
        if fields.status.is_none() && !fields.is_empty() {
            fields.status = Some(BugStatus::Open);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BugFields, BugPatch, BugSeverity, BugStatus};
    use std::str::FromStr;

    #[test]
    fn status_accepts_underscore_and_dash_forms() {
        assert_eq!(
            BugStatus::from_str("in_progress").unwrap(),
            BugStatus::InProgress
        );
        assert_eq!(
            BugStatus::from_str("In-Progress").unwrap(),
            BugStatus::InProgress
        );
        assert!(BugStatus::from_str("triaged").is_err());
    }

    #[test]
    fn severity_rejects_unknown() {
        assert_eq!(
            BugSeverity::from_str("CRITICAL").unwrap(),
            BugSeverity::Critical
        );
        let err = BugSeverity::from_str("blocker").expect_err("not a severity");
        assert!(err.to_string().contains("critical, high, medium, low"));
    }

    #[test]
    fn first_bug_field_defaults_status_to_open() {
        let mut fields = BugFields::default();
        BugPatch {
            assignee: Some("sam".to_string()),
            ..BugPatch::default()
        }
        .apply(&mut fields);
        assert_eq!(fields.status, Some(BugStatus::Open));
        assert_eq!(fields.assignee, "sam");
    }

    #[test]
    fn clear_resets_everything() {
        let mut fields = BugFields {
            status: Some(BugStatus::Fixed),
            assignee: "sam".to_string(),
            ..BugFields::default()
        };
        BugPatch {
            clear: true,
            ..BugPatch::default()
        }
        .apply(&mut fields);
        assert!(fields.is_empty());
    }
}
