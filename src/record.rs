// Task record types

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Row identity, assigned by the store on insert
pub type TaskId = i64;

/// Task priority. The discriminant is the persisted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Priority {
    #[default]
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Priority {
    pub fn value(self) -> i64 {
        self as i64
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl TryFrom<i64> for Priority {
    type Error = StoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::Low),
            other => Err(StoreError::InvalidPriority(other.to_string())),
        }
    }
}

impl From<Priority> for i64 {
    fn from(p: Priority) -> Self {
        p.value()
    }
}

impl FromStr for Priority {
    type Err = StoreError;

    /// Accepts `1`/`2`/`3` or `high`/`medium`/`low` (case-insensitive, `h`/`m`/`l` too)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Priority::try_from(n);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "high" | "h" => Ok(Priority::High),
            "medium" | "m" => Ok(Priority::Medium),
            "low" | "l" => Ok(Priority::Low),
            _ => Err(StoreError::InvalidPriority(trimmed.to_string())),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Content of a task that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub description: String,
    pub priority: Priority,
}

impl TaskDraft {
    pub fn new(description: impl Into<String>, priority: Priority) -> Self {
        Self {
            description: description.into(),
            priority,
        }
    }
}

/// One stored task. Values handed out by the store are copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub description: String,
    pub priority: Priority,
    /// Milliseconds since epoch of the last write to this row
    pub updated_at: i64,
}

impl TaskRecord {
    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.updated_at)
    }
}
