//! Cross-boundary contracts shared by the haulsim runtime and engine:
//! activity log records, lifecycle phases, container specs, and the
//! gating-expression wire syntax.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod expression;

pub use expression::{parse_expression, ActivityRef, ContainerStateKind, ExprSpec, ExpressionError};

/// State recorded with every activity log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogState {
    Start,
    Stop,
    WaitStart,
    WaitStop,
}

impl fmt::Display for LogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::WaitStart => "WAIT_START",
            Self::WaitStop => "WAIT_STOP",
        };
        f.write_str(s)
    }
}

/// One timestamped record in an activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: f64,
    pub activity_id: String,
    pub state: LogState,
    /// Extra context, e.g. the "sub process <name>" marker written by
    /// composite activities around each child.
    pub label: Option<String>,
}

impl LogEntry {
    pub fn new(timestamp: f64, activity_id: impl Into<String>, state: LogState) -> Self {
        Self {
            timestamp,
            activity_id: activity_id.into(),
            state,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Lifecycle phase of a scheduled activity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityPhase {
    Created,
    WaitingStart,
    Running,
    Done,
}

/// Initial state of one named sub-container on a site or vessel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubContainerSpec {
    pub id: String,
    pub capacity: f64,
    #[serde(default)]
    pub level: f64,
}

impl SubContainerSpec {
    pub fn new(id: impl Into<String>, capacity: f64, level: f64) -> Self {
        Self {
            id: id.into(),
            capacity,
            level,
        }
    }
}

/// Direction of a transfer as seen from the processing vessel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    Loading,
    Unloading,
}
