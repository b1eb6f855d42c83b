//! Wake task records
//!
//! A task lives in the remote queue as a JSON object:
//! ```text
//! { "mac": "AA:BB:CC:DD:EE:FF", "delay": 1000 | "1000", "status": "pending" }
//! ```
//! Fields are extracted individually so a single malformed field can be
//! reported without rejecting the whole record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::mac::{MacAddress, MacError};

/// Errors produced while reading a task record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Task entry is not an object")]
    NotAnObject,

    #[error("Task has no status field")]
    MissingStatus,

    #[error("Task status is not a string: {0}")]
    InvalidStatus(Value),

    #[error("Task has no mac field")]
    MissingMac,

    #[error("Task mac is not a string: {0}")]
    MacNotString(Value),

    #[error("Task mac is malformed: {0}")]
    InvalidMac(#[from] MacError),

    #[error("Task delay is not numeric: {0}")]
    InvalidDelay(Value),
}

/// Processing status of a queued task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    /// Waiting to be dispatched
    Pending,
    /// Wake packet sent and status committed
    Done,
    /// Pending task had no usable hardware address
    ErrorMissingMac,
    /// Any status this device does not act on
    Other(String),
}

impl TaskStatus {
    pub const PENDING: &'static str = "pending";
    pub const DONE: &'static str = "done";
    pub const ERROR_MISSING_MAC: &'static str = "error_missing_mac";

    /// String form as stored in the queue
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => Self::PENDING,
            TaskStatus::Done => Self::DONE,
            TaskStatus::ErrorMissingMac => Self::ERROR_MISSING_MAC,
            TaskStatus::Other(s) => s,
        }
    }

    /// Whether the status is eligible for pruning
    pub fn is_prunable(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }

    /// JSON value to write back to the store
    pub fn to_value(&self) -> Value {
        Value::String(self.as_str().to_string())
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        match s {
            Self::PENDING => TaskStatus::Pending,
            Self::DONE => TaskStatus::Done,
            Self::ERROR_MISSING_MAC => TaskStatus::ErrorMissingMac,
            other => TaskStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        TaskStatus::from(s.as_str())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A wake request as enqueued by an external producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeTask {
    pub mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    pub status: TaskStatus,
}

impl WakeTask {
    /// Create a pending task
    pub fn pending(mac: impl Into<String>, delay_ms: u64) -> Self {
        Self {
            mac: mac.into(),
            delay: (delay_ms > 0).then_some(delay_ms),
            status: TaskStatus::Pending,
        }
    }

    /// JSON object form for writing into the queue
    pub fn to_object(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// View a raw queue entry as an object
pub fn as_object(entry: &Value) -> Result<&Map<String, Value>, TaskError> {
    entry.as_object().ok_or(TaskError::NotAnObject)
}

/// Extract the `status` field
pub fn extract_status(task: &Map<String, Value>) -> Result<TaskStatus, TaskError> {
    match task.get("status") {
        None | Some(Value::Null) => Err(TaskError::MissingStatus),
        Some(Value::String(s)) => Ok(TaskStatus::from(s.as_str())),
        Some(other) => Err(TaskError::InvalidStatus(other.clone())),
    }
}

/// Extract and validate the `mac` field
pub fn extract_mac(task: &Map<String, Value>) -> Result<MacAddress, TaskError> {
    match task.get("mac") {
        None | Some(Value::Null) => Err(TaskError::MissingMac),
        Some(Value::String(s)) => Ok(MacAddress::parse(s)?),
        Some(other) => Err(TaskError::MacNotString(other.clone())),
    }
}

/// Extract the `delay` field in milliseconds
///
/// Absent means 0. Integers and numeric strings are accepted; negative
/// values clamp to 0 and fractional values are truncated.
pub fn extract_delay(task: &Map<String, Value>) -> Result<u64, TaskError> {
    let raw = match task.get("delay") {
        None | Some(Value::Null) => return Ok(0),
        Some(v) => v,
    };

    let parsed = match raw {
        Value::Number(n) => n.as_i64().map(|v| v as f64).or_else(|| n.as_f64()),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(ms) if ms.is_finite() => Ok(if ms <= 0.0 { 0 } else { ms as u64 }),
        _ => Err(TaskError::InvalidDelay(raw.clone())),
    }
}
