//! Response model: status reports sent back by agents.
//!
//! Senders are heterogeneous and report free-form status strings. They are
//! normalized into a fixed set; anything unrecognized becomes `Unknown` and is
//! never applied to the task.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::HiveError;
use super::events::BusMessage;
use super::ids::TaskId;
use super::state::TaskStatus;

/// Normalized status of an agent's response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    Completed,
    Failed,
    Error,
    /// Carries the raw status string for logging.
    Unknown(String),
}

impl ResponseStatus {
    /// Total mapping from a sender-reported status string.
    pub fn normalize(raw: &str) -> Self {
        let key = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "completed" | "complete" | "success" | "succeeded" | "done" | "ok" | "finished" => {
                ResponseStatus::Completed
            }
            "failed" | "failure" | "fail" | "rejected" | "aborted" => ResponseStatus::Failed,
            "error" | "errored" | "exception" | "crashed" | "internal_error" => {
                ResponseStatus::Error
            }
            _ => ResponseStatus::Unknown(raw.to_string()),
        }
    }

    /// Terminal task status this response maps onto, if any.
    pub fn task_status(&self) -> Option<TaskStatus> {
        match self {
            ResponseStatus::Completed => Some(TaskStatus::Completed),
            ResponseStatus::Failed => Some(TaskStatus::Failed),
            ResponseStatus::Error => Some(TaskStatus::Error),
            ResponseStatus::Unknown(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ResponseStatus::Failed | ResponseStatus::Error)
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Completed => f.write_str("COMPLETED"),
            ResponseStatus::Failed => f.write_str("FAILED"),
            ResponseStatus::Error => f.write_str("ERROR"),
            ResponseStatus::Unknown(raw) => write!(f, "UNKNOWN({raw})"),
        }
    }
}

/// A task response as received from the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub sender: String,
    pub task_id: TaskId,
    pub status: String,
    #[serde(default)]
    pub payload: Value,
}

impl TaskResponse {
    /// Decode a `TASK_RESPONSE` message. `sender` / `task_id` fall back to
    /// the message headers when the payload omits them.
    pub fn from_message(message: &BusMessage) -> Result<Self, HiveError> {
        let mut payload = message.payload.clone();
        if let Some(fields) = payload.as_object_mut() {
            if let Some(sender) = &message.sender {
                fields
                    .entry("sender")
                    .or_insert_with(|| Value::String(sender.clone()));
            }
            if let Some(task_id) = &message.task_id {
                fields
                    .entry("task_id")
                    .or_insert_with(|| Value::String(task_id.to_string()));
            }
        }
        serde_json::from_value(payload).map_err(|e| {
            HiveError::Validation(format!("malformed {} payload: {e}", message.message_type))
        })
    }

    pub fn normalized_status(&self) -> ResponseStatus {
        ResponseStatus::normalize(&self.status)
    }

    /// Short human-readable summary pulled from the payload.
    ///
    /// Looks at `summary`, `result`, then `message`; falls back to the JSON text.
    pub fn summary(&self) -> Option<String> {
        if self.payload.is_null() {
            return None;
        }
        for key in ["summary", "result", "message"] {
            if let Some(text) = self.payload.get(key).and_then(Value::as_str) {
                return Some(text.to_string());
            }
        }
        if let Some(text) = self.payload.as_str() {
            return Some(text.to_string());
        }
        Some(self.payload.to_string())
    }

    /// Error text pulled from the payload (`error`, `details`), else the summary.
    pub fn error_details(&self) -> Option<String> {
        for key in ["error", "details"] {
            if let Some(text) = self.payload.get(key).and_then(Value::as_str) {
                return Some(text.to_string());
            }
        }
        self.summary()
    }
}
