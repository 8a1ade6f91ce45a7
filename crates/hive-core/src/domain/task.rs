//! Task record and its mutation shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::{AgentId, TaskId};
use super::state::TaskStatus;

/// Priority given to tasks that do not specify one (lower = more urgent).
pub const DEFAULT_PRIORITY: i64 = 10;

/// A task as stored on the board.
///
/// The record carries every field the producer supplied plus the lifecycle
/// timestamps the board adds on each transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub action: String,

    #[serde(default)]
    pub params: Map<String, Value>,

    pub status: TaskStatus,

    #[serde(default = "default_priority")]
    pub priority: i64,

    #[serde(default)]
    pub depends_on: Vec<TaskId>,

    /// Number of dispatch attempts made for this task.
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<AgentId>,

    /// Explicit recipient; bypasses capability lookup when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<AgentId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,

    /// Set on tasks generated to repair a failed task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_of: Option<TaskId>,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

impl Task {
    /// Materialize a producer's draft into a pending task.
    pub fn from_new(draft: NewTask, task_id: TaskId, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            action: draft.action,
            params: draft.params,
            status: TaskStatus::Pending,
            priority: draft.priority.unwrap_or(DEFAULT_PRIORITY),
            depends_on: draft.depends_on,
            retry_count: 0,
            assigned_agent: None,
            target_agent: draft.target_agent,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            result_summary: None,
            error_details: None,
            repair_of: draft.repair_of,
        }
    }

    /// Merge a patch into this record. `params` are merged key by key.
    pub fn apply(&mut self, patch: &TaskPatch, now: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(agent) = &patch.assigned_agent {
            self.assigned_agent = Some(agent.clone());
        }
        if let Some(params) = &patch.params {
            for (key, value) in params {
                self.params.insert(key.clone(), value.clone());
            }
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(summary) = &patch.result_summary {
            self.result_summary = Some(summary.clone());
        }
        if let Some(details) = &patch.error_details {
            self.error_details = Some(details.clone());
        }
        if let Some(started_at) = patch.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        self.updated_at = now;
    }
}

/// A task as submitted by a producer, before the board accepts it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTask {
    /// Caller-supplied id; generated when absent.
    #[serde(default)]
    pub task_id: Option<TaskId>,

    pub action: String,

    #[serde(default)]
    pub params: Map<String, Value>,

    #[serde(default)]
    pub priority: Option<i64>,

    #[serde(default)]
    pub depends_on: Vec<TaskId>,

    #[serde(default)]
    pub target_agent: Option<AgentId>,

    #[serde(default)]
    pub repair_of: Option<TaskId>,
}

impl NewTask {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn depends_on(mut self, task_id: impl Into<TaskId>) -> Self {
        self.depends_on.push(task_id.into());
        self
    }

    pub fn targeting(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.target_agent = Some(agent_id.into());
        self
    }

    pub fn repairing(mut self, task_id: TaskId) -> Self {
        self.repair_of = Some(task_id);
        self
    }
}

/// Partial update merged into a stored task.
///
/// Lifecycle timestamps are set by the board, not by callers of
/// `update_working`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assigned_agent: Option<AgentId>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub retry_count: Option<u32>,
    #[serde(default)]
    pub result_summary: Option<String>,
    #[serde(default)]
    pub error_details: Option<String>,
    #[serde(skip)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_result(mut self, summary: impl Into<String>) -> Self {
        self.result_summary = Some(summary.into());
        self
    }

    pub fn with_error(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }
}
