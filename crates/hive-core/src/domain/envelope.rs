//! DispatchEnvelope - エージェントへ送るタスクコマンド
//!
//! `message_type = action`, `payload = {action, params}`, `task_id` の形でバスへ流します。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::events::BusMessage;
use super::ids::{AgentId, TaskId};
use super::task::Task;

/// TaskId + action + params の“運搬用”データ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    task_id: TaskId,
    action: String,
    params: Map<String, Value>,
}

impl DispatchEnvelope {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            action: task.action.clone(),
            params: task.params.clone(),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Address the command to `recipient`.
    pub fn into_message(self, recipient: &AgentId) -> BusMessage {
        let payload = serde_json::json!({
            "action": self.action,
            "params": self.params,
        });
        BusMessage::new(self.action, payload)
            .to(recipient.as_str())
            .for_task(self.task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::NewTask;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn message_uses_action_as_type() {
        let task = Task::from_new(
            NewTask::new("run_tests").with_param("suite", json!("unit")),
            TaskId::new("T1"),
            Utc::now(),
        );
        let msg = DispatchEnvelope::from_task(&task).into_message(&AgentId::new("TestAgent"));

        assert_eq!(msg.message_type, "run_tests");
        assert_eq!(msg.recipient.as_deref(), Some("TestAgent"));
        assert_eq!(msg.task_id, Some(TaskId::new("T1")));
        assert_eq!(msg.payload["action"], "run_tests");
        assert_eq!(msg.payload["params"]["suite"], "unit");
    }
}
