//! Events - バス上のメッセージとドメインイベント
//!
//! `BusMessage` がバスを流れる唯一の形式です。
//! `DomainEvent` はコアが発行するイベントで、`into_message()` で `BusMessage` に変換します。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::errors::HiveError;
use super::ids::{AgentId, CapabilityId, TaskId, VoteId};
use super::vote::VoteResult;

/// Event types consumed and produced by the core.
pub mod event_types {
    pub const VOTE_INITIATED: &str = "VOTE_INITIATED";
    pub const AGENT_VOTE: &str = "AGENT_VOTE";
    pub const TASK_RESPONSE: &str = "TASK_RESPONSE";
    pub const CAPABILITY_REGISTERED: &str = "CAPABILITY_REGISTERED";
    pub const CAPABILITY_UNREGISTERED: &str = "CAPABILITY_UNREGISTERED";
    pub const VOTE_RESULT: &str = "VOTE_RESULT";
    pub const SYSTEM_ERROR: &str = "SYSTEM_ERROR";
}

/// A message on the bus.
///
/// Outbound task commands use the task's action as `message_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub message_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,

    #[serde(default)]
    pub payload: Value,
}

impl BusMessage {
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            sender: None,
            recipient: None,
            correlation_id: None,
            task_id: None,
            payload,
        }
    }

    pub fn from_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Decode the payload; malformed payloads become `Validation` errors.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, HiveError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            HiveError::Validation(format!("malformed {} payload: {e}", self.message_type))
        })
    }
}

/// DomainEvent はコアで発生したイベント
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    CapabilityRegistered {
        agent_id: AgentId,
        capability_id: CapabilityId,
        capability_name: String,
    },
    CapabilityUnregistered {
        agent_id: AgentId,
        capability_id: CapabilityId,
    },
    VoteResult(VoteResult),
    SystemError {
        correlation_id: Option<String>,
        vote_id: Option<VoteId>,
        error: String,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::CapabilityRegistered { .. } => event_types::CAPABILITY_REGISTERED,
            DomainEvent::CapabilityUnregistered { .. } => event_types::CAPABILITY_UNREGISTERED,
            DomainEvent::VoteResult(_) => event_types::VOTE_RESULT,
            DomainEvent::SystemError { .. } => event_types::SYSTEM_ERROR,
        }
    }

    pub fn into_message(self) -> BusMessage {
        let event_type = self.event_type();
        match self {
            DomainEvent::CapabilityRegistered {
                agent_id,
                capability_id,
                capability_name,
            } => BusMessage::new(
                event_type,
                json!({
                    "agent_id": agent_id,
                    "capability_id": capability_id,
                    "capability_name": capability_name,
                }),
            ),
            DomainEvent::CapabilityUnregistered {
                agent_id,
                capability_id,
            } => BusMessage::new(
                event_type,
                json!({
                    "agent_id": agent_id,
                    "capability_id": capability_id,
                }),
            ),
            DomainEvent::VoteResult(result) => {
                let correlation_id = result.correlation_id.clone();
                let payload = serde_json::to_value(&result).unwrap_or(Value::Null);
                BusMessage::new(event_type, payload).correlated(correlation_id)
            }
            DomainEvent::SystemError {
                correlation_id,
                vote_id,
                error,
            } => {
                let message =
                    BusMessage::new(event_type, json!({ "error": error, "vote_id": vote_id }));
                match correlation_id {
                    Some(id) => message.correlated(id),
                    None => message,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_payload_reports_validation_error() {
        let msg = BusMessage::new(event_types::AGENT_VOTE, json!({"nope": 1}));
        let err = msg
            .decode_payload::<crate::domain::vote::AgentVote>()
            .unwrap_err();
        assert!(matches!(err, HiveError::Validation(_)));
    }

    #[test]
    fn system_error_is_addressed_to_correlation_id() {
        let msg = DomainEvent::SystemError {
            correlation_id: Some("req-9".into()),
            vote_id: Some(VoteId::new("v1")),
            error: "session already active".into(),
        }
        .into_message();

        assert_eq!(msg.message_type, event_types::SYSTEM_ERROR);
        assert_eq!(msg.correlation_id.as_deref(), Some("req-9"));
        assert_eq!(msg.payload["vote_id"], "v1");
    }

    #[test]
    fn optional_routing_fields_are_omitted() {
        let msg = BusMessage::new("build", json!({}));
        let v = serde_json::to_value(&msg).unwrap();
        assert!(v.get("recipient").is_none());
        assert!(v.get("task_id").is_none());
    }
}
