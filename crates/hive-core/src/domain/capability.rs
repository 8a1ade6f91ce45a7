//! Capability - エージェントが公開するスキル
//!
//! - `CapabilityRecord`: 永続化される部分（store に書く）
//! - `Capability`: キャッシュ上の表現。`is_active` / `last_verified` はキャッシュ専用で、
//!   再起動すると失われる（既知の制約）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, CapabilityId};

/// Durable part of a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub agent_id: AgentId,
    pub capability_id: CapabilityId,
    pub capability_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl CapabilityRecord {
    /// Schema check applied to entries loaded from the store.
    ///
    /// `agent_key` / `capability_key` are the map keys the entry was found under.
    pub fn validate(&self, agent_key: &str, capability_key: &str) -> Result<(), String> {
        if self.agent_id.as_str() != agent_key {
            return Err(format!(
                "agent_id {} does not match key {agent_key}",
                self.agent_id
            ));
        }
        if self.capability_id.as_str() != capability_key {
            return Err(format!(
                "capability_id {} does not match key {capability_key}",
                self.capability_id
            ));
        }
        if self.capability_name.trim().is_empty() {
            return Err("capability_name is empty".to_string());
        }
        if self.last_updated < self.registered_at {
            return Err("last_updated precedes registered_at".to_string());
        }
        Ok(())
    }
}

/// Cached capability: the durable record plus in-memory status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(flatten)]
    pub record: CapabilityRecord,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<DateTime<Utc>>,
}

impl Capability {
    /// Fresh cache entry for a record just loaded or registered.
    pub fn from_record(record: CapabilityRecord) -> Self {
        Self {
            record,
            is_active: true,
            last_verified: None,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.record.agent_id
    }

    pub fn capability_id(&self) -> &CapabilityId {
        &self.record.capability_id
    }

    pub fn name(&self) -> &str {
        &self.record.capability_name
    }
}

/// Self-registration request sent by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRegistration {
    pub agent_id: AgentId,
    pub capability_id: CapabilityId,
    pub capability_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CapabilityRegistration {
    pub fn new(
        agent_id: impl Into<AgentId>,
        capability_id: impl Into<CapabilityId>,
        capability_name: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            capability_id: capability_id.into(),
            capability_name: capability_name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
