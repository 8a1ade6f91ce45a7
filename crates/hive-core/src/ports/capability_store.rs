//! CapabilityStore port - capability の永続化
//!
//! 読み出しは検証前の生 JSON を返します。スキーマ検証と不正エントリのスキップは
//! CapabilityRegistry の責務です（1 件壊れていても起動は止めない）。

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{AgentId, CapabilityId, CapabilityRecord, HiveError};

/// `{agent_id: {capability_id: record}}`, records not yet validated.
pub type RawCapabilities = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

#[async_trait]
pub trait CapabilityStore: Send + Sync {
    async fn get_all_capabilities(&self) -> Result<RawCapabilities, HiveError>;

    /// Upsert one record under `agent_id`.
    async fn register_capability(
        &self,
        agent_id: &AgentId,
        record: &CapabilityRecord,
    ) -> Result<(), HiveError>;

    /// Remove one record. Returns whether the store held it.
    async fn unregister_capability(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
    ) -> Result<bool, HiveError>;
}
