//! DispatchStrategy port - タスクから送信先エージェントを解決
//!
//! # 解決順
//! 1. タスクの `target_agent`（明示指定）
//! 2. capability 検索（`CapabilityLookup`）
//! 3. action 名をキーにしたフォールバック表
//!
//! デフォルト実装は `impls::RoutedDispatch`。

use std::fmt;

use async_trait::async_trait;

use crate::domain::{AgentId, Task};

/// Where a recipient came from (for logs and reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientSource {
    Explicit,
    Capability,
    Fallback,
}

impl fmt::Display for RecipientSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientSource::Explicit => f.write_str("explicit"),
            RecipientSource::Capability => f.write_str("capability"),
            RecipientSource::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub agent_id: AgentId,
    pub source: RecipientSource,
}

/// Read side of the capability registry, as seen by the dispatcher.
#[async_trait]
pub trait CapabilityLookup: Send + Sync {
    async fn find_first_agent_by_capability(&self, capability: &str) -> Option<AgentId>;
}

/// DispatchStrategy はタスクを受け取るエージェントを解決
///
/// `None` は「送信先なし」で、Dispatcher はタスクを DISPATCH_FAILED にします。
#[async_trait]
pub trait DispatchStrategy: Send + Sync {
    async fn resolve_recipient(&self, task: &Task) -> Option<Recipient>;
}
