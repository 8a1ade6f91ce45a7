//! RoutedDispatch - デフォルトの DispatchStrategy
//!
//! 明示指定 → capability 検索 → フォールバック表 の順に送信先を解決します。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{AgentId, Task};
use crate::ports::{CapabilityLookup, DispatchStrategy, Recipient, RecipientSource};

/// Static action → agent table consulted when no capability matches.
pub type FallbackRoutes = BTreeMap<String, AgentId>;

pub struct RoutedDispatch {
    lookup: Arc<dyn CapabilityLookup>,
    fallback: FallbackRoutes,
}

impl RoutedDispatch {
    pub fn new(lookup: Arc<dyn CapabilityLookup>) -> Self {
        Self {
            lookup,
            fallback: FallbackRoutes::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackRoutes) -> Self {
        self.fallback = fallback;
        self
    }
}

#[async_trait]
impl DispatchStrategy for RoutedDispatch {
    async fn resolve_recipient(&self, task: &Task) -> Option<Recipient> {
        if let Some(agent_id) = task.target_agent.as_ref().filter(|a| !a.is_blank()) {
            return Some(Recipient {
                agent_id: agent_id.clone(),
                source: RecipientSource::Explicit,
            });
        }

        if let Some(agent_id) = self.lookup.find_first_agent_by_capability(&task.action).await {
            return Some(Recipient {
                agent_id,
                source: RecipientSource::Capability,
            });
        }

        let routed = self.fallback.get(&task.action).cloned();
        if routed.is_none() {
            debug!(task_id = %task.task_id, action = %task.action, "no route for action");
        }
        routed.map(|agent_id| Recipient {
            agent_id,
            source: RecipientSource::Fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskId};
    use chrono::Utc;
    use rstest::rstest;

    struct OneCapability;

    #[async_trait]
    impl CapabilityLookup for OneCapability {
        async fn find_first_agent_by_capability(&self, capability: &str) -> Option<AgentId> {
            (capability == "code_review").then(|| AgentId::new("AgentReviewer"))
        }
    }

    fn strategy() -> RoutedDispatch {
        let mut fallback = FallbackRoutes::new();
        fallback.insert("deploy".into(), AgentId::new("AgentOps"));
        RoutedDispatch::new(Arc::new(OneCapability)).with_fallback(fallback)
    }

    #[rstest]
    #[case::explicit(NewTask::new("code_review").targeting("AgentX"), Some(("AgentX", RecipientSource::Explicit)))]
    #[case::capability(NewTask::new("code_review"), Some(("AgentReviewer", RecipientSource::Capability)))]
    #[case::fallback(NewTask::new("deploy"), Some(("AgentOps", RecipientSource::Fallback)))]
    #[case::unroutable(NewTask::new("paint"), None)]
    #[tokio::test]
    async fn resolves_in_order(
        #[case] draft: NewTask,
        #[case] expected: Option<(&str, RecipientSource)>,
    ) {
        let task = Task::from_new(draft, TaskId::new("T1"), Utc::now());
        let got = strategy().resolve_recipient(&task).await;
        let got = got.map(|r| (r.agent_id.as_str().to_string(), r.source));
        assert_eq!(got, expected.map(|(a, s)| (a.to_string(), s)));
    }
}
