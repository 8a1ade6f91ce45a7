use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::VotingCoordinator;
use crate::domain::{BusMessage, event_types};
use crate::ports::{BusError, MessageBus, Subscription};

/// Running voting loop.
/// - コーディネータはループのタスクが所有する（ロック不要）
/// - 締切はループ内の 1 本のタイマーで、セッションが終われば消える
/// - `stop()` で停止を要求し、ループの終了と購読解除まで待つ
pub struct VotingLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    bus: Arc<dyn MessageBus>,
    subscription_ids: [u64; 2],
}

impl VotingLoop {
    /// Subscribe to `VOTE_INITIATED` and `AGENT_VOTE` and start handling them.
    pub async fn spawn(coordinator: VotingCoordinator) -> Result<Self, BusError> {
        let bus = coordinator.bus().clone();
        let initiations = bus.subscribe(event_types::VOTE_INITIATED).await?;
        let votes = match bus.subscribe(event_types::AGENT_VOTE).await {
            Ok(votes) => votes,
            Err(err) => {
                let _ = bus.unsubscribe(initiations.id()).await;
                return Err(err);
            }
        };
        let subscription_ids = [initiations.id(), votes.id()];
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(voting_loop(coordinator, initiations, votes, shutdown_rx));
        info!("voting loop started");

        Ok(Self {
            shutdown_tx,
            join,
            bus,
            subscription_ids,
        })
    }

    /// Stop the loop; an open session is discarded without a result.
    pub async fn stop(self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.join.await {
            warn!(error = %err, "voting loop ended abnormally");
        }
        for id in self.subscription_ids {
            if let Err(err) = self.bus.unsubscribe(id).await {
                debug!(subscription_id = id, error = %err, "unsubscribe after stop failed");
            }
        }
        info!("voting loop stopped");
    }
}

async fn voting_loop(
    mut coordinator: VotingCoordinator,
    initiations: Subscription,
    votes: Subscription,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut initiations = Some(initiations);
    let mut votes = Some(votes);
    let mut deadline: Option<Instant> = None;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            // 初期化を票より先に処理する
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            message = next_message(&mut initiations) => match message {
                Some(message) => {
                    if let Some(window) = coordinator.handle_initiated(&message).await {
                        deadline = Some(Instant::now() + window);
                    }
                }
                None => {
                    warn!("vote initiation subscription closed");
                    initiations = None;
                }
            },
            message = next_message(&mut votes) => match message {
                Some(message) => {
                    if coordinator.handle_vote(&message) {
                        coordinator.finish().await;
                        deadline = None;
                    }
                }
                None => {
                    warn!("agent vote subscription closed");
                    votes = None;
                }
            },
            _ = wait_until(deadline) => {
                coordinator.finish().await;
                deadline = None;
            }
        }
    }

    coordinator.reset();
}

async fn next_message(subscription: &mut Option<Subscription>) -> Option<BusMessage> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentVote, VoteId, VoteInitiated};
    use crate::impls::InMemoryBus;
    use crate::ports::SystemClock;
    use std::time::Duration;

    async fn start(bus: &Arc<InMemoryBus>) -> VotingLoop {
        let coordinator = VotingCoordinator::new(bus.clone(), Arc::new(SystemClock))
            .with_fallback_duration(Duration::from_secs(5));
        VotingLoop::spawn(coordinator).await.unwrap()
    }

    fn initiation(vote_id: &str, correlation_id: &str, quorum: Option<usize>) -> BusMessage {
        let payload = VoteInitiated {
            vote_id: VoteId::new(vote_id),
            correlation_id: correlation_id.into(),
            questions: vec![],
            deadline: None,
            quorum,
        };
        BusMessage::new(
            event_types::VOTE_INITIATED,
            serde_json::to_value(payload).unwrap(),
        )
    }

    fn vote(vote_id: &str, agent: &str, choice: &str) -> BusMessage {
        BusMessage::new(
            event_types::AGENT_VOTE,
            serde_json::to_value(AgentVote::single(vote_id, agent, choice)).unwrap(),
        )
        .from_sender(agent)
    }

    #[tokio::test(start_paused = true)]
    async fn session_is_tallied_at_the_deadline() {
        let bus = Arc::new(InMemoryBus::new());
        let running = start(&bus).await;
        let started = Instant::now();

        bus.publish(initiation("v1", "req-1", None)).await.unwrap();
        for (agent, choice) in [("AgentA", "A"), ("AgentB", "A"), ("AgentC", "B")] {
            bus.publish(vote("v1", agent, choice)).await.unwrap();
        }

        let results = bus
            .wait_for(event_types::VOTE_RESULT, 1, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(results[0].correlation_id.as_deref(), Some("req-1"));
        assert_eq!(results[0].payload["outcome"], "Decision: A");
        assert_eq!(results[0].payload["total_votes"], 3);

        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn quorum_ends_the_session_early() {
        let bus = Arc::new(InMemoryBus::new());
        let running = start(&bus).await;
        let started = Instant::now();

        bus.publish(initiation("v1", "req-1", Some(2))).await.unwrap();
        bus.publish(vote("v1", "AgentA", "B")).await.unwrap();
        bus.publish(vote("v1", "AgentB", "B")).await.unwrap();

        let results = bus
            .wait_for(event_types::VOTE_RESULT, 1, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(results[0].payload["outcome"], "Decision: B");

        running.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_initiation_gets_a_system_error() {
        let bus = Arc::new(InMemoryBus::new());
        let running = start(&bus).await;

        bus.publish(initiation("v1", "req-1", None)).await.unwrap();
        bus.publish(initiation("v2", "req-2", None)).await.unwrap();

        let errors = bus
            .wait_for(event_types::SYSTEM_ERROR, 1, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(errors[0].correlation_id.as_deref(), Some("req-2"));
        assert_eq!(errors[0].payload["vote_id"], "v1");

        // v1 は通常どおり締切で集計される
        let results = bus
            .wait_for(event_types::VOTE_RESULT, 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(results[0].payload["vote_id"], "v1");
        assert_eq!(results[0].payload["outcome"], "No votes received");

        running.stop().await;
    }

    #[tokio::test]
    async fn stop_unsubscribes_and_discards_the_open_session() {
        let bus = Arc::new(InMemoryBus::new());
        let running = start(&bus).await;
        bus.publish(initiation("v1", "req-1", None)).await.unwrap();

        running.stop().await;

        assert_eq!(bus.subscriber_count(event_types::VOTE_INITIATED).await, 0);
        assert_eq!(bus.subscriber_count(event_types::AGENT_VOTE).await, 0);
        assert!(bus.published_of(event_types::VOTE_RESULT).await.is_empty());
    }
}
