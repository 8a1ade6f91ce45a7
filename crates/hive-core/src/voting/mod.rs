//! VotingCoordinator - 1 セッションずつの投票調整
//!
//! 状態は `Idle` → `Active` → `Tallying` → `Idle`。
//! `Tallying` は `finish()` の内側でだけ観測される一時状態です。
//!
//! - セッション中の `VOTE_INITIATED` は `SessionActive` で拒否し、
//!   拒否した側の correlation id へ `SYSTEM_ERROR` を返す
//! - 票は有効な vote_id かつ初投票のエージェントのみ受理
//! - quorum に達したら締切を待たずに集計する
//! - 集計結果は `VOTE_RESULT` として発起者の correlation id へ送る
//!
//! コーディネータ自体はタイマーを持ちません。締切は `VotingLoop` が
//! 自分の `select!` の中で管理します。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{
    AgentVote, BusMessage, DomainEvent, HiveError, VoteId, VoteInitiated, VoteResult, VoteSession,
};
use crate::ports::{Clock, MessageBus, publish_with_timeout};

pub mod runner;
pub mod tally;

pub use runner::VotingLoop;
pub use tally::tally;

/// Sender name on messages published by the coordinator.
const COORDINATOR_SENDER: &str = "voting-coordinator";

pub const DEFAULT_VOTE_FALLBACK_DURATION: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotingState {
    Idle,
    Active,
    Tallying,
}

/// What happened to an incoming vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteDisposition {
    /// Counted. `quorum_reached` asks the caller to tally now.
    Accepted { quorum_reached: bool },
    Duplicate,
    NoSession,
    WrongVote { active_vote_id: VoteId },
}

pub struct VotingCoordinator {
    bus: Arc<dyn MessageBus>,
    clock: Arc<dyn Clock>,
    fallback_duration: Duration,
    publish_timeout: Duration,
    state: VotingState,
    session: Option<VoteSession>,
}

impl VotingCoordinator {
    pub fn new(bus: Arc<dyn MessageBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            bus,
            clock,
            fallback_duration: DEFAULT_VOTE_FALLBACK_DURATION,
            publish_timeout: Duration::from_secs(2),
            state: VotingState::Idle,
            session: None,
        }
    }

    /// Window used when an initiation has no usable deadline.
    pub fn with_fallback_duration(mut self, duration: Duration) -> Self {
        self.fallback_duration = duration;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    pub fn state(&self) -> VotingState {
        self.state
    }

    pub fn session(&self) -> Option<&VoteSession> {
        self.session.as_ref()
    }

    pub fn active_vote_id(&self) -> Option<&VoteId> {
        self.session.as_ref().map(|s| &s.vote_id)
    }

    /// Open a session and return how long it stays open.
    ///
    /// While another session is active the initiation is rejected with
    /// `SessionActive`, and the initiator is told so over the bus.
    pub async fn initiate(&mut self, initiated: VoteInitiated) -> Result<Duration, HiveError> {
        if let Some(active) = self.session.as_ref() {
            let active_vote_id = active.vote_id.clone();
            warn!(
                vote_id = %initiated.vote_id,
                active_vote_id = %active_vote_id,
                "vote initiation rejected: session already active"
            );
            self.publish(DomainEvent::SystemError {
                correlation_id: Some(initiated.correlation_id.clone()),
                vote_id: Some(active_vote_id.clone()),
                error: format!("vote session {active_vote_id} is already in progress"),
            })
            .await;
            return Err(HiveError::SessionActive { active_vote_id });
        }

        if initiated.vote_id.is_blank() {
            return Err(HiveError::Validation("vote_id is empty".to_string()));
        }

        let now = self.clock.now();
        let window = initiated
            .deadline
            .and_then(|deadline| (deadline - now).to_std().ok())
            .filter(|remaining| !remaining.is_zero())
            .unwrap_or(self.fallback_duration);
        let voting_deadline = now
            + chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));

        info!(
            vote_id = %initiated.vote_id,
            correlation_id = %initiated.correlation_id,
            questions = initiated.questions.len(),
            quorum = ?initiated.quorum,
            window_ms = window.as_millis() as u64,
            "vote session started"
        );
        self.session = Some(VoteSession::new(initiated, voting_deadline));
        self.state = VotingState::Active;
        Ok(window)
    }

    /// Record one vote. Rejections other than invalid payloads are dispositions.
    pub fn record_vote(&mut self, vote: AgentVote) -> Result<VoteDisposition, HiveError> {
        vote.validate().map_err(HiveError::Validation)?;

        let Some(session) = self.session.as_mut() else {
            debug!(vote_id = %vote.vote_id, agent_id = %vote.agent_id, "vote without an active session dropped");
            return Ok(VoteDisposition::NoSession);
        };

        if vote.vote_id != session.vote_id {
            warn!(
                vote_id = %vote.vote_id,
                active_vote_id = %session.vote_id,
                agent_id = %vote.agent_id,
                "vote for another session dropped"
            );
            return Ok(VoteDisposition::WrongVote {
                active_vote_id: session.vote_id.clone(),
            });
        }

        if session.has_voted(&vote.agent_id) {
            warn!(vote_id = %vote.vote_id, agent_id = %vote.agent_id, "duplicate vote dropped");
            return Ok(VoteDisposition::Duplicate);
        }

        debug!(
            vote_id = %vote.vote_id,
            agent_id = %vote.agent_id,
            confidence = vote.confidence,
            "vote accepted"
        );
        session.votes.insert(vote.agent_id.clone(), vote);
        Ok(VoteDisposition::Accepted {
            quorum_reached: session.quorum_reached(),
        })
    }

    /// Decode and open a session from a `VOTE_INITIATED` message.
    /// Returns the window when a session was opened.
    pub async fn handle_initiated(&mut self, message: &BusMessage) -> Option<Duration> {
        let mut initiated: VoteInitiated = match message.decode_payload() {
            Ok(initiated) => initiated,
            Err(err) => {
                warn!(error = %err, "malformed vote initiation dropped");
                return None;
            }
        };
        if initiated.correlation_id.trim().is_empty() {
            if let Some(correlation_id) = message.correlation_id.as_ref() {
                initiated.correlation_id = correlation_id.clone();
            }
        }

        match self.initiate(initiated).await {
            Ok(window) => Some(window),
            Err(HiveError::SessionActive { .. }) => None,
            Err(err) => {
                warn!(error = %err, "vote initiation dropped");
                None
            }
        }
    }

    /// Decode and record an `AGENT_VOTE` message.
    /// Returns true when the vote completed the quorum.
    pub fn handle_vote(&mut self, message: &BusMessage) -> bool {
        let vote: AgentVote = match message.decode_payload() {
            Ok(vote) => vote,
            Err(err) => {
                warn!(error = %err, "malformed vote dropped");
                return false;
            }
        };

        match self.record_vote(vote) {
            Ok(VoteDisposition::Accepted { quorum_reached }) => quorum_reached,
            Ok(_) => false,
            Err(err) => {
                warn!(error = %err, "invalid vote dropped");
                false
            }
        }
    }

    /// Tally the active session and publish `VOTE_RESULT`.
    ///
    /// The coordinator is `Idle` afterwards whether or not publishing worked.
    pub async fn finish(&mut self) -> Option<VoteResult> {
        let session = self.session.take()?;
        self.state = VotingState::Tallying;

        let result = tally(&session);
        info!(
            vote_id = %result.vote_id,
            outcome = %result.outcome,
            total_votes = result.total_votes,
            "vote session tallied"
        );
        self.publish(DomainEvent::VoteResult(result.clone())).await;

        self.state = VotingState::Idle;
        Some(result)
    }

    /// Discard the active session without publishing anything.
    pub fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            info!(
                vote_id = %session.vote_id,
                votes = session.votes.len(),
                "vote session discarded"
            );
        }
        self.state = VotingState::Idle;
    }

    async fn publish(&self, event: DomainEvent) {
        let event_type = event.event_type();
        let message = event.into_message().from_sender(COORDINATOR_SENDER);
        if let Err(err) = publish_with_timeout(self.bus.as_ref(), message, self.publish_timeout).await {
            warn!(event_type, error = %err, "publish from voting coordinator failed");
        }
    }
}
