//! Vote - 投票セッションとエージェントの票

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, VoteId};

/// Question used when an initiation does not name any.
pub const DEFAULT_QUESTION: &str = "decision";

/// Outcome string when no agent voted at all.
pub const OUTCOME_NO_VOTES: &str = "No votes received";

/// Outcome string for a tied (or empty) question.
pub const OUTCOME_TIE: &str = "Tie or No Votes";

/// Payload of a `VOTE_INITIATED` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteInitiated {
    pub vote_id: VoteId,

    /// Results are addressed back to this id.
    /// Falls back to the message's correlation id when empty.
    #[serde(default)]
    pub correlation_id: String,

    #[serde(default)]
    pub questions: Vec<String>,

    /// Explicit end of the voting window.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,

    /// Tally early once this many agents have voted.
    #[serde(default)]
    pub quorum: Option<usize>,
}

/// Payload of an `AGENT_VOTE` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentVote {
    pub vote_id: VoteId,
    pub agent_id: AgentId,

    /// question -> choice
    pub choices: BTreeMap<String, String>,

    #[serde(default = "default_confidence")]
    pub confidence: f64,

    #[serde(default)]
    pub rationale: Option<String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl AgentVote {
    pub fn single(
        vote_id: impl Into<VoteId>,
        agent_id: impl Into<AgentId>,
        choice: impl Into<String>,
    ) -> Self {
        let mut choices = BTreeMap::new();
        choices.insert(DEFAULT_QUESTION.to_string(), choice.into());
        Self {
            vote_id: vote_id.into(),
            agent_id: agent_id.into(),
            choices,
            confidence: default_confidence(),
            rationale: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.agent_id.is_blank() {
            return Err("agent_id is empty".to_string());
        }
        if self.choices.is_empty() {
            return Err("vote carries no choices".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence) || self.confidence.is_nan() {
            return Err(format!("confidence {} outside 0..=1", self.confidence));
        }
        Ok(())
    }
}

/// The single active session of a coordinator.
#[derive(Debug, Clone)]
pub struct VoteSession {
    pub vote_id: VoteId,
    pub correlation_id: String,
    pub questions: Vec<String>,
    pub voting_deadline: DateTime<Utc>,
    pub quorum: Option<usize>,

    /// Accepted votes, one per agent.
    pub votes: BTreeMap<AgentId, AgentVote>,
}

impl VoteSession {
    pub fn new(initiated: VoteInitiated, voting_deadline: DateTime<Utc>) -> Self {
        Self {
            vote_id: initiated.vote_id,
            correlation_id: initiated.correlation_id,
            questions: initiated.questions,
            voting_deadline,
            quorum: initiated.quorum,
            votes: BTreeMap::new(),
        }
    }

    pub fn has_voted(&self, agent_id: &AgentId) -> bool {
        self.votes.contains_key(agent_id)
    }

    pub fn quorum_reached(&self) -> bool {
        self.quorum
            .is_some_and(|quorum| quorum > 0 && self.votes.len() >= quorum)
    }
}

/// Per-question counts and the derived outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionTally {
    pub counts: BTreeMap<String, usize>,
    pub outcome: String,
}

/// Payload of a `VOTE_RESULT` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteResult {
    pub vote_id: VoteId,
    pub correlation_id: String,
    pub outcome: String,
    pub questions: BTreeMap<String, QuestionTally>,
    pub participating_agents: Vec<AgentId>,
    pub total_votes: usize,
}
