//! Tally - 票の集計（純粋関数）
//!
//! - 質問ごとに choice の出現数を数え、単独最多なら `Decision: <choice>`
//! - 同数・票なしの質問は `Tie or No Votes`
//! - 全体の outcome は主質問（最初に宣言された質問、宣言がなければ名前順で最初）の結果。
//!   1 票もなければ `No votes received`
//! - 質問が宣言されているセッションでは、宣言外の質問への票は数えない

use std::collections::BTreeMap;

use crate::domain::vote::{DEFAULT_QUESTION, OUTCOME_NO_VOTES, OUTCOME_TIE};
use crate::domain::{QuestionTally, VoteResult, VoteSession};

pub fn tally(session: &VoteSession) -> VoteResult {
    let questions = questions_of(session);

    let mut tallies = BTreeMap::new();
    for question in &questions {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for vote in session.votes.values() {
            if let Some(choice) = vote.choices.get(question) {
                *counts.entry(choice.clone()).or_default() += 1;
            }
        }
        let outcome = plurality(&counts);
        tallies.insert(question.clone(), QuestionTally { counts, outcome });
    }

    let outcome = if session.votes.is_empty() {
        OUTCOME_NO_VOTES.to_string()
    } else {
        questions
            .first()
            .and_then(|primary| tallies.get(primary))
            .map_or_else(|| OUTCOME_TIE.to_string(), |t| t.outcome.clone())
    };

    VoteResult {
        vote_id: session.vote_id.clone(),
        correlation_id: session.correlation_id.clone(),
        outcome,
        questions: tallies,
        participating_agents: session.votes.keys().cloned().collect(),
        total_votes: session.votes.len(),
    }
}

/// Declared questions in order, else every question voted on, else the default.
fn questions_of(session: &VoteSession) -> Vec<String> {
    let mut declared: Vec<String> = Vec::new();
    for q in &session.questions {
        if !q.trim().is_empty() && !declared.contains(q) {
            declared.push(q.clone());
        }
    }
    if !declared.is_empty() {
        return declared;
    }

    let mut seen: Vec<String> = session
        .votes
        .values()
        .flat_map(|vote| vote.choices.keys().cloned())
        .collect();
    seen.sort();
    seen.dedup();
    if seen.is_empty() {
        seen.push(DEFAULT_QUESTION.to_string());
    }
    seen
}

fn plurality(counts: &BTreeMap<String, usize>) -> String {
    let Some(max) = counts.values().copied().max() else {
        return OUTCOME_TIE.to_string();
    };
    let mut leaders = counts.iter().filter(|(_, n)| **n == max);
    match (leaders.next(), leaders.next()) {
        (Some((choice, _)), None) => format!("Decision: {choice}"),
        _ => OUTCOME_TIE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentId, AgentVote, VoteId, VoteInitiated};
    use chrono::Utc;
    use rstest::rstest;

    fn session(questions: &[&str], votes: &[(&str, &str, &str)]) -> VoteSession {
        let mut session = VoteSession::new(
            VoteInitiated {
                vote_id: VoteId::new("v1"),
                correlation_id: "req-1".into(),
                questions: questions.iter().map(|q| q.to_string()).collect(),
                deadline: None,
                quorum: None,
            },
            Utc::now(),
        );
        for (agent, question, choice) in votes {
            let entry = session
                .votes
                .entry(AgentId::new(*agent))
                .or_insert_with(|| {
                    let mut vote = AgentVote::single("v1", *agent, "unused");
                    vote.choices.clear();
                    vote
                });
            entry.choices.insert(question.to_string(), choice.to_string());
        }
        session
    }

    #[test]
    fn zero_votes_reports_no_votes() {
        let result = tally(&session(&[], &[]));
        assert_eq!(result.outcome, "No votes received");
        assert_eq!(result.total_votes, 0);
        assert!(result.participating_agents.is_empty());
    }

    #[test]
    fn plurality_wins() {
        let result = tally(&session(
            &[],
            &[
                ("AgentA", "decision", "A"),
                ("AgentB", "decision", "A"),
                ("AgentC", "decision", "B"),
            ],
        ));
        assert_eq!(result.outcome, "Decision: A");
        assert_eq!(result.participating_agents.len(), 3);
        assert_eq!(result.questions["decision"].counts["A"], 2);
    }

    #[rstest]
    #[case::tie(&[("AgentA", "decision", "A"), ("AgentB", "decision", "B")], "Tie or No Votes")]
    #[case::single(&[("AgentA", "decision", "B")], "Decision: B")]
    fn primary_question_outcome(#[case] votes: &[(&str, &str, &str)], #[case] expected: &str) {
        assert_eq!(tally(&session(&["decision"], votes)).outcome, expected);
    }

    #[test]
    fn undeclared_questions_are_ignored() {
        let result = tally(&session(
            &["ship"],
            &[("AgentA", "ship", "yes"), ("AgentB", "color", "red")],
        ));
        assert_eq!(result.outcome, "Decision: yes");
        assert!(!result.questions.contains_key("color"));
        // 宣言外の質問にしか答えていなくても参加者には数える
        assert_eq!(result.total_votes, 2);
    }

    #[test]
    fn first_declared_question_is_primary() {
        let result = tally(&session(
            &["ship", "color"],
            &[
                ("AgentA", "ship", "no"),
                ("AgentA", "color", "red"),
                ("AgentB", "color", "red"),
            ],
        ));
        assert_eq!(result.outcome, "Decision: no");
        assert_eq!(result.questions["color"].outcome, "Decision: red");
    }
}
