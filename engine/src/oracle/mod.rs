//! Quality Oracle — scores responses and recommends escalation
//!
//! The engine treats scoring as an opaque call and relies only on the
//! contract:
//!
//! - `score` in 0–10, `confidence` in 0–1
//! - `suggested_tier` strictly later than the tier used
//! - `suggested_specialist` only once the top ordinary tier has been used
//! - identical input yields the same `needs_escalation`
//!
//! [`enforce_contract`] applies the first three to whatever an oracle
//! returns; [`MemoizedOracle`] guarantees the fourth.

pub mod contract;
pub mod heuristic;
pub mod memo;
pub mod scripted;

use crate::error::EvaluationError;
use crate::task::Task;
use crate::tier::ExecutorRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use contract::enforce_contract;
pub use heuristic::{HeuristicConfig, HeuristicOracle};
pub use memo::MemoizedOracle;
pub use scripted::ScriptedOracle;

/// Oracle verdict on one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub score: f64,
    pub confidence: f64,
    pub issues: Vec<String>,
    pub strengths: Vec<String>,
    pub needs_escalation: bool,
    /// Index of a strictly later tier
    pub suggested_tier: Option<usize>,
    /// Registry name of a specialist
    pub suggested_specialist: Option<String>,
    pub reasoning: String,
}

impl QualityAssessment {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            score,
            confidence,
            issues: Vec::new(),
            strengths: Vec::new(),
            needs_escalation: false,
            suggested_tier: None,
            suggested_specialist: None,
            reasoning: String::new(),
        }
    }

    /// Score 0, must escalate. Used when no real verdict is available.
    pub fn conservative(issue: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            confidence: 0.0,
            issues: vec![issue.into()],
            strengths: Vec::new(),
            needs_escalation: true,
            suggested_tier: None,
            suggested_specialist: None,
            reasoning: "conservative fallback assessment".to_string(),
        }
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_strength(mut self, strength: impl Into<String>) -> Self {
        self.strengths.push(strength.into());
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn needing_escalation(mut self) -> Self {
        self.needs_escalation = true;
        self
    }

    pub fn suggest_tier(mut self, index: usize) -> Self {
        self.needs_escalation = true;
        self.suggested_tier = Some(index);
        self
    }

    pub fn suggest_specialist(mut self, name: impl Into<String>) -> Self {
        self.needs_escalation = true;
        self.suggested_specialist = Some(name.into());
        self
    }

    pub fn passes(&self, threshold: f64) -> bool {
        self.score >= threshold
    }

    /// Whether the oracle named an explicit escalation target.
    pub fn has_suggestion(&self) -> bool {
        self.suggested_tier.is_some() || self.suggested_specialist.is_some()
    }
}

/// An assessment plus what it cost to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub assessment: QualityAssessment,
    pub cost: f64,
}

impl Evaluation {
    pub fn new(assessment: QualityAssessment, cost: f64) -> Self {
        Self { assessment, cost }
    }
}

/// Everything an oracle gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    pub task: &'a Task,
    pub response: &'a str,
    /// Executor that produced `response`
    pub executor: &'a ExecutorRef,
    /// Index of the highest ordinary tier in the ladder
    pub highest_tier: usize,
    pub threshold: f64,
}

impl EvaluationRequest<'_> {
    /// Whether the response came from the top ordinary tier.
    pub fn at_highest_tier(&self) -> bool {
        self.executor.tier_index() == Some(self.highest_tier)
    }
}

#[async_trait]
pub trait QualityOracle: Send + Sync {
    async fn evaluate(&self, request: EvaluationRequest<'_>) -> Result<Evaluation, EvaluationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conservative_assessment() {
        let a = QualityAssessment::conservative("oracle down");
        assert_eq!(a.score, 0.0);
        assert!(a.needs_escalation);
        assert!(!a.has_suggestion());
        assert_eq!(a.issues, vec!["oracle down"]);
    }

    #[test]
    fn test_suggestions_imply_escalation() {
        let a = QualityAssessment::new(4.5, 0.8).suggest_tier(1);
        assert!(a.needs_escalation);
        assert!(a.has_suggestion());
        assert!(!a.passes(6.0));
        assert!(QualityAssessment::new(6.0, 0.8).passes(6.0));
    }

    #[test]
    fn test_at_highest_tier() {
        let task = Task::new("t");
        let executor = ExecutorRef::Tier {
            index: 2,
            name: "tier2".to_string(),
        };
        let request = EvaluationRequest {
            task: &task,
            response: "r",
            executor: &executor,
            highest_tier: 2,
            threshold: 6.0,
        };
        assert!(request.at_highest_tier());

        let specialist = ExecutorRef::Specialist {
            name: "security".to_string(),
        };
        let request = EvaluationRequest {
            executor: &specialist,
            ..request
        };
        assert!(!request.at_highest_tier());
    }
}
