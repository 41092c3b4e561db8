//! Escalation State — attempt history, escalation records, terminal result

use crate::error::FailureReason;
use crate::escalation::friction::FrictionSignal;
use crate::escalation::loop_detector::LoopKind;
use crate::tier::ExecutorRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an attempt's assessment was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Executor answered and the oracle scored it
    Evaluated,
    /// Executor failed; zero-quality assessment synthesized
    ExecutionFailed,
    /// Oracle failed; conservative must-escalate assessment synthesized
    EvaluationFailed,
    /// Execution overshot the budget; no evaluation could be paid for
    Unevaluated,
}

/// Record of a single attempt. Append-only once pushed into a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Which attempt this was (1-indexed)
    pub number: u32,
    /// Tier or specialist that produced the response
    pub executor: ExecutorRef,
    pub response_text: String,
    /// Execution cost actually charged (truncated at the budget boundary)
    pub execution_cost: f64,
    /// Evaluation cost actually charged
    pub evaluation_cost: f64,
    pub quality_score: f64,
    pub quality_confidence: f64,
    pub issues: Vec<String>,
    pub strengths: Vec<String>,
    pub needs_escalation: bool,
    #[serde(default)]
    pub reasoning: String,
    pub outcome: AttemptOutcome,
    /// When the attempt started
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl Attempt {
    pub fn total_cost(&self) -> f64 {
        self.execution_cost + self.evaluation_cost
    }

    /// Whether the executor produced a response body at all.
    pub fn has_response(&self) -> bool {
        self.outcome != AttemptOutcome::ExecutionFailed && !self.response_text.is_empty()
    }
}

/// Why the controller moved to a more capable executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Oracle named a later tier or a specialist
    OracleSuggested { target: String },
    /// Loop detector forced escalation
    LoopDetected { kind: LoopKind, confidence: f64 },
    /// Per-tier attempt cap reached without passing the gate
    TierExhausted { tier: String, attempts: u32 },
    /// Automatic specialist fallback after the top tier ran out
    SpecialistFallback { tier: String },
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OracleSuggested { target } => write!(f, "oracle suggested {}", target),
            Self::LoopDetected { kind, confidence } => {
                write!(f, "{} loop (confidence {:.2})", kind, confidence)
            }
            Self::TierExhausted { tier, attempts } => {
                write!(f, "{} exhausted after {} attempts", tier, attempts)
            }
            Self::SpecialistFallback { tier } => {
                write!(f, "{} exhausted, falling back to specialist", tier)
            }
        }
    }
}

/// Record of an escalation event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub from: ExecutorRef,
    pub to: ExecutorRef,
    pub reason: EscalationReason,
    pub timestamp: DateTime<Utc>,
    /// Attempt number after which escalation happened
    pub at_attempt: u32,
}

/// Ordered attempts plus the escalations between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationHistory {
    pub attempts: Vec<Attempt>,
    pub escalations: Vec<EscalationRecord>,
}

impl EscalationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, attempt: Attempt) {
        self.attempts.push(attempt);
    }

    pub fn record_escalation(
        &mut self,
        from: ExecutorRef,
        to: ExecutorRef,
        reason: EscalationReason,
    ) {
        let at_attempt = self.attempts.last().map(|a| a.number).unwrap_or(0);
        self.escalations.push(EscalationRecord {
            from,
            to,
            reason,
            timestamp: Utc::now(),
            at_attempt,
        });
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn last(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    pub fn total_cost(&self) -> f64 {
        self.attempts.iter().map(Attempt::total_cost).sum()
    }

    /// Highest-scoring attempt that produced a response; ties go to the
    /// most recent.
    pub fn best_attempt(&self) -> Option<&Attempt> {
        self.attempts
            .iter()
            .filter(|a| a.has_response())
            .fold(None, |best: Option<&Attempt>, a| match best {
                Some(b) if b.quality_score > a.quality_score => Some(b),
                _ => Some(a),
            })
    }

    /// Whether executor rank never decreases across attempts.
    pub fn is_monotonic(&self) -> bool {
        self.attempts
            .windows(2)
            .all(|w| w[0].executor.rank() <= w[1].executor.rank())
    }

    /// Attempts made by a given executor.
    pub fn attempts_by(&self, executor: &ExecutorRef) -> usize {
        self.attempts
            .iter()
            .filter(|a| &a.executor == executor)
            .count()
    }

    /// Issues reported by specialist and tier attempts, in order, deduplicated.
    pub fn collected_issues(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for issue in self.attempts.iter().flat_map(|a| a.issues.iter()) {
            if !out.contains(issue) {
                out.push(issue.clone());
            }
        }
        out
    }

    /// Get a summary for logging
    pub fn summary(&self) -> String {
        let best = self
            .best_attempt()
            .map(|a| format!("{:.1}", a.quality_score))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "attempts={} escalations={} cost={:.6} best={}",
            self.attempts.len(),
            self.escalations.len(),
            self.total_cost(),
            best,
        )
    }
}

/// Controller state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Ready,
    Attempting(ExecutorRef),
    Evaluating,
    Accepted,
    EscalateTier(usize),
    EscalateSpecialist(String),
    Abort(FailureReason),
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Abort(_))
    }
}

/// Terminal value handed back to the submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationResult {
    pub task_id: String,
    pub success: bool,
    /// Accepted response, or the best-effort response on failure
    pub final_response: Option<String>,
    /// Executor that produced `final_response`
    pub final_executor: Option<ExecutorRef>,
    pub total_cost: f64,
    pub total_attempts: u32,
    /// More than one attempt was needed
    pub escalated: bool,
    pub history: EscalationHistory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Non-fatal diagnostics over the finished history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub friction: Vec<FrictionSignal>,
}

impl EscalationResult {
    /// Name of the final ordinary tier, if the result came from one.
    pub fn final_tier(&self) -> Option<&str> {
        match &self.final_executor {
            Some(ExecutorRef::Tier { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// Name of the final specialist, if the result came from one.
    pub fn final_specialist(&self) -> Option<&str> {
        match &self.final_executor {
            Some(ExecutorRef::Specialist { name }) => Some(name),
            _ => None,
        }
    }

    /// Score of the attempt behind `final_response`.
    pub fn final_score(&self) -> Option<f64> {
        if self.success {
            self.history.last().map(|a| a.quality_score)
        } else {
            self.history.best_attempt().map(|a| a.quality_score)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(number: u32, executor: ExecutorRef, text: &str, score: f64) -> Attempt {
        Attempt {
            number,
            executor,
            response_text: text.to_string(),
            execution_cost: 0.01,
            evaluation_cost: 0.0,
            quality_score: score,
            quality_confidence: 0.8,
            issues: vec![],
            strengths: vec![],
            needs_escalation: score < 6.0,
            reasoning: String::new(),
            outcome: AttemptOutcome::Evaluated,
            timestamp: Utc::now(),
            duration_ms: 5,
        }
    }

    fn tier(index: usize) -> ExecutorRef {
        ExecutorRef::Tier {
            index,
            name: format!("tier{index}"),
        }
    }

    #[test]
    fn test_best_attempt_prefers_most_recent_on_tie() {
        let mut history = EscalationHistory::new();
        history.push(attempt(1, tier(0), "a", 5.0));
        history.push(attempt(2, tier(0), "b", 7.0));
        history.push(attempt(3, tier(1), "c", 7.0));
        history.push(attempt(4, tier(1), "d", 3.0));

        let best = history.best_attempt().unwrap();
        assert_eq!(best.number, 3);
    }

    #[test]
    fn test_best_attempt_skips_failed_executions() {
        let mut history = EscalationHistory::new();
        let mut failed = attempt(1, tier(0), "", 0.0);
        failed.outcome = AttemptOutcome::ExecutionFailed;
        history.push(failed);
        assert!(history.best_attempt().is_none());

        history.push(attempt(2, tier(0), "ok", 0.0));
        assert_eq!(history.best_attempt().unwrap().number, 2);
    }

    #[test]
    fn test_monotonic_check() {
        let specialist = ExecutorRef::Specialist {
            name: "security".to_string(),
        };
        let mut history = EscalationHistory::new();
        history.push(attempt(1, tier(0), "a", 1.0));
        history.push(attempt(2, tier(1), "b", 2.0));
        history.push(attempt(3, specialist, "c", 3.0));
        assert!(history.is_monotonic());

        history.push(attempt(4, tier(0), "d", 4.0));
        assert!(!history.is_monotonic());
    }

    #[test]
    fn test_record_escalation_tracks_attempt() {
        let mut history = EscalationHistory::new();
        history.push(attempt(1, tier(0), "a", 1.0));
        history.record_escalation(
            tier(0),
            tier(1),
            EscalationReason::OracleSuggested {
                target: "tier1".to_string(),
            },
        );
        assert_eq!(history.escalations.len(), 1);
        assert_eq!(history.escalations[0].at_attempt, 1);
        assert!(history.summary().contains("escalations=1"));
    }

    #[test]
    fn test_collected_issues_dedupes_in_order() {
        let mut history = EscalationHistory::new();
        let mut a = attempt(1, tier(0), "a", 1.0);
        a.issues = vec!["too short".into(), "no tests".into()];
        let mut b = attempt(2, tier(0), "b", 2.0);
        b.issues = vec!["no tests".into(), "wrong api".into()];
        history.push(a);
        history.push(b);
        assert_eq!(
            history.collected_issues(),
            vec!["too short", "no tests", "wrong api"]
        );
    }

    #[test]
    fn test_escalation_reason_display() {
        let reason = EscalationReason::TierExhausted {
            tier: "tier0".to_string(),
            attempts: 3,
        };
        assert_eq!(reason.to_string(), "tier0 exhausted after 3 attempts");
    }
}
