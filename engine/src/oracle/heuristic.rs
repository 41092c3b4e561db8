//! Heuristic Oracle — offline scoring without a model call
//!
//! Scores a response from cheap textual signals: how much of the task's
//! vocabulary it covers, its length and structure, and obvious failure
//! markers ("I cannot", "TODO", ...). Good enough as a default gate and as a
//! deterministic stand-in for a model-backed oracle in tests.

use super::{Evaluation, EvaluationRequest, QualityAssessment, QualityOracle};
use crate::error::EvaluationError;
use crate::specialist::SpecialistRegistry;
use crate::task::extract_keywords;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

static FAILURE_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(i cannot|i can't|i am unable|i'm unable|not sure|todo|fixme|unimplemented|placeholder|error:)",
    )
    .unwrap()
});

static LIST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*]|\d+[.)])\s+\S").unwrap());

/// Tunables for [`HeuristicOracle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Score before any signal is applied
    pub base_score: f64,
    /// Weight of task-keyword coverage (0-1 coverage times this)
    pub coverage_weight: f64,
    /// Responses shorter than this many words are penalized
    pub min_words: usize,
    /// Responses at least this long earn a bonus
    pub thorough_words: usize,
    /// Shortfall below the threshold that earns a next-tier suggestion
    pub escalate_gap: f64,
    /// Shortfall that skips a tier
    pub skip_gap: f64,
    /// Cost charged per evaluation
    pub evaluation_cost: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            base_score: 4.0,
            coverage_weight: 3.0,
            min_words: 12,
            thorough_words: 80,
            escalate_gap: 1.5,
            skip_gap: 4.0,
            evaluation_cost: 0.0,
        }
    }
}

pub struct HeuristicOracle {
    config: HeuristicConfig,
    specialists: Option<Arc<SpecialistRegistry>>,
}

impl HeuristicOracle {
    pub fn new(config: HeuristicConfig) -> Self {
        Self {
            config,
            specialists: None,
        }
    }

    /// Lets the oracle name a specialist once the top tier falls short.
    pub fn with_specialists(mut self, registry: Arc<SpecialistRegistry>) -> Self {
        self.specialists = Some(registry);
        self
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    /// Pure scoring step; `evaluate` wraps this.
    pub fn assess(&self, request: &EvaluationRequest<'_>) -> QualityAssessment {
        let cfg = &self.config;
        let response = request.response.trim();
        if response.is_empty() {
            return QualityAssessment::new(0.0, 0.9)
                .with_issue("empty response")
                .needing_escalation()
                .with_reasoning("nothing to evaluate");
        }

        let mut assessment = QualityAssessment::new(0.0, 0.0);
        let mut score = cfg.base_score;
        let mut signals = 0u32;

        let wanted = request.task.keywords();
        if !wanted.is_empty() {
            let present = extract_keywords(response);
            let covered = wanted.iter().filter(|k| present.contains(*k)).count();
            let coverage = covered as f64 / wanted.len() as f64;
            score += cfg.coverage_weight * coverage;
            signals += 1;
            if coverage >= 0.5 {
                assessment = assessment.with_strength(format!(
                    "addresses {covered} of {} task terms",
                    wanted.len()
                ));
            } else {
                assessment = assessment.with_issue(format!(
                    "covers only {covered} of {} task terms",
                    wanted.len()
                ));
            }
        }

        let words = response.split_whitespace().count();
        if words < cfg.min_words {
            score -= 1.5;
            signals += 1;
            assessment = assessment.with_issue(format!("response is very short ({words} words)"));
        } else if words >= cfg.thorough_words {
            score += 1.0;
            signals += 1;
            assessment = assessment.with_strength("thorough response");
        }

        if response.contains("```") || LIST_LINE.is_match(response) {
            score += 1.0;
            signals += 1;
            assessment = assessment.with_strength("structured output");
        }

        let markers = FAILURE_MARKERS.find_iter(response).count().min(3);
        if markers > 0 {
            score -= markers as f64;
            signals += 1;
            assessment =
                assessment.with_issue(format!("{markers} failure marker(s) in response"));
        }

        let score = score.clamp(0.0, 10.0);
        assessment.score = score;
        assessment.confidence = (0.4 + 0.1 * signals as f64).min(0.9);
        assessment.needs_escalation = score < request.threshold;
        assessment.reasoning = format!(
            "heuristic score {score:.1} against threshold {:.1}",
            request.threshold
        );

        let gap = request.threshold - score;
        if gap >= cfg.escalate_gap {
            self.suggest(assessment, request, gap)
        } else {
            assessment
        }
    }

    fn suggest(
        &self,
        assessment: QualityAssessment,
        request: &EvaluationRequest<'_>,
        gap: f64,
    ) -> QualityAssessment {
        let Some(current) = request.executor.tier_index() else {
            return assessment;
        };

        if current < request.highest_tier {
            let step = if gap >= self.config.skip_gap { 2 } else { 1 };
            return assessment.suggest_tier((current + step).min(request.highest_tier));
        }

        match self
            .specialists
            .as_ref()
            .and_then(|registry| registry.select(None, request.task))
        {
            Some(profile) => assessment.suggest_specialist(profile.name.clone()),
            None => assessment,
        }
    }
}

impl Default for HeuristicOracle {
    fn default() -> Self {
        Self::new(HeuristicConfig::default())
    }
}

#[async_trait]
impl QualityOracle for HeuristicOracle {
    async fn evaluate(&self, request: EvaluationRequest<'_>) -> Result<Evaluation, EvaluationError> {
        let assessment = self.assess(&request);
        tracing::debug!(
            executor = %request.executor,
            score = assessment.score,
            needs_escalation = assessment.needs_escalation,
            "heuristic evaluation"
        );
        Ok(Evaluation::new(assessment, self.config.evaluation_cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specialist::{SpecialistFactory, GENERALIST};
    use crate::task::Task;
    use crate::tier::{CapabilityTier, ExecutorRef, ScriptedTier};

    fn tier(index: usize) -> ExecutorRef {
        ExecutorRef::Tier {
            index,
            name: format!("tier{index}"),
        }
    }

    fn request<'a>(task: &'a Task, response: &'a str, executor: &'a ExecutorRef) -> EvaluationRequest<'a> {
        EvaluationRequest {
            task,
            response,
            executor,
            highest_tier: 2,
            threshold: 6.0,
        }
    }

    #[test]
    fn test_empty_response_scores_zero() {
        let task = Task::new("Explain TCP congestion control");
        let t0 = tier(0);
        let a = HeuristicOracle::default().assess(&request(&task, "   ", &t0));
        assert_eq!(a.score, 0.0);
        assert!(a.needs_escalation);
    }

    #[test]
    fn test_covering_structured_answer_passes() {
        let task = Task::new("Explain TCP congestion control windows");
        let response = "TCP congestion control adjusts the sender window based on loss signals.\n\
            - Slow start grows the congestion window exponentially until a threshold.\n\
            - Congestion avoidance then grows the window linearly per round trip.\n\
            - On loss, the window shrinks and control re-enters recovery.";
        let t0 = tier(0);
        let a = HeuristicOracle::default().assess(&request(&task, response, &t0));
        assert!(a.score >= 6.0, "score was {}", a.score);
        assert!(!a.needs_escalation);
        assert!(a.suggested_tier.is_none());
    }

    #[test]
    fn test_weak_answer_suggests_later_tier() {
        let task = Task::new("Design a sharded rate limiter for the payments gateway");
        let t0 = tier(0);
        let a = HeuristicOracle::default().assess(&request(&task, "I cannot help with that. TODO", &t0));
        assert!(a.needs_escalation);
        // far below threshold: skip a tier
        assert_eq!(a.suggested_tier, Some(2));

        let t1 = tier(1);
        let a = HeuristicOracle::default().assess(&request(&task, "I cannot help with that. TODO", &t1));
        assert_eq!(a.suggested_tier, Some(2));
    }

    struct Echo;

    impl SpecialistFactory for Echo {
        fn build(&self, name: &str, _tags: &[String]) -> Arc<dyn CapabilityTier> {
            Arc::new(ScriptedTier::new(name).repeat("ok", 1.0))
        }
    }

    #[test]
    fn test_top_tier_suggests_specialist() {
        let registry = SpecialistRegistry::with_default_catalog(10.0, &Echo)
            .unwrap()
            .shared();
        let oracle = HeuristicOracle::default().with_specialists(registry);

        let task = Task::new("Audit the login flow for injection vulnerability and csrf");
        let t2 = tier(2);
        let a = oracle.assess(&request(&task, "no idea", &t2));
        assert_eq!(a.suggested_specialist.as_deref(), Some("security"));
        assert!(a.suggested_tier.is_none());

        let task = Task::new("Compose a limerick");
        let a = oracle.assess(&request(&task, "no", &t2));
        assert_eq!(a.suggested_specialist.as_deref(), Some(GENERALIST));
    }

    #[tokio::test]
    async fn test_evaluate_charges_configured_cost() {
        let oracle = HeuristicOracle::new(HeuristicConfig {
            evaluation_cost: 0.001,
            ..HeuristicConfig::default()
        });
        let task = Task::new("Summarize the incident");
        let t0 = tier(0);
        let eval = oracle.evaluate(request(&task, "short", &t0)).await.unwrap();
        assert_eq!(eval.cost, 0.001);
    }
}
