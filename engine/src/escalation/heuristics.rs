//! Run heuristics derived from finished escalation results
//!
//! Aggregates many results into observed rates (success, escalation,
//! specialist use, loops) and derives a per-tier retry cap from how often a
//! same-tier retry actually produced the accepted answer. When no samples
//! are available the defaults match `TaskDefaults::default()`.

use crate::config::TaskDefaults;
use crate::escalation::state::{EscalationReason, EscalationResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lightweight summary of one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSample {
    pub success: bool,
    pub total_attempts: u32,
    pub total_cost: f64,
    pub escalated: bool,
    /// Display form of the final executor ("tier" or "specialist:name")
    pub final_executor: Option<String>,
    /// Accepted answer came from a second or later try at the same executor
    pub accepted_on_retry: bool,
    /// Escalations forced by the loop detector
    pub loop_escalations: u32,
    pub used_specialist: bool,
}

impl RunSample {
    pub fn from_result(result: &EscalationResult) -> Self {
        let history = &result.history;
        let accepted_on_retry = result.success
            && history
                .last()
                .map(|a| history.attempts_by(&a.executor) > 1)
                .unwrap_or(false);
        let loop_escalations = history
            .escalations
            .iter()
            .filter(|e| matches!(e.reason, EscalationReason::LoopDetected { .. }))
            .count() as u32;

        Self {
            success: result.success,
            total_attempts: result.total_attempts,
            total_cost: result.total_cost,
            escalated: result.escalated,
            final_executor: result.final_executor.as_ref().map(ToString::to_string),
            accepted_on_retry,
            loop_escalations,
            used_specialist: history.attempts.iter().any(|a| a.executor.is_specialist()),
        }
    }
}

/// Acceptance counts for one executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorStats {
    /// Runs that ended on this executor
    pub finished: usize,
    /// Of those, runs that were accepted
    pub accepted: usize,
}

impl ExecutorStats {
    pub fn acceptance_rate(&self) -> f64 {
        if self.finished == 0 {
            0.0
        } else {
            self.accepted as f64 / self.finished as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHeuristics {
    /// Number of runs used (0 = defaults)
    pub sample_count: usize,
    pub success_rate: f64,
    pub escalation_rate: f64,
    pub specialist_rate: f64,
    /// Fraction of runs with at least one loop-forced escalation
    pub loop_rate: f64,
    pub mean_cost: f64,
    pub mean_attempts: f64,
    pub per_executor: BTreeMap<String, ExecutorStats>,
    /// Suggested per-tier attempt cap
    pub recommended_max_tier_attempts: u32,
}

impl Default for RunHeuristics {
    fn default() -> Self {
        Self {
            sample_count: 0,
            success_rate: 0.0,
            escalation_rate: 0.0,
            specialist_rate: 0.0,
            loop_rate: 0.0,
            mean_cost: 0.0,
            mean_attempts: 0.0,
            per_executor: BTreeMap::new(),
            recommended_max_tier_attempts: TaskDefaults::default().max_tier_attempts,
        }
    }
}

impl RunHeuristics {
    /// Returns `RunHeuristics::default()` when `samples` is empty.
    pub fn from_samples(samples: &[RunSample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let n = samples.len() as f64;
        let rate = |f: fn(&RunSample) -> bool| samples.iter().filter(|s| f(s)).count() as f64 / n;

        let mut per_executor: BTreeMap<String, ExecutorStats> = BTreeMap::new();
        for sample in samples {
            if let Some(name) = &sample.final_executor {
                let stats = per_executor.entry(name.clone()).or_default();
                stats.finished += 1;
                if sample.success {
                    stats.accepted += 1;
                }
            }
        }

        let successes = samples.iter().filter(|s| s.success).count();
        let retry_yield = if successes == 0 {
            0.0
        } else {
            samples.iter().filter(|s| s.accepted_on_retry).count() as f64 / successes as f64
        };

        // retries that rarely pay off get capped sooner
        let recommended_max_tier_attempts = if successes == 0 {
            TaskDefaults::default().max_tier_attempts
        } else if retry_yield < 0.10 {
            1
        } else if retry_yield < 0.25 {
            2
        } else {
            3
        };

        Self {
            sample_count: samples.len(),
            success_rate: rate(|s| s.success),
            escalation_rate: rate(|s| s.escalated),
            specialist_rate: rate(|s| s.used_specialist),
            loop_rate: rate(|s| s.loop_escalations > 0),
            mean_cost: samples.iter().map(|s| s.total_cost).sum::<f64>() / n,
            mean_attempts: samples.iter().map(|s| s.total_attempts as f64).sum::<f64>() / n,
            per_executor,
            recommended_max_tier_attempts,
        }
    }

    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a EscalationResult>) -> Self {
        let samples: Vec<RunSample> = results.into_iter().map(RunSample::from_result).collect();
        Self::from_samples(&samples)
    }

    /// Task defaults with the recommended tier cap applied.
    pub fn apply_to(&self, defaults: &TaskDefaults) -> TaskDefaults {
        TaskDefaults {
            max_tier_attempts: self.recommended_max_tier_attempts,
            ..defaults.clone()
        }
    }
}
