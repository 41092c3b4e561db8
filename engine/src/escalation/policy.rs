//! Escalation Policy — deterministic accept/retry/escalate/abort decisions
//!
//! Consumes one evaluated attempt (plus any loop signal) and produces the
//! next step for the controller. No I/O and no model calls happen here, so
//! every branch is unit-testable.

use crate::config::SpecialistConfig;
use crate::error::FailureReason;
use crate::escalation::loop_detector::{LoopKind, LoopSignal};
use crate::escalation::state::EscalationReason;
use crate::oracle::QualityAssessment;
use crate::tier::ExecutorRef;
use std::time::Duration;

/// What the controller does after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Quality gate passed
    Accept,
    /// Try the same executor again. Specialist retries see expanded context.
    Retry { expand_context: bool },
    /// Move to a strictly later ordinary tier
    EscalateTier {
        target: usize,
        reason: EscalationReason,
    },
    /// Hand off to a specialist, by name when the oracle named one
    EscalateSpecialist {
        suggested: Option<String>,
        reason: EscalationReason,
    },
    Abort(FailureReason),
}

impl Decision {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accept | Self::Abort(_))
    }
}

/// Facts about the attempt just evaluated.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub assessment: &'a QualityAssessment,
    /// Executor that produced the attempt
    pub executor: &'a ExecutorRef,
    /// Attempts made with `executor` so far, including this one
    pub attempts_here: u32,
    pub loop_signal: Option<&'a LoopSignal>,
    pub highest_tier: usize,
    pub threshold: f64,
    pub max_tier_attempts: u32,
    pub elapsed: Duration,
    pub time_limit: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EscalationPolicy {
    /// Attempts a specialist gets before the run is terminal
    pub specialist_max_attempts: u32,
    /// Escalate to a tag-selected specialist when the top tier runs out
    pub auto_fallback: bool,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::new(&SpecialistConfig::default())
    }
}

impl EscalationPolicy {
    pub fn new(config: &SpecialistConfig) -> Self {
        Self {
            specialist_max_attempts: config.max_attempts.max(1),
            auto_fallback: config.auto_fallback,
        }
    }

    pub fn decide(&self, input: &DecisionInput<'_>) -> Decision {
        // Past the wall-clock limit a later tier would only start more work
        // the task can no longer wait for, so this aborts even when tiers
        // remain. The best attempt so far is still returned.
        if let Some(signal) = input.loop_signal {
            if signal.kind == LoopKind::WallClockTimeout {
                return Decision::Abort(FailureReason::TimeoutExceeded {
                    elapsed_ms: input.elapsed.as_millis() as u64,
                    limit_ms: input.time_limit.as_millis() as u64,
                });
            }
        }

        let forced = input.loop_signal.is_some();
        if !forced && input.assessment.passes(input.threshold) {
            return Decision::Accept;
        }

        match input.executor {
            ExecutorRef::Specialist { .. } => self.decide_at_specialist(input, forced),
            ExecutorRef::Tier { index, .. } if *index < input.highest_tier => {
                Self::decide_at_lower_tier(input, *index)
            }
            ExecutorRef::Tier { .. } => self.decide_at_top_tier(input, forced),
        }
    }

    fn decide_at_lower_tier(input: &DecisionInput<'_>, index: usize) -> Decision {
        let suggested = input
            .assessment
            .suggested_tier
            .filter(|t| *t > index && *t <= input.highest_tier);

        let reason = if let Some(signal) = input.loop_signal {
            EscalationReason::LoopDetected {
                kind: signal.kind,
                confidence: signal.confidence,
            }
        } else if let Some(target) = suggested {
            EscalationReason::OracleSuggested {
                target: format!("tier {target}"),
            }
        } else if input.attempts_here >= input.max_tier_attempts {
            EscalationReason::TierExhausted {
                tier: input.executor.to_string(),
                attempts: input.attempts_here,
            }
        } else {
            return Decision::Retry {
                expand_context: false,
            };
        };

        Decision::EscalateTier {
            target: suggested.unwrap_or(index + 1),
            reason,
        }
    }

    fn decide_at_top_tier(&self, input: &DecisionInput<'_>, forced: bool) -> Decision {
        if let Some(name) = &input.assessment.suggested_specialist {
            return Decision::EscalateSpecialist {
                suggested: Some(name.clone()),
                reason: EscalationReason::OracleSuggested {
                    target: format!("specialist:{name}"),
                },
            };
        }

        if !forced && input.attempts_here < input.max_tier_attempts {
            return Decision::Retry {
                expand_context: false,
            };
        }

        if self.auto_fallback {
            let reason = match input.loop_signal {
                Some(signal) => EscalationReason::LoopDetected {
                    kind: signal.kind,
                    confidence: signal.confidence,
                },
                None => EscalationReason::SpecialistFallback {
                    tier: input.executor.to_string(),
                },
            };
            return Decision::EscalateSpecialist {
                suggested: None,
                reason,
            };
        }

        Decision::Abort(FailureReason::AllTiersExhausted {
            last_executor: input.executor.to_string(),
        })
    }

    fn decide_at_specialist(&self, input: &DecisionInput<'_>, forced: bool) -> Decision {
        if !forced && input.attempts_here < self.specialist_max_attempts {
            return Decision::Retry {
                expand_context: true,
            };
        }
        Decision::Abort(FailureReason::AllTiersExhausted {
            last_executor: input.executor.to_string(),
        })
    }
}
