//! Friction Signals — detect when a task was harder than its ladder expected
//!
//! Friction signals are computed over a finished history and attached to the
//! result for observability. They never feed back into escalation decisions;
//! the loop detector owns that.

use crate::escalation::state::{AttemptOutcome, EscalationHistory};
use crate::task::Task;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrictionKind {
    /// Quality score not improving over the trailing attempts
    ScorePlateau { best: f64, attempts: u32 },
    /// A single attempt consumed a large share of the budget
    CostSpike { attempt: u32, fraction: f64 },
    /// Multiple escalations within a few attempts
    RapidEscalation { escalations: u32, within_attempts: u32 },
    /// Executors failed outright more than once
    ExecutionFailures { count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrictionSeverity { Low, Medium, High }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrictionSignal {
    pub kind: FrictionKind,
    pub severity: FrictionSeverity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrictionDetector;

impl FrictionDetector {
    pub fn detect(history: &EscalationHistory, task: &Task) -> Vec<FrictionSignal> {
        let mut out = Vec::new();
        let h = &history.attempts;

        // Plateau: trailing window never beats its first score
        if h.len() >= 3 {
            let sz = h.len().min(4);
            let hw = &h[h.len() - sz..];
            let first = hw[0].quality_score;
            let best = hw.iter().map(|a| a.quality_score).fold(f64::MIN, f64::max);
            let last = hw[sz - 1].quality_score;
            if best <= first && best < task.quality_threshold {
                out.push(FrictionSignal {
                    kind: FrictionKind::ScorePlateau { best, attempts: sz as u32 },
                    severity: if last < first { FrictionSeverity::High } else { FrictionSeverity::Medium },
                    description: format!("Score stuck at {:.1} over {} attempts", best, sz),
                });
            }
        }

        // Cost spike: one attempt ate at least half the budget
        if task.budget_limit > 0.0 {
            if let Some(a) = h.iter().max_by(|a, b| a.total_cost().total_cmp(&b.total_cost())) {
                let frac = a.total_cost() / task.budget_limit;
                if frac >= 0.5 && h.len() > 1 {
                    out.push(FrictionSignal {
                        kind: FrictionKind::CostSpike { attempt: a.number, fraction: frac },
                        severity: if frac >= 0.8 { FrictionSeverity::High } else { FrictionSeverity::Medium },
                        description: format!("Attempt {} used {:.0}% of the budget", a.number, frac * 100.0),
                    });
                }
            }
        }

        // Rapid escalation: multiple escalations in few attempts
        let esc = &history.escalations;
        if esc.len() >= 2 {
            let recent = &esc[esc.len().saturating_sub(3)..];
            let total = h.last().map(|a| a.number).unwrap_or(0);
            let span = total.saturating_sub(recent[0].at_attempt);
            if recent.len() >= 2 && span <= 2 {
                out.push(FrictionSignal {
                    kind: FrictionKind::RapidEscalation { escalations: recent.len() as u32, within_attempts: span },
                    severity: if span <= 1 { FrictionSeverity::High } else { FrictionSeverity::Medium },
                    description: format!("{} escalations within {} attempts", recent.len(), span),
                });
            }
        }

        // Execution failures
        let failures = h.iter().filter(|a| a.outcome == AttemptOutcome::ExecutionFailed).count() as u32;
        if failures >= 2 {
            out.push(FrictionSignal {
                kind: FrictionKind::ExecutionFailures { count: failures },
                severity: if failures >= 4 { FrictionSeverity::High } else { FrictionSeverity::Low },
                description: format!("{} attempts failed to produce a response", failures),
            });
        }

        out
    }
}
