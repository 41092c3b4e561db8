//! Capability tiers — the cost-ordered executor ladder
//!
//! ```text
//! tier0 (cheapest) ──► tier1 ──► ... ──► tierN (highest ordinary tier)
//!                                              │
//!                                              ▼
//!                                  specialist (cost ≥ tierN)
//! ```
//!
//! The ladder is built once, validated (non-empty, strictly increasing
//! relative cost, unique names) and then shared read-only between every
//! controller.

pub mod scripted;

use crate::error::{ExecutionError, LadderError};
use crate::escalation::state::Attempt;
use crate::task::Task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

pub use scripted::ScriptedTier;

/// What a tier produced for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierOutput {
    pub response: String,
    /// Monetary cost of producing the response
    pub cost: f64,
}

impl TierOutput {
    pub fn new(response: impl Into<String>, cost: f64) -> Self {
        Self {
            response: response.into(),
            cost,
        }
    }
}

/// An executor able to attempt a task.
///
/// Implementations must not fail for low-quality output; judging quality is
/// the oracle's job. `Err` is reserved for capability-level failures
/// (upstream down, rate limited, rejected request).
#[async_trait]
pub trait CapabilityTier: Send + Sync {
    async fn execute(&self, task: &Task, history: &[Attempt]) -> Result<TierOutput, ExecutionError>;
}

/// Which executor handled an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutorRef {
    Tier { index: usize, name: String },
    Specialist { name: String },
}

impl ExecutorRef {
    pub fn tier_index(&self) -> Option<usize> {
        match self {
            Self::Tier { index, .. } => Some(*index),
            Self::Specialist { .. } => None,
        }
    }

    pub fn is_specialist(&self) -> bool {
        matches!(self, Self::Specialist { .. })
    }

    /// Position in escalation order. Specialists rank above every tier.
    pub fn rank(&self) -> usize {
        match self {
            Self::Tier { index, .. } => *index,
            Self::Specialist { .. } => usize::MAX,
        }
    }
}

impl std::fmt::Display for ExecutorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tier { name, .. } => write!(f, "{}", name),
            Self::Specialist { name } => write!(f, "specialist:{}", name),
        }
    }
}

/// One rung of the ladder.
#[derive(Clone)]
pub struct TierSpec {
    pub name: String,
    /// Relative cost class; strictly increasing along the ladder
    pub relative_cost: f64,
    executor: Arc<dyn CapabilityTier>,
}

impl TierSpec {
    pub fn new(
        name: impl Into<String>,
        relative_cost: f64,
        executor: Arc<dyn CapabilityTier>,
    ) -> Self {
        Self {
            name: name.into(),
            relative_cost,
            executor,
        }
    }

    pub fn executor(&self) -> &Arc<dyn CapabilityTier> {
        &self.executor
    }
}

impl std::fmt::Debug for TierSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierSpec")
            .field("name", &self.name)
            .field("relative_cost", &self.relative_cost)
            .finish_non_exhaustive()
    }
}

/// Validated, totally ordered tier ladder.
#[derive(Debug, Clone)]
pub struct TierLadder {
    tiers: Vec<TierSpec>,
}

impl TierLadder {
    pub fn new(tiers: Vec<TierSpec>) -> Result<Self, LadderError> {
        if tiers.is_empty() {
            return Err(LadderError::Empty);
        }

        let mut names = HashSet::new();
        let mut previous: Option<f64> = None;
        for tier in &tiers {
            if !names.insert(tier.name.as_str()) {
                return Err(LadderError::DuplicateName(tier.name.clone()));
            }
            if let Some(prev) = previous {
                // NaN fails this comparison too
                if !(tier.relative_cost > prev) {
                    return Err(LadderError::NonIncreasingCost {
                        name: tier.name.clone(),
                        cost: tier.relative_cost,
                        previous: prev,
                    });
                }
            }
            previous = Some(tier.relative_cost);
        }

        Ok(Self { tiers })
    }

    /// Wrap in an `Arc` for sharing across controllers.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Index of the highest ordinary tier.
    pub fn highest_index(&self) -> usize {
        self.tiers.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&TierSpec> {
        self.tiers.get(index)
    }

    pub fn top_cost(&self) -> f64 {
        self.tiers
            .last()
            .map(|t| t.relative_cost)
            .unwrap_or_default()
    }

    pub fn executor_ref(&self, index: usize) -> Option<ExecutorRef> {
        self.tiers.get(index).map(|t| ExecutorRef::Tier {
            index,
            name: t.name.clone(),
        })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name.as_str()).collect()
    }
}
