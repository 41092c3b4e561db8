//! Engine error types
//!
//! Capability- and oracle-level errors are recovered inside the controller.
//! Construction-time errors (bad ladders, bad registrations, bad config) are
//! surfaced through [`EngineError`]. Terminal task outcomes are not errors at
//! all: they travel as [`FailureReason`] on a failed `EscalationResult`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias for engine construction and configuration.
pub type EngineResult<T> = Result<T, EngineError>;

/// A capability tier (or specialist) failed to produce any response.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited: retry after {0:?}")]
    RateLimited(Duration),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("executor failed: {0}")]
    Failed(String),
}

/// The quality oracle could not produce a score.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle response could not be parsed: {0}")]
    Malformed(String),

    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Invalid tier ladder definitions.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LadderError {
    #[error("tier ladder must contain at least one tier")]
    Empty,

    #[error("tier '{name}' cost {cost} is not above previous tier cost {previous}")]
    NonIncreasingCost {
        name: String,
        cost: f64,
        previous: f64,
    },

    #[error("duplicate tier name: {0}")]
    DuplicateName(String),
}

/// Invalid specialist registrations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("specialist already registered: {0}")]
    Duplicate(String),

    #[error("specialist '{name}' cost class {cost_class} is below the floor {floor}")]
    BelowCostFloor {
        name: String,
        cost_class: f64,
        floor: f64,
    },

    #[error("specialist registry lock poisoned")]
    LockPoisoned,
}

/// Audit log failures. Logged by the controller, never fatal to a task.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("audit record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level error for building an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ladder(#[from] LadderError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("specialist cost floor {floor} is below the top tier cost {top_tier_cost}")]
    SpecialistFloorBelowTopTier { floor: f64, top_tier_cost: f64 },
}

/// Why a task ended without an accepted result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Cumulative cost reached the task budget.
    BudgetExhausted { spent: f64, limit: f64 },
    /// Wall-clock limit passed.
    TimeoutExceeded { elapsed_ms: u64, limit_ms: u64 },
    /// Every tier (and the chosen specialist, if any) failed the quality gate.
    AllTiersExhausted { last_executor: String },
    /// Hard cap on total attempts reached.
    AttemptLimitReached { attempts: u32 },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExhausted { spent, limit } => {
                write!(f, "budget exhausted: spent {:.6} of {:.6}", spent, limit)
            }
            Self::TimeoutExceeded {
                elapsed_ms,
                limit_ms,
            } => write!(f, "timeout exceeded: {}ms (limit {}ms)", elapsed_ms, limit_ms),
            Self::AllTiersExhausted { last_executor } => {
                write!(f, "all tiers exhausted (last: {})", last_executor)
            }
            Self::AttemptLimitReached { attempts } => {
                write!(f, "attempt limit reached after {} attempts", attempts)
            }
        }
    }
}
