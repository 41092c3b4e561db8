//! Task — the immutable unit of work submitted to the engine

use crate::config::TaskDefaults;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// How much is riding on a task.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A single unit of work.
///
/// Built once with the `with_*` methods and then only read. Limits are
/// clamped on construction so the controller never sees a nonsensical task
/// (negative budget, zero attempt caps, threshold outside 0–10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier used in logs and audit records
    pub id: String,
    /// What needs doing
    pub description: String,
    pub severity: Severity,
    /// Monetary ceiling for execution + evaluation cost
    pub budget_limit: f64,
    /// Wall-clock ceiling
    pub time_limit: Duration,
    /// Minimum score (0–10) to accept a response
    pub quality_threshold: f64,
    /// Attempts allowed at a single tier before it counts as exhausted
    pub max_tier_attempts: u32,
    /// Hard cap on attempts across all tiers and specialists
    pub max_attempts_total: u32,
    /// Extra context notes handed to executors (shared knowledge, prior findings)
    #[serde(default)]
    pub context: Vec<String>,
}

impl Task {
    /// Create a task with the built-in defaults.
    pub fn new(description: impl Into<String>) -> Self {
        Self::from_defaults(description, &TaskDefaults::default())
    }

    /// Create a task using configured defaults.
    pub fn from_defaults(description: impl Into<String>, defaults: &TaskDefaults) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            severity: Severity::default(),
            budget_limit: defaults.budget_limit.max(0.0),
            time_limit: Duration::from_secs(defaults.time_limit_secs),
            quality_threshold: defaults.quality_threshold.clamp(0.0, 10.0),
            max_tier_attempts: defaults.max_tier_attempts.max(1),
            max_attempts_total: defaults.max_attempts_total.max(1),
            context: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_budget(mut self, budget_limit: f64) -> Self {
        self.budget_limit = if budget_limit.is_finite() {
            budget_limit.max(0.0)
        } else {
            0.0
        };
        self
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = if threshold.is_nan() {
            0.0
        } else {
            threshold.clamp(0.0, 10.0)
        };
        self
    }

    pub fn with_max_tier_attempts(mut self, max: u32) -> Self {
        self.max_tier_attempts = max.max(1);
        self
    }

    pub fn with_max_attempts_total(mut self, max: u32) -> Self {
        self.max_attempts_total = max.max(1);
        self
    }

    /// Return a copy carrying additional context notes.
    ///
    /// Used for the specialist retry, which sees what earlier attempts got
    /// wrong.
    pub fn with_context<I, S>(&self, notes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut task = self.clone();
        for note in notes {
            let note = note.into();
            if !task.context.contains(&note) {
                task.context.push(note);
            }
        }
        task
    }

    /// Keywords extracted from the description.
    pub fn keywords(&self) -> BTreeSet<String> {
        extract_keywords(&self.description)
    }
}

/// Words too common to say anything about a task's domain.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "could", "do", "does", "for",
    "from", "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "make", "me", "my",
    "need", "needs", "of", "on", "or", "our", "please", "should", "so", "some", "that", "the",
    "their", "then", "there", "these", "this", "to", "up", "us", "use", "using", "was", "we",
    "what", "when", "which", "while", "will", "with", "would", "you", "your",
];

/// Lowercased alphanumeric tokens of at least 3 characters, stopwords removed.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}
