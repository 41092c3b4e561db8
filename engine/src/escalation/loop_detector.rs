//! Loop Detector — flags non-converging attempt sequences before cost is wasted
//!
//! Rules are checked in order and the first match wins:
//!
//! ```text
//! 1. exact repeat   last two responses byte-identical         confidence 1.00
//! 2. error repeat   last N attempts share a normalized error   confidence 0.95
//! 3. oscillation    A → B → A response pattern                 confidence 0.90
//! 4. wall clock     time since first attempt > task limit      confidence 1.00
//! ```
//!
//! Attempts whose executor failed carry no response body and are skipped by
//! the response-comparison rules; repeated failures are caught by rule 2.

use crate::config::LoopDetectionConfig;
use crate::escalation::state::Attempt;
use crate::task::Task;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?").unwrap()
});

static CLOCK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}:\d{2}:\d{2}(\.\d+)?\b").unwrap());

static PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[A-Za-z]:)?(?:[\w.-]*[/\\])+[\w.-]+").unwrap());

static FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[\w-]+\.(rs|py|js|ts|go|java|c|cc|cpp|h|hpp|rb|toml|json|ya?ml|md|txt|log)\b")
        .unwrap()
});

static LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(line|ln|col|column)\s*\d+").unwrap());

static POSITION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\d+(:\d+)?").unwrap());

static HEX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0x[0-9a-fA-F]+\b").unwrap());

static WHITESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Kinds of loop the detector recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    ExactRepeat,
    ErrorRepeat,
    Oscillation,
    WallClockTimeout,
}

impl std::fmt::Display for LoopKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactRepeat => write!(f, "exact-repeat"),
            Self::ErrorRepeat => write!(f, "error-repeat"),
            Self::Oscillation => write!(f, "oscillation"),
            Self::WallClockTimeout => write!(f, "wall-clock-timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSignal {
    pub kind: LoopKind,
    pub confidence: f64,
    pub description: String,
    /// Attempt number that completed the pattern
    pub at_attempt: u32,
}

/// Stateless loop detector. Everything it knows comes from the history it
/// is handed and the limits it was built with.
#[derive(Debug, Clone)]
pub struct LoopDetector {
    time_limit: Duration,
    error_repeat_window: usize,
    detect_oscillation: bool,
}

impl LoopDetector {
    pub fn new(time_limit: Duration) -> Self {
        Self::with_config(time_limit, &LoopDetectionConfig::default())
    }

    pub fn with_config(time_limit: Duration, config: &LoopDetectionConfig) -> Self {
        Self {
            time_limit,
            error_repeat_window: config.error_repeat_window.max(2),
            detect_oscillation: config.detect_oscillation,
        }
    }

    pub fn for_task(task: &Task, config: &LoopDetectionConfig) -> Self {
        Self::with_config(task.time_limit, config)
    }

    /// Check the history against the wall clock.
    pub fn check(&self, history: &[Attempt]) -> Option<LoopSignal> {
        self.check_at(history, Utc::now())
    }

    /// Check the history as of `now`.
    pub fn check_at(&self, history: &[Attempt], now: DateTime<Utc>) -> Option<LoopSignal> {
        let last = history.last()?;

        if let Some(signal) = self.exact_repeat(history) {
            return Some(signal);
        }
        if let Some(signal) = self.error_repeat(history) {
            return Some(signal);
        }
        if self.detect_oscillation {
            if let Some(signal) = self.oscillation(history) {
                return Some(signal);
            }
        }

        let first = history.first()?;
        let elapsed = (now - first.timestamp).to_std().unwrap_or_default();
        if elapsed > self.time_limit {
            return Some(LoopSignal {
                kind: LoopKind::WallClockTimeout,
                confidence: 1.0,
                description: format!(
                    "{}ms since first attempt exceeds limit of {}ms",
                    elapsed.as_millis(),
                    self.time_limit.as_millis()
                ),
                at_attempt: last.number,
            });
        }

        None
    }

    fn exact_repeat(&self, history: &[Attempt]) -> Option<LoopSignal> {
        let [.., prev, last] = history else {
            return None;
        };
        if prev.has_response() && last.has_response() && prev.response_text == last.response_text
        {
            return Some(LoopSignal {
                kind: LoopKind::ExactRepeat,
                confidence: 1.0,
                description: format!(
                    "attempts {} and {} returned identical responses",
                    prev.number, last.number
                ),
                at_attempt: last.number,
            });
        }
        None
    }

    fn error_repeat(&self, history: &[Attempt]) -> Option<LoopSignal> {
        let window = self.error_repeat_window;
        if history.len() < window {
            return None;
        }
        let recent = &history[history.len() - window..];
        let first = error_signature(&recent[0])?;
        for attempt in &recent[1..] {
            if error_signature(attempt)? != first {
                return None;
            }
        }

        let last = recent.last()?;
        Some(LoopSignal {
            kind: LoopKind::ErrorRepeat,
            confidence: 0.95,
            description: format!(
                "same error reported by last {} attempts: {}",
                window,
                first.into_iter().collect::<Vec<_>>().join("; ")
            ),
            at_attempt: last.number,
        })
    }

    fn oscillation(&self, history: &[Attempt]) -> Option<LoopSignal> {
        let [.., a, b, c] = history else {
            return None;
        };
        if !(a.has_response() && b.has_response() && c.has_response()) {
            return None;
        }
        if c.response_text == a.response_text && c.response_text != b.response_text {
            return Some(LoopSignal {
                kind: LoopKind::Oscillation,
                confidence: 0.90,
                description: format!(
                    "attempt {} repeats attempt {} after a different attempt {}",
                    c.number, a.number, b.number
                ),
                at_attempt: c.number,
            });
        }
        None
    }
}

/// Strip volatile details (timestamps, paths, positions, addresses) so the
/// same underlying error compares equal across attempts.
pub fn normalize_issue(issue: &str) -> String {
    let s = TIMESTAMP_PATTERN.replace_all(issue, "<ts>");
    let s = CLOCK_PATTERN.replace_all(&s, "<ts>");
    let s = PATH_PATTERN.replace_all(&s, "<path>");
    let s = FILE_PATTERN.replace_all(&s, "<path>");
    let s = LINE_PATTERN.replace_all(&s, "$1 <n>");
    let s = POSITION_PATTERN.replace_all(&s, ":<n>");
    let s = HEX_PATTERN.replace_all(&s, "<addr>");
    let s = WHITESPACE_PATTERN.replace_all(&s, " ");
    s.trim().to_lowercase()
}

/// Normalized issue set of an attempt; `None` when it reported nothing.
fn error_signature(attempt: &Attempt) -> Option<BTreeSet<String>> {
    let set: BTreeSet<String> = attempt
        .issues
        .iter()
        .map(|i| normalize_issue(i))
        .filter(|i| !i.is_empty())
        .collect();
    if set.is_empty() {
        None
    } else {
        Some(set)
    }
}
