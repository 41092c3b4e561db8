//! Audit Log — append-only record of every attempt, escalation and outcome
//!
//! The controller emits one [`AuditEntry`] per event. Writes are serialized
//! per task; different tasks never contend. A persisted trail can be folded
//! back into an [`EscalationHistory`] for replay and debugging.

pub mod jsonl;

use crate::error::{AuditError, FailureReason};
use crate::escalation::state::{Attempt, EscalationHistory, EscalationRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

pub use jsonl::JsonlAuditLog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEntry {
    Attempt {
        task_id: String,
        attempt: Attempt,
    },
    Escalation {
        task_id: String,
        record: EscalationRecord,
    },
    Outcome {
        task_id: String,
        success: bool,
        total_cost: f64,
        total_attempts: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure_reason: Option<FailureReason>,
    },
}

impl AuditEntry {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Attempt { task_id, .. }
            | Self::Escalation { task_id, .. }
            | Self::Outcome { task_id, .. } => task_id,
        }
    }
}

/// Rebuild a history from a task's audit entries, in order.
pub fn replay<'a>(entries: impl IntoIterator<Item = &'a AuditEntry>) -> EscalationHistory {
    let mut history = EscalationHistory::new();
    for entry in entries {
        match entry {
            AuditEntry::Attempt { attempt, .. } => history.push(attempt.clone()),
            AuditEntry::Escalation { record, .. } => history.escalations.push(record.clone()),
            AuditEntry::Outcome { .. } => {}
        }
    }
    history
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// In-memory sink, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn entries_for(&self, task_id: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.task_id() == task_id)
            .collect()
    }

    pub fn history(&self, task_id: &str) -> EscalationHistory {
        replay(&self.entries_for(task_id))
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}
