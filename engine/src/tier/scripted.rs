//! Scripted executor for deterministic runs and tests.
//!
//! Plays back a queue of outputs (or failures) in order. Once the queue is
//! empty the optional fallback is repeated; without one the tier reports
//! itself unavailable.

use super::{CapabilityTier, TierOutput};
use crate::error::ExecutionError;
use crate::escalation::state::Attempt;
use crate::task::Task;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

type Step = Result<TierOutput, ExecutionError>;

pub struct ScriptedTier {
    name: String,
    script: Mutex<VecDeque<Step>>,
    fallback: Option<Step>,
    delay: Option<Duration>,
    calls: AtomicU32,
    last_task: Mutex<Option<Task>>,
}

impl ScriptedTier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            delay: None,
            calls: AtomicU32::new(0),
            last_task: Mutex::new(None),
        }
    }

    /// Queue a successful response.
    pub fn respond(self, response: impl Into<String>, cost: f64) -> Self {
        self.push(Ok(TierOutput::new(response, cost)))
    }

    /// Queue a capability failure.
    pub fn fail(self, error: ExecutionError) -> Self {
        self.push(Err(error))
    }

    /// Response repeated once the queue runs dry.
    pub fn repeat(mut self, response: impl Into<String>, cost: f64) -> Self {
        self.fallback = Some(Ok(TierOutput::new(response, cost)));
        self
    }

    /// Sleep before answering (uses tokio time, so paused clocks advance it).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of times `execute` was called.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The task as seen by the most recent call.
    pub fn last_task(&self) -> Option<Task> {
        self.last_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(self, step: Step) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }
}

#[async_trait]
impl CapabilityTier for ScriptedTier {
    async fn execute(&self, task: &Task, _history: &[Attempt]) -> Result<TierOutput, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match next.or_else(|| self.fallback.clone()) {
            Some(step) => step,
            None => Err(ExecutionError::Unavailable(format!(
                "{}: script exhausted",
                self.name
            ))),
        }
    }
}
