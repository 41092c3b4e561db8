//! Scripted oracle for deterministic runs and tests.

use super::{Evaluation, EvaluationRequest, QualityAssessment, QualityOracle};
use crate::error::EvaluationError;
use crate::tier::ExecutorRef;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone)]
enum Step {
    /// Bare score; escalation is needed when it misses the request threshold
    Score(f64),
    Assessment(QualityAssessment),
    Fail(EvaluationError),
}

/// Plays back queued verdicts in order, then the fallback.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Step>>,
    fallback: Option<Step>,
    cost: f64,
    calls: AtomicU32,
    seen: Mutex<Vec<ExecutorRef>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            cost: 0.0,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn score(self, score: f64) -> Self {
        self.push(Step::Score(score))
    }

    pub fn assessment(self, assessment: QualityAssessment) -> Self {
        self.push(Step::Assessment(assessment))
    }

    pub fn fail(self, error: EvaluationError) -> Self {
        self.push(Step::Fail(error))
    }

    /// Score returned once the queue runs dry.
    pub fn repeat_score(mut self, score: f64) -> Self {
        self.fallback = Some(Step::Score(score));
        self
    }

    /// Cost charged for every evaluation.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Executors whose responses were evaluated, in order.
    pub fn evaluated(&self) -> Vec<ExecutorRef> {
        self.seen
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

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QualityOracle for ScriptedOracle {
    async fn evaluate(&self, request: EvaluationRequest<'_>) -> Result<Evaluation, EvaluationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.executor.clone());

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let assessment = match next.or_else(|| self.fallback.clone()) {
            Some(Step::Score(score)) => {
                let mut a = QualityAssessment::new(score, 0.8)
                    .with_reasoning(format!("scripted score {score:.1}"));
                a.needs_escalation = score < request.threshold;
                a
            }
            Some(Step::Assessment(a)) => a,
            Some(Step::Fail(err)) => return Err(err),
            None => {
                return Err(EvaluationError::Unavailable(
                    "scripted oracle exhausted".to_string(),
                ))
            }
        };
        Ok(Evaluation::new(assessment, self.cost))
    }
}
