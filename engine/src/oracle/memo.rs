//! Memoized oracle wrapper.
//!
//! Caches successful evaluations keyed by a blake3 digest of everything the
//! oracle sees, so an identical (task, response, executor) triple always gets
//! the same verdict. A hit is billed at the cost recorded for the original
//! evaluation, so caching never changes what a task pays.
//!
//! One memo belongs to one task run; the service builds a fresh one per
//! controller and it is dropped with the run.

use super::{Evaluation, EvaluationRequest, QualityOracle};
use crate::error::EvaluationError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct MemoizedOracle {
    inner: Arc<dyn QualityOracle>,
    cache: RwLock<HashMap<[u8; 32], Evaluation>>,
}

impl MemoizedOracle {
    pub fn new(inner: Arc<dyn QualityOracle>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    fn key(request: &EvaluationRequest<'_>) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        let mut field = |bytes: &[u8]| {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        field(request.task.id.as_bytes());
        field(request.task.description.as_bytes());
        for note in &request.task.context {
            field(note.as_bytes());
        }
        field(request.response.as_bytes());
        field(request.executor.to_string().as_bytes());
        field(&request.threshold.to_bits().to_le_bytes());
        field(&(request.highest_tier as u64).to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}

#[async_trait]
impl QualityOracle for MemoizedOracle {
    async fn evaluate(&self, request: EvaluationRequest<'_>) -> Result<Evaluation, EvaluationError> {
        let key = Self::key(&request);
        if let Some(hit) = self.cache.read().await.get(&key) {
            tracing::trace!(executor = %request.executor, "oracle cache hit");
            return Ok(hit.clone());
        }

        let evaluation = self.inner.evaluate(request).await?;
        self.cache
            .write()
            .await
            .entry(key)
            .or_insert_with(|| evaluation.clone());
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{QualityAssessment, ScriptedOracle};
    use crate::task::Task;
    use crate::tier::ExecutorRef;

    fn tier0() -> ExecutorRef {
        ExecutorRef::Tier {
            index: 0,
            name: "small".to_string(),
        }
    }

    #[tokio::test]
    async fn test_identical_requests_hit_cache() {
        let inner = Arc::new(
            ScriptedOracle::new()
                .assessment(QualityAssessment::new(3.0, 0.6).needing_escalation())
                .assessment(QualityAssessment::new(9.0, 0.9))
                .with_cost(0.01),
        );
        let oracle = MemoizedOracle::new(inner.clone());
        let task = Task::new("Explain borrowck");
        let executor = tier0();
        let request = EvaluationRequest {
            task: &task,
            response: "it checks borrows",
            executor: &executor,
            highest_tier: 1,
            threshold: 6.0,
        };

        let first = oracle.evaluate(request).await.unwrap();
        let second = oracle.evaluate(request).await.unwrap();
        assert_eq!(first.assessment, second.assessment);
        assert!(second.assessment.needs_escalation);
        assert_eq!(first.cost, 0.01);
        assert_eq!(second.cost, 0.01);
        assert_eq!(inner.calls(), 1);

        let other = EvaluationRequest {
            response: "a different answer",
            ..request
        };
        let third = oracle.evaluate(other).await.unwrap();
        assert_eq!(third.assessment.score, 9.0);
        assert_eq!(oracle.len().await, 2);
    }

    #[tokio::test]
    async fn test_tasks_do_not_share_entries() {
        let inner = Arc::new(ScriptedOracle::new().repeat_score(4.0).with_cost(0.005));
        let oracle = MemoizedOracle::new(inner.clone());
        let first = Task::new("Explain borrowck").with_id("a");
        let second = Task::new("Explain borrowck").with_id("b");
        let executor = tier0();

        for task in [&first, &second] {
            let request = EvaluationRequest {
                task,
                response: "it checks borrows",
                executor: &executor,
                highest_tier: 1,
                threshold: 6.0,
            };
            assert_eq!(oracle.evaluate(request).await.unwrap().cost, 0.005);
        }
        assert_eq!(inner.calls(), 2);
        assert_eq!(oracle.len().await, 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let inner = Arc::new(
            ScriptedOracle::new()
                .fail(EvaluationError::Unavailable("down".to_string()))
                .score(7.0),
        );
        let oracle = MemoizedOracle::new(inner.clone());
        let task = Task::new("t");
        let executor = tier0();
        let request = EvaluationRequest {
            task: &task,
            response: "r",
            executor: &executor,
            highest_tier: 1,
            threshold: 6.0,
        };

        assert!(oracle.evaluate(request).await.is_err());
        assert_eq!(oracle.evaluate(request).await.unwrap().assessment.score, 7.0);
        assert_eq!(inner.calls(), 2);
        assert!(!oracle.is_empty().await);
    }
}
