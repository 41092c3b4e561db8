//! Escalation Controller — drives one task to a terminal result
//!
//! One controller per task. Inside a run every step is awaited in order:
//! execute → charge → evaluate → charge → loop check → decide. Budget, time
//! and attempt limits are checked before each execution and again after it,
//! and a run that hits any of them returns the best attempt seen so far.

use crate::audit::{AuditEntry, AuditSink};
use crate::config::LoopDetectionConfig;
use crate::error::FailureReason;
use crate::escalation::friction::FrictionDetector;
use crate::escalation::loop_detector::LoopDetector;
use crate::escalation::policy::{Decision, DecisionInput, EscalationPolicy};
use crate::escalation::state::{
    Attempt, AttemptOutcome, ControllerState, EscalationHistory, EscalationReason,
    EscalationResult,
};
use crate::oracle::{enforce_contract, EvaluationRequest, QualityAssessment, QualityOracle};
use crate::specialist::{SpecialistProfile, SpecialistRegistry};
use crate::task::Task;
use crate::telemetry;
use crate::tier::{CapabilityTier, ExecutorRef, TierLadder};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Where the controller currently is on the ladder.
struct Cursor {
    executor_ref: ExecutorRef,
    executor: Arc<dyn CapabilityTier>,
    attempts_here: u32,
    /// Task as handed to the executor; specialist retries carry extra context
    task: Task,
}

impl Cursor {
    fn tier(ladder: &TierLadder, index: usize, task: &Task) -> Option<Self> {
        let spec = ladder.get(index)?;
        Some(Self {
            executor_ref: ladder.executor_ref(index)?,
            executor: spec.executor().clone(),
            attempts_here: 0,
            task: task.clone(),
        })
    }

    fn specialist(profile: &SpecialistProfile, task: &Task) -> Self {
        Self {
            executor_ref: profile.executor_ref(),
            executor: profile.executor().clone(),
            attempts_here: 0,
            task: task.clone(),
        }
    }
}

pub struct EscalationController {
    task: Task,
    ladder: Arc<TierLadder>,
    oracle: Arc<dyn QualityOracle>,
    specialists: Arc<SpecialistRegistry>,
    audit: Option<Arc<dyn AuditSink>>,
    policy: EscalationPolicy,
    detector: LoopDetector,
    state: ControllerState,
}

impl EscalationController {
    pub fn new(
        task: Task,
        ladder: Arc<TierLadder>,
        oracle: Arc<dyn QualityOracle>,
        specialists: Arc<SpecialistRegistry>,
    ) -> Self {
        let detector = LoopDetector::for_task(&task, &LoopDetectionConfig::default());
        Self {
            task,
            ladder,
            oracle,
            specialists,
            audit: None,
            policy: EscalationPolicy::default(),
            detector,
            state: ControllerState::Ready,
        }
    }

    pub fn with_policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_loop_detection(mut self, config: &LoopDetectionConfig) -> Self {
        self.detector = LoopDetector::for_task(&self.task, config);
        self
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Run the task to completion. Consumes the controller, so a task
    /// reaches its terminal result exactly once.
    pub async fn run(self) -> EscalationResult {
        let span = tracing::info_span!("escalation", task_id = %self.task.id);
        self.drive().instrument(span).await
    }

    async fn drive(mut self) -> EscalationResult {
        let started = Instant::now();
        let started_utc = Utc::now();
        let now = || started_utc + to_chrono(started.elapsed());

        let budget = self.task.budget_limit;
        let time_limit = self.task.time_limit;
        let highest = self.ladder.highest_index();

        let mut history = EscalationHistory::new();
        let mut total_cost = 0.0_f64;

        let Some(mut cursor) = Cursor::tier(&self.ladder, 0, &self.task) else {
            let reason = FailureReason::AllTiersExhausted {
                last_executor: "none".to_string(),
            };
            return self.finish(history, total_cost, Some(reason)).await;
        };

        info!(
            severity = %self.task.severity,
            tiers = ?self.ladder.names(),
            threshold = self.task.quality_threshold,
            budget,
            "escalation started"
        );

        let failure = loop {
            let attempts = history.len() as u32;
            if attempts >= self.task.max_attempts_total {
                break Some(FailureReason::AttemptLimitReached { attempts });
            }
            let elapsed = started.elapsed();
            if elapsed >= time_limit {
                break Some(timeout(elapsed, time_limit));
            }
            if total_cost >= budget {
                break Some(FailureReason::BudgetExhausted {
                    spent: total_cost,
                    limit: budget,
                });
            }

            self.transition(ControllerState::Attempting(cursor.executor_ref.clone()));
            let number = attempts + 1;
            let attempt_started = now();
            let clock = Instant::now();
            let executed = cursor
                .executor
                .execute(&cursor.task, &history.attempts)
                .await;
            cursor.attempts_here += 1;

            let (assessment, attempt) = match executed {
                Err(err) => {
                    warn!(
                        attempt = number,
                        executor = %cursor.executor_ref,
                        error = %err,
                        "executor failed"
                    );
                    let assessment = QualityAssessment::new(0.0, 0.0)
                        .with_issue(err.to_string())
                        .needing_escalation()
                        .with_reasoning("executor produced no response");
                    let attempt = AttemptBuilder {
                        number,
                        executor: &cursor.executor_ref,
                        started: attempt_started,
                        duration: clock.elapsed(),
                    }
                    .build(
                        String::new(),
                        0.0,
                        0.0,
                        &assessment,
                        AttemptOutcome::ExecutionFailed,
                    );
                    (assessment, attempt)
                }
                Ok(output) => {
                    let builder = AttemptBuilder {
                        number,
                        executor: &cursor.executor_ref,
                        started: attempt_started,
                        duration: clock.elapsed(),
                    };

                    let remaining = (budget - total_cost).max(0.0);
                    let cost = sanitize_cost(output.cost);
                    if cost > remaining {
                        total_cost = budget;
                        let assessment = QualityAssessment::new(0.0, 0.0)
                            .with_issue("budget exhausted before evaluation")
                            .needing_escalation();
                        let attempt = builder.build(
                            output.response,
                            remaining,
                            0.0,
                            &assessment,
                            AttemptOutcome::Unevaluated,
                        );
                        self.record(&mut history, attempt).await;
                        break Some(FailureReason::BudgetExhausted {
                            spent: total_cost,
                            limit: budget,
                        });
                    }
                    total_cost += cost;

                    let elapsed = started.elapsed();
                    if elapsed >= time_limit {
                        let assessment = QualityAssessment::new(0.0, 0.0)
                            .with_issue("time limit reached before evaluation")
                            .needing_escalation();
                        let attempt = builder.build(
                            output.response,
                            cost,
                            0.0,
                            &assessment,
                            AttemptOutcome::Unevaluated,
                        );
                        self.record(&mut history, attempt).await;
                        break Some(timeout(elapsed, time_limit));
                    }

                    self.transition(ControllerState::Evaluating);
                    let (assessment, eval_cost, outcome) =
                        self.evaluate(&cursor, &output.response, highest).await;

                    let remaining = (budget - total_cost).max(0.0);
                    let charged = if eval_cost > remaining {
                        total_cost = budget;
                        remaining
                    } else {
                        total_cost += eval_cost;
                        eval_cost
                    };

                    let attempt = AttemptBuilder {
                        duration: clock.elapsed(),
                        ..builder
                    }
                    .build(output.response, cost, charged, &assessment, outcome);
                    (assessment, attempt)
                }
            };

            debug!(
                attempt = number,
                executor = %cursor.executor_ref,
                score = assessment.score,
                cost = attempt.total_cost(),
                total_cost,
                "attempt recorded"
            );
            self.record(&mut history, attempt).await;

            let signal = self.detector.check_at(&history.attempts, now());
            if let Some(signal) = &signal {
                warn!(
                    kind = %signal.kind,
                    confidence = signal.confidence,
                    attempt = number,
                    "{}",
                    signal.description
                );
            }

            let decision = self.policy.decide(&DecisionInput {
                assessment: &assessment,
                executor: &cursor.executor_ref,
                attempts_here: cursor.attempts_here,
                loop_signal: signal.as_ref(),
                highest_tier: highest,
                threshold: self.task.quality_threshold,
                max_tier_attempts: self.task.max_tier_attempts,
                elapsed: started.elapsed(),
                time_limit,
            });

            if !matches!(decision, Decision::Accept) && total_cost >= budget {
                break Some(FailureReason::BudgetExhausted {
                    spent: total_cost,
                    limit: budget,
                });
            }

            match decision {
                Decision::Accept => {
                    self.transition(ControllerState::Accepted);
                    break None;
                }
                Decision::Abort(reason) => break Some(reason),
                Decision::Retry { expand_context } => {
                    if expand_context {
                        cursor.task = self.task.with_context(history.collected_issues());
                    }
                    debug!(
                        executor = %cursor.executor_ref,
                        attempts_here = cursor.attempts_here,
                        expand_context,
                        "retrying"
                    );
                }
                Decision::EscalateTier { target, reason } => {
                    let Some(next) = Cursor::tier(&self.ladder, target, &self.task) else {
                        break Some(FailureReason::AllTiersExhausted {
                            last_executor: cursor.executor_ref.to_string(),
                        });
                    };
                    self.transition(ControllerState::EscalateTier(target));
                    self.escalate(&mut history, &cursor, &next, reason).await;
                    cursor = next;
                }
                Decision::EscalateSpecialist { suggested, reason } => {
                    let Some(profile) = self.specialists.select(suggested.as_deref(), &self.task)
                    else {
                        warn!(suggested = ?suggested, "no specialist available");
                        break Some(FailureReason::AllTiersExhausted {
                            last_executor: cursor.executor_ref.to_string(),
                        });
                    };
                    self.transition(ControllerState::EscalateSpecialist(profile.name.clone()));
                    let next = Cursor::specialist(&profile, &self.task);
                    self.escalate(&mut history, &cursor, &next, reason).await;
                    cursor = next;
                }
            }
        };

        self.finish(history, total_cost, failure).await
    }

    /// Ask the oracle, falling back to a conservative verdict on failure.
    async fn evaluate(
        &self,
        cursor: &Cursor,
        response: &str,
        highest: usize,
    ) -> (QualityAssessment, f64, AttemptOutcome) {
        let request = EvaluationRequest {
            task: &cursor.task,
            response,
            executor: &cursor.executor_ref,
            highest_tier: highest,
            threshold: self.task.quality_threshold,
        };

        match self.oracle.evaluate(request).await {
            Ok(evaluation) => {
                let (assessment, violations) =
                    enforce_contract(evaluation.assessment, &cursor.executor_ref, highest);
                for violation in &violations {
                    warn!(executor = %cursor.executor_ref, "oracle contract violation: {violation}");
                }
                (
                    assessment,
                    sanitize_cost(evaluation.cost),
                    AttemptOutcome::Evaluated,
                )
            }
            Err(err) => {
                warn!(executor = %cursor.executor_ref, error = %err, "oracle failed, assuming escalation is needed");
                let mut assessment = QualityAssessment::conservative(format!("evaluation failed: {err}"));
                if let Some(index) = cursor.executor_ref.tier_index().filter(|i| *i < highest) {
                    assessment = assessment.suggest_tier(index + 1);
                }
                (assessment, 0.0, AttemptOutcome::EvaluationFailed)
            }
        }
    }

    async fn record(&self, history: &mut EscalationHistory, attempt: Attempt) {
        if let Some(sink) = &self.audit {
            let entry = AuditEntry::Attempt {
                task_id: self.task.id.clone(),
                attempt: attempt.clone(),
            };
            if let Err(e) = sink.append(&entry).await {
                warn!(error = %e, "audit write failed");
            }
        }
        history.push(attempt);
    }

    async fn escalate(
        &self,
        history: &mut EscalationHistory,
        from: &Cursor,
        to: &Cursor,
        reason: EscalationReason,
    ) {
        info!(
            from = %from.executor_ref,
            to = %to.executor_ref,
            reason = %reason,
            "escalating"
        );
        history.record_escalation(from.executor_ref.clone(), to.executor_ref.clone(), reason);

        if let (Some(sink), Some(record)) = (&self.audit, history.escalations.last()) {
            let entry = AuditEntry::Escalation {
                task_id: self.task.id.clone(),
                record: record.clone(),
            };
            if let Err(e) = sink.append(&entry).await {
                warn!(error = %e, "audit write failed");
            }
        }
    }

    async fn finish(
        mut self,
        history: EscalationHistory,
        total_cost: f64,
        failure: Option<FailureReason>,
    ) -> EscalationResult {
        let final_attempt = match failure {
            None => history.last(),
            Some(_) => history.best_attempt(),
        };
        let final_response = final_attempt.map(|a| a.response_text.clone());
        let final_executor = final_attempt.map(|a| a.executor.clone());

        if let Some(reason) = &failure {
            self.transition(ControllerState::Abort(reason.clone()));
        }

        let total_attempts = history.len() as u32;
        let friction = FrictionDetector::detect(&history, &self.task);
        let result = EscalationResult {
            task_id: self.task.id.clone(),
            success: failure.is_none(),
            final_response,
            final_executor,
            total_cost,
            total_attempts,
            escalated: total_attempts > 1,
            history,
            failure_reason: failure,
            friction,
        };

        if let Some(sink) = &self.audit {
            let entry = AuditEntry::Outcome {
                task_id: result.task_id.clone(),
                success: result.success,
                total_cost: result.total_cost,
                total_attempts: result.total_attempts,
                failure_reason: result.failure_reason.clone(),
            };
            if let Err(e) = sink.append(&entry).await {
                warn!(error = %e, "audit write failed");
            }
        }

        telemetry::log_result(&result);
        result
    }

    fn transition(&mut self, next: ControllerState) {
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}

struct AttemptBuilder<'a> {
    number: u32,
    executor: &'a ExecutorRef,
    started: DateTime<Utc>,
    duration: Duration,
}

impl AttemptBuilder<'_> {
    fn build(
        &self,
        response_text: String,
        execution_cost: f64,
        evaluation_cost: f64,
        assessment: &QualityAssessment,
        outcome: AttemptOutcome,
    ) -> Attempt {
        Attempt {
            number: self.number,
            executor: self.executor.clone(),
            response_text,
            execution_cost,
            evaluation_cost,
            quality_score: assessment.score,
            quality_confidence: assessment.confidence,
            issues: assessment.issues.clone(),
            strengths: assessment.strengths.clone(),
            needs_escalation: assessment.needs_escalation,
            reasoning: assessment.reasoning.clone(),
            outcome,
            timestamp: self.started,
            duration_ms: self.duration.as_millis() as u64,
        }
    }
}

/// Negative or non-finite costs are charged as zero.
fn sanitize_cost(cost: f64) -> f64 {
    if cost.is_finite() && cost > 0.0 {
        cost
    } else {
        0.0
    }
}

fn timeout(elapsed: Duration, limit: Duration) -> FailureReason {
    FailureReason::TimeoutExceeded {
        elapsed_ms: elapsed.as_millis() as u64,
        limit_ms: limit.as_millis() as u64,
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}
