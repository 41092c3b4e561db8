//! Tiered Escalation Engine
//!
//! Decides, for one unit of work, which cost tier should attempt it, whether
//! the produced response clears the quality gate, and when to escalate to a
//! more capable tier or a terminal specialist.
//!
//! # Components
//!
//! - [`tier`]: cost-ordered executors ([`CapabilityTier`]) and the validated
//!   [`TierLadder`]
//! - [`oracle`]: the [`QualityOracle`] contract, contract enforcement, a
//!   heuristic default scorer and a memoizing wrapper
//! - [`escalation`]: loop detection, the decision policy and the
//!   [`EscalationController`] state machine
//! - [`specialist`]: append-only [`SpecialistRegistry`] with tag-based
//!   selection and runtime spawning
//! - [`audit`]: per-task JSONL audit trail that replays into a history
//! - [`service`]: [`EscalationService`] for single and batch submission
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tiered_escalation::{
//!     EscalationService, HeuristicOracle, ScriptedTier, TierLadder, TierSpec,
//! };
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let ladder = TierLadder::new(vec![
//!     TierSpec::new("small", 1.0, Arc::new(ScriptedTier::new("small").repeat("draft", 0.001))),
//!     TierSpec::new("large", 8.0, Arc::new(ScriptedTier::new("large").repeat("answer", 0.01))),
//! ])?;
//! let service = EscalationService::builder(ladder, Arc::new(HeuristicOracle::default())).build()?;
//!
//! let result = service.submit(service.task("Explain TCP slow start")).await;
//! println!("{} after {} attempts", result.success, result.total_attempts);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod escalation;
pub mod oracle;
pub mod service;
pub mod specialist;
pub mod task;
pub mod telemetry;
pub mod tier;

pub use audit::{AuditEntry, AuditSink, JsonlAuditLog, MemoryAuditLog};
pub use config::{EngineConfig, LoopDetectionConfig, SpecialistConfig, TaskDefaults};
pub use error::{
    AuditError, ConfigError, EngineError, EngineResult, EvaluationError, ExecutionError,
    FailureReason, LadderError, RegistryError,
};
pub use escalation::{
    Attempt, AttemptOutcome, EscalationController, EscalationHistory, EscalationPolicy,
    EscalationReason, EscalationResult, LoopDetector, LoopKind, LoopSignal, RunHeuristics,
};
pub use oracle::{
    Evaluation, EvaluationRequest, HeuristicConfig, HeuristicOracle, MemoizedOracle,
    QualityAssessment, QualityOracle, ScriptedOracle,
};
pub use service::{EscalationService, EscalationServiceBuilder};
pub use specialist::{SpecialistFactory, SpecialistProfile, SpecialistRegistry};
pub use task::{Severity, Task};
pub use tier::{CapabilityTier, ExecutorRef, ScriptedTier, TierLadder, TierOutput, TierSpec};
