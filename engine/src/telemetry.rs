//! Tracing setup and run summaries.

use crate::escalation::state::EscalationResult;
use tracing::{info, warn};

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`, defaulting to
/// `tiered_escalation=info`. Safe to call more than once.
pub fn init_tracing() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "tiered_escalation=info".parse() {
        filter = filter.add_directive(directive);
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Emit one structured line describing a finished task.
pub fn log_result(result: &EscalationResult) {
    let executor = result
        .final_executor
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".to_string());

    if result.success {
        info!(
            task_id = %result.task_id,
            executor = %executor,
            attempts = result.total_attempts,
            cost = result.total_cost,
            escalated = result.escalated,
            "task accepted"
        );
    } else {
        warn!(
            task_id = %result.task_id,
            executor = %executor,
            attempts = result.total_attempts,
            cost = result.total_cost,
            reason = %result
                .failure_reason
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            friction = result.friction.len(),
            "task failed"
        );
    }
}
