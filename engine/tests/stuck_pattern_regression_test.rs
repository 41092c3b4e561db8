//! Regression tests for stuck patterns in the escalation controller
//!
//! Validates that non-converging attempt sequences at a lower tier are cut
//! short by the loop detector: repeated errors, A → B → A oscillation,
//! and that varied errors or disabled rules fall back to the tier cap.

use std::sync::Arc;

use tiered_escalation::{
    EscalationController, EscalationReason, ExecutionError, LoopDetectionConfig, LoopKind,
    ScriptedOracle, ScriptedTier, SpecialistRegistry, Task, TierLadder, TierSpec,
};

fn ladder(tier0: ScriptedTier) -> Arc<TierLadder> {
    TierLadder::new(vec![
        TierSpec::new("tier0", 1.0, Arc::new(tier0)),
        TierSpec::new(
            "tier1",
            5.0,
            Arc::new(ScriptedTier::new("tier1").repeat("resolved answer", 0.01)),
        ),
    ])
    .unwrap()
    .shared()
}

fn controller(tier0: ScriptedTier, oracle: ScriptedOracle, max_tier_attempts: u32) -> EscalationController {
    EscalationController::new(
        Task::new("Fix the build").with_max_tier_attempts(max_tier_attempts),
        ladder(tier0),
        Arc::new(oracle),
        SpecialistRegistry::new(5.0).shared(),
    )
}

fn failed(message: &str) -> ExecutionError {
    ExecutionError::Failed(message.to_string())
}

/// Same failure at shifting file positions escalates before the tier cap
#[tokio::test]
async fn test_repeated_error_escalates_early() {
    let tier0 = ScriptedTier::new("tier0")
        .fail(failed("undefined symbol `parse` at src/lexer.rs:10:4"))
        .fail(failed("undefined symbol `parse` at src/parser.rs:88:12"))
        .fail(failed("undefined symbol `parse` at src/lib.rs:3:1"));
    let oracle = ScriptedOracle::new().repeat_score(8.0);

    let result = controller(tier0, oracle, 5).run().await;

    assert!(result.success);
    assert_eq!(result.total_attempts, 4);
    assert_eq!(result.final_tier(), Some("tier1"));
    assert!(matches!(
        result.history.escalations[0].reason,
        EscalationReason::LoopDetected {
            kind: LoopKind::ErrorRepeat,
            ..
        }
    ));
    assert_eq!(result.history.escalations[0].at_attempt, 3);
}

/// A → B → A responses are treated as a loop
#[tokio::test]
async fn test_oscillation_escalates_early() {
    let tier0 = ScriptedTier::new("tier0")
        .respond("approach A", 0.001)
        .respond("approach B", 0.001)
        .respond("approach A", 0.001);
    let oracle = ScriptedOracle::new()
        .score(3.0)
        .score(3.5)
        .score(3.0)
        .score(8.0);

    let result = controller(tier0, oracle, 5).run().await;

    assert!(result.success);
    assert_eq!(result.total_attempts, 4);
    assert!(matches!(
        result.history.escalations[0].reason,
        EscalationReason::LoopDetected {
            kind: LoopKind::Oscillation,
            ..
        }
    ));
}

/// Distinct errors are not a loop; the tier cap decides instead
#[tokio::test]
async fn test_varied_errors_run_to_tier_cap() {
    let tier0 = ScriptedTier::new("tier0")
        .fail(failed("parse error"))
        .fail(failed("type mismatch"))
        .fail(failed("missing import"));
    let oracle = ScriptedOracle::new().repeat_score(8.0);

    let result = controller(tier0, oracle, 3).run().await;

    assert!(result.success);
    assert_eq!(result.total_attempts, 4);
    assert!(matches!(
        result.history.escalations[0].reason,
        EscalationReason::TierExhausted { attempts: 3, .. }
    ));
}

/// With oscillation detection off, A → B → A only escalates at the cap
#[tokio::test]
async fn test_oscillation_rule_can_be_disabled() {
    let tier0 = ScriptedTier::new("tier0")
        .respond("approach A", 0.001)
        .respond("approach B", 0.001)
        .respond("approach A", 0.001)
        .respond("approach C", 0.001);
    let oracle = ScriptedOracle::new().repeat_score(3.0);
    let config = LoopDetectionConfig {
        detect_oscillation: false,
        ..LoopDetectionConfig::default()
    };

    let result = controller(tier0, oracle, 4)
        .with_loop_detection(&config)
        .run()
        .await;

    let first_escalation = &result.history.escalations[0];
    assert_eq!(first_escalation.at_attempt, 4);
    assert!(matches!(
        first_escalation.reason,
        EscalationReason::TierExhausted { attempts: 4, .. }
    ));
}
