//! Oracle contract enforcement.
//!
//! Whatever an oracle returns is passed through [`enforce_contract`] before
//! the controller looks at it. Violations are repaired (clamped or dropped)
//! and reported so the caller can log them.

use super::QualityAssessment;
use crate::tier::ExecutorRef;

/// Repair an assessment so it satisfies the oracle contract.
///
/// Returns the repaired assessment and one message per violation.
pub fn enforce_contract(
    mut assessment: QualityAssessment,
    executor: &ExecutorRef,
    highest_tier: usize,
) -> (QualityAssessment, Vec<String>) {
    let mut violations = Vec::new();

    if !(0.0..=10.0).contains(&assessment.score) {
        violations.push(format!("score {} outside 0-10", assessment.score));
        assessment.score = if assessment.score.is_nan() {
            0.0
        } else {
            assessment.score.clamp(0.0, 10.0)
        };
    }

    if !(0.0..=1.0).contains(&assessment.confidence) {
        violations.push(format!("confidence {} outside 0-1", assessment.confidence));
        assessment.confidence = if assessment.confidence.is_nan() {
            0.0
        } else {
            assessment.confidence.clamp(0.0, 1.0)
        };
    }

    if let Some(target) = assessment.suggested_tier {
        let valid = match executor.tier_index() {
            Some(current) => target > current && target <= highest_tier,
            None => false,
        };
        if !valid {
            violations.push(format!(
                "suggested tier {} is not a later tier than {}",
                target, executor
            ));
            assessment.suggested_tier = None;
        }
    }

    if let Some(name) = &assessment.suggested_specialist {
        let at_top = executor.tier_index() == Some(highest_tier);
        if name.trim().is_empty() || !at_top {
            violations.push(format!(
                "specialist suggestion '{}' not allowed from {}",
                name, executor
            ));
            assessment.suggested_specialist = None;
        }
    }

    (assessment, violations)
}
