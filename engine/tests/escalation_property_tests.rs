//! Escalation property tests — generated runs over scripted tiers and
//! oracles, checking invariants that must hold for every run.
//!
//! Tests verify:
//! - Executors never move down the ladder
//! - Total cost never exceeds the task budget
//! - Total attempts never exceed the hard cap
//! - A run accepts exactly when the gate passes without a loop signal
//! - Specialists only run after the top tier, and only briefly
//! - Heuristic evaluation is idempotent

use std::sync::Arc;

use proptest::prelude::*;
use tiered_escalation::escalation::state::AttemptOutcome;
use tiered_escalation::specialist::SpecialistFactory;
use tiered_escalation::{
    CapabilityTier, EscalationController, EscalationResult, EvaluationError, EvaluationRequest,
    ExecutionError, ExecutorRef, HeuristicOracle, LoopDetector, QualityAssessment, ScriptedOracle,
    ScriptedTier, SpecialistRegistry, Task, TierLadder, TierSpec,
};

const HIGHEST: usize = 2;

const DESCRIPTIONS: &[&str] = &[
    "Patch the authentication bypass in the session handler",
    "Speed up the slow report query on the orders table",
    "Write release notes for the new version",
    "Explain why the TCP socket drops packets under load",
];

const ISSUES: &[&str] = &["missing tests", "wrong output", "unhandled error"];

const SPECIALISTS: &[&str] = &["security", "database", "nobody"];

struct CannedSpecialists;

impl SpecialistFactory for CannedSpecialists {
    fn build(&self, name: &str, _domain_tags: &[String]) -> Arc<dyn CapabilityTier> {
        Arc::new(ScriptedTier::new(name).repeat(format!("{name} answer"), 0.004))
    }
}

/// One scripted tier call.
#[derive(Debug, Clone)]
enum TierStep {
    Fail,
    /// Same text as the previous call
    Repeat(f64),
    Fresh(f64),
}

/// One scripted oracle verdict.
#[derive(Debug, Clone)]
enum OracleStep {
    Fail,
    Assess {
        /// Score in half points, 0..=20
        halves: u8,
        issue: Option<usize>,
        /// May point backwards or past the ladder; the contract check drops those
        tier: Option<usize>,
        specialist: Option<usize>,
    },
}

#[derive(Debug, Clone)]
struct Scenario {
    tiers: Vec<Vec<TierStep>>,
    oracle: Vec<OracleStep>,
    fallback_score: u8,
    description: usize,
    budget: f64,
    max_attempts_total: u32,
    max_tier_attempts: u32,
    evaluation_cost: f64,
}

fn tier_step() -> impl Strategy<Value = TierStep> {
    prop_oneof![
        1 => Just(TierStep::Fail),
        2 => (0.0..0.004f64).prop_map(TierStep::Repeat),
        7 => (0.0..0.004f64).prop_map(TierStep::Fresh),
    ]
}

fn oracle_step() -> impl Strategy<Value = OracleStep> {
    prop_oneof![
        1 => Just(OracleStep::Fail),
        9 => (
            0u8..=20,
            prop::option::weighted(0.3, 0..ISSUES.len()),
            prop::option::weighted(0.2, 0usize..4),
            prop::option::weighted(0.1, 0..SPECIALISTS.len()),
        )
            .prop_map(|(halves, issue, tier, specialist)| OracleStep::Assess {
                halves,
                issue,
                tier,
                specialist,
            }),
    ]
}

fn scenario() -> impl Strategy<Value = Scenario> {
    (
        prop::collection::vec(prop::collection::vec(tier_step(), 1..20), HIGHEST + 1),
        prop::collection::vec(oracle_step(), 1..40),
        0u8..=10,
        0..DESCRIPTIONS.len(),
        0.005..0.05f64,
        1u32..=15,
        1u32..=3,
        0.0..0.001f64,
    )
        .prop_map(
            |(
                tiers,
                oracle,
                fallback_score,
                description,
                budget,
                max_attempts_total,
                max_tier_attempts,
                evaluation_cost,
            )| Scenario {
                tiers,
                oracle,
                fallback_score,
                description,
                budget,
                max_attempts_total,
                max_tier_attempts,
                evaluation_cost,
            },
        )
}

fn build_tier(index: usize, steps: &[TierStep]) -> ScriptedTier {
    let name = format!("tier{index}");
    let mut tier = ScriptedTier::new(&name);
    let mut previous = format!("{name} opening answer");
    for (i, step) in steps.iter().enumerate() {
        tier = match step {
            TierStep::Fail => {
                tier.fail(ExecutionError::Failed("connection reset at line 3".to_string()))
            }
            TierStep::Repeat(cost) => tier.respond(previous.clone(), *cost),
            TierStep::Fresh(cost) => {
                previous = format!("{name} answer {i}");
                tier.respond(previous.clone(), *cost)
            }
        };
    }
    tier.repeat(format!("{name} final answer"), 0.001)
}

fn build_oracle(scenario: &Scenario) -> ScriptedOracle {
    let mut oracle = ScriptedOracle::new();
    for step in &scenario.oracle {
        oracle = match step {
            OracleStep::Fail => {
                oracle.fail(EvaluationError::Unavailable("oracle timeout".to_string()))
            }
            OracleStep::Assess {
                halves,
                issue,
                tier,
                specialist,
            } => {
                let mut assessment = QualityAssessment::new(*halves as f64 / 2.0, 0.7);
                if let Some(issue) = issue {
                    assessment = assessment.with_issue(ISSUES[*issue]);
                }
                if let Some(tier) = tier {
                    assessment = assessment.suggest_tier(*tier);
                }
                if let Some(specialist) = specialist {
                    assessment = assessment.suggest_specialist(SPECIALISTS[*specialist]);
                }
                oracle.assessment(assessment)
            }
        };
    }
    oracle
        .repeat_score(scenario.fallback_score as f64)
        .with_cost(scenario.evaluation_cost)
}

/// Run one generated scenario to completion.
fn simulate(scenario: &Scenario) -> (Task, EscalationResult) {
    let tiers: Vec<TierSpec> = scenario
        .tiers
        .iter()
        .enumerate()
        .map(|(i, steps)| {
            TierSpec::new(format!("tier{i}"), (i + 1) as f64, Arc::new(build_tier(i, steps)))
        })
        .collect();
    let ladder = TierLadder::new(tiers).unwrap().shared();
    let registry = SpecialistRegistry::with_default_catalog(ladder.top_cost(), &CannedSpecialists)
        .unwrap()
        .shared();

    let task = Task::new(DESCRIPTIONS[scenario.description])
        .with_budget(scenario.budget)
        .with_max_attempts_total(scenario.max_attempts_total)
        .with_max_tier_attempts(scenario.max_tier_attempts);

    let controller = EscalationController::new(
        task.clone(),
        ladder,
        Arc::new(build_oracle(scenario)),
        registry,
    );
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    (task, runtime.block_on(controller.run()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    // ── Property: executor rank never decreases ─────────────────────

    #[test]
    fn prop_escalation_is_monotonic(s in scenario()) {
        let (_, result) = simulate(&s);
        prop_assert!(result.history.is_monotonic(), "{}", result.history.summary());
        for record in &result.history.escalations {
            prop_assert!(record.from.rank() < record.to.rank(), "{:?}", record);
        }
    }

    // ── Property: cost stays within budget ──────────────────────────

    #[test]
    fn prop_cost_never_exceeds_budget(s in scenario()) {
        let (task, result) = simulate(&s);
        prop_assert!(
            result.total_cost <= task.budget_limit + 1e-9,
            "spent {} of {}",
            result.total_cost,
            task.budget_limit
        );
        prop_assert!(
            (result.history.total_cost() - result.total_cost).abs() < 1e-9,
            "attempts sum to {} but result says {}",
            result.history.total_cost(),
            result.total_cost
        );
    }

    // ── Property: attempt cap holds ─────────────────────────────────

    #[test]
    fn prop_attempts_bounded(s in scenario()) {
        let (task, result) = simulate(&s);
        prop_assert!(result.total_attempts >= 1);
        prop_assert!(result.total_attempts <= task.max_attempts_total);
        prop_assert_eq!(result.total_attempts as usize, result.history.len());
        prop_assert_eq!(result.escalated, result.total_attempts > 1);
        for (i, attempt) in result.history.attempts.iter().enumerate() {
            prop_assert_eq!(attempt.number as usize, i + 1);
        }
    }

    // ── Property: accept iff gate passes with no loop signal ────────

    #[test]
    fn prop_acceptance_matches_gate(s in scenario()) {
        let (task, result) = simulate(&s);
        let attempts = &result.history.attempts;
        let last = attempts.len() - 1;

        if result.success {
            prop_assert!(result.failure_reason.is_none());
            prop_assert!(attempts[last].quality_score >= task.quality_threshold);
            prop_assert!(attempts[last].outcome == AttemptOutcome::Evaluated);
        } else {
            prop_assert!(result.failure_reason.is_some());
        }

        // any earlier passing attempt must have been overridden by a loop
        let detector = LoopDetector::new(task.time_limit);
        for k in 0..last {
            if attempts[k].quality_score >= task.quality_threshold {
                let signal = detector.check_at(&attempts[..=k], attempts[k].timestamp);
                prop_assert!(
                    signal.is_some(),
                    "attempt {} passed without a loop but the run continued",
                    k + 1
                );
            }
        }
    }

    // ── Property: specialists follow the top tier ───────────────────

    #[test]
    fn prop_specialist_only_after_top_tier(s in scenario()) {
        let (_, result) = simulate(&s);
        let attempts = &result.history.attempts;
        if let Some(first) = attempts.iter().position(|a| a.executor.is_specialist()) {
            prop_assert!(
                attempts[..first]
                    .iter()
                    .any(|a| a.executor.tier_index() == Some(HIGHEST)),
                "specialist ran before the top tier"
            );
            let specialist_attempts = attempts[first..]
                .iter()
                .filter(|a| matches!(a.executor, ExecutorRef::Specialist { .. }))
                .count();
            prop_assert_eq!(specialist_attempts, attempts.len() - first);
            prop_assert!(specialist_attempts <= 2);
        }
    }

    // ── Property: heuristic evaluation is idempotent ────────────────

    #[test]
    fn prop_heuristic_evaluation_idempotent(
        words in prop::collection::vec(
            prop::sample::select(vec!["socket", "retry", "TODO", "- step", "index", "auth", "I cannot", "fix"]),
            0..40,
        ),
        description in 0..DESCRIPTIONS.len(),
        index in 0usize..=HIGHEST,
    ) {
        let oracle = HeuristicOracle::default();
        let response = words.join(" ");
        let task = Task::new(DESCRIPTIONS[description]);
        let executor = ExecutorRef::Tier {
            index,
            name: format!("tier{index}"),
        };
        let request = EvaluationRequest {
            task: &task,
            response: &response,
            executor: &executor,
            highest_tier: HIGHEST,
            threshold: task.quality_threshold,
        };

        let first = oracle.assess(&request);
        let second = oracle.assess(&request);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.needs_escalation, first.score < task.quality_threshold);
    }
}
