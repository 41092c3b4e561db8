//! Escalation Engine — Quality-Gated State Machine for Tier Routing
//!
//! Walks a task up a cost-ordered ladder of tiers, gating every response on
//! an oracle score. Decisions are deterministic given the attempt history.
//!
//! # Escalation Ladder
//!
//! ```text
//! Tier 0 (cheapest) — up to max_tier_attempts tries
//!     │
//!     ├─ score >= threshold, no loop → accept
//!     ├─ oracle suggests a later tier → jump there
//!     ├─ loop detected or tier cap reached → next tier
//!     │
//!     ▼
//! Tier N (highest ordinary tier)
//!     │
//!     ├─ oracle names a specialist → specialist
//!     ├─ cap reached / loop → abort (or tag-selected specialist
//!     │                        when auto fallback is on)
//!     │
//!     ▼
//! Specialist — one try plus one retry with expanded context, then terminal
//! ```
//!
//! Budget, wall-clock and total-attempt limits abort the run from any
//! state; the best attempt seen so far is returned.

pub mod controller;
pub mod friction;
pub mod heuristics;
pub mod loop_detector;
pub mod policy;
pub mod state;

pub use controller::EscalationController;
pub use friction::{FrictionDetector, FrictionKind, FrictionSeverity, FrictionSignal};
pub use heuristics::{RunHeuristics, RunSample};
pub use loop_detector::{LoopDetector, LoopKind, LoopSignal};
pub use policy::{Decision, EscalationPolicy};
pub use state::{
    Attempt, AttemptOutcome, ControllerState, EscalationHistory, EscalationReason,
    EscalationRecord, EscalationResult,
};
