//! Escalation Service — task submission over shared, read-only catalogs
//!
//! Holds the tier ladder, oracle and specialist registry behind `Arc`s and
//! spins up one [`EscalationController`] per submitted task. Controllers
//! share nothing mutable, so any number of tasks can run at once. When
//! memoization is on, each controller gets its own [`MemoizedOracle`].

use crate::audit::{AuditSink, JsonlAuditLog};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::escalation::controller::EscalationController;
use crate::escalation::policy::EscalationPolicy;
use crate::escalation::state::EscalationResult;
use crate::oracle::{MemoizedOracle, QualityOracle};
use crate::specialist::SpecialistRegistry;
use crate::task::Task;
use crate::tier::TierLadder;
use std::sync::Arc;

pub struct EscalationService {
    ladder: Arc<TierLadder>,
    oracle: Arc<dyn QualityOracle>,
    specialists: Arc<SpecialistRegistry>,
    audit: Option<Arc<dyn AuditSink>>,
    config: EngineConfig,
}

impl EscalationService {
    pub fn builder(ladder: TierLadder, oracle: Arc<dyn QualityOracle>) -> EscalationServiceBuilder {
        EscalationServiceBuilder {
            ladder,
            oracle,
            specialists: None,
            audit: None,
            config: EngineConfig::default(),
        }
    }

    pub fn ladder(&self) -> &Arc<TierLadder> {
        &self.ladder
    }

    pub fn specialists(&self) -> &Arc<SpecialistRegistry> {
        &self.specialists
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// New task carrying the configured defaults.
    pub fn task(&self, description: impl Into<String>) -> Task {
        Task::from_defaults(description, &self.config.defaults)
    }

    /// Controller for one task, wired to this service's catalogs.
    pub fn controller(&self, task: Task) -> EscalationController {
        let oracle: Arc<dyn QualityOracle> = if self.config.memoize_evaluations {
            Arc::new(MemoizedOracle::new(self.oracle.clone()))
        } else {
            self.oracle.clone()
        };
        let controller = EscalationController::new(
            task,
            self.ladder.clone(),
            oracle,
            self.specialists.clone(),
        )
        .with_policy(EscalationPolicy::new(&self.config.specialists))
        .with_loop_detection(&self.config.loop_detection);

        match &self.audit {
            Some(sink) => controller.with_audit(sink.clone()),
            None => controller,
        }
    }

    /// Run one task to its terminal result.
    pub async fn submit(&self, task: Task) -> EscalationResult {
        self.controller(task).run().await
    }

    /// Run many tasks concurrently; results come back in submission order.
    pub async fn submit_all(&self, tasks: impl IntoIterator<Item = Task>) -> Vec<EscalationResult> {
        let runs = tasks.into_iter().map(|task| self.submit(task));
        futures::future::join_all(runs).await
    }
}

impl std::fmt::Debug for EscalationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationService")
            .field("ladder", &self.ladder)
            .field("specialists", &self.specialists)
            .field("audit", &self.audit.is_some())
            .field("config", &self.config)
            .finish()
    }
}

pub struct EscalationServiceBuilder {
    ladder: TierLadder,
    oracle: Arc<dyn QualityOracle>,
    specialists: Option<Arc<SpecialistRegistry>>,
    audit: Option<Arc<dyn AuditSink>>,
    config: EngineConfig,
}

impl EscalationServiceBuilder {
    pub fn specialists(mut self, registry: Arc<SpecialistRegistry>) -> Self {
        self.specialists = Some(registry);
        self
    }

    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and the specialist cost floor, then open
    /// the audit directory if configured.
    pub fn build(self) -> EngineResult<EscalationService> {
        self.config.validate()?;

        let top_tier_cost = self.ladder.top_cost();
        let specialists = self
            .specialists
            .unwrap_or_else(|| SpecialistRegistry::new(top_tier_cost).shared());
        if specialists.cost_floor() < top_tier_cost {
            return Err(EngineError::SpecialistFloorBelowTopTier {
                floor: specialists.cost_floor(),
                top_tier_cost,
            });
        }

        let audit: Option<Arc<dyn AuditSink>> = match (self.audit, &self.config.audit_dir) {
            (Some(sink), _) => Some(sink),
            (None, Some(dir)) => Some(Arc::new(JsonlAuditLog::open(dir)?)),
            (None, None) => None,
        };

        tracing::info!(
            tiers = ?self.ladder.names(),
            specialists = specialists.len(),
            memoized = self.config.memoize_evaluations,
            audit = audit.is_some(),
            "escalation service ready"
        );

        Ok(EscalationService {
            ladder: self.ladder.shared(),
            oracle: self.oracle,
            specialists,
            audit,
            config: self.config,
        })
    }
}
