//! Specialist Registry — terminal, domain-specialized executors
//!
//! Specialists sit above the ordinary tier ladder. The registry is
//! append-only: new specialists may be registered at runtime (through a
//! [`SpecialistFactory`]) but nothing is ever removed, so controllers can read
//! it concurrently while a single writer appends.

use crate::error::RegistryError;
use crate::task::Task;
use crate::tier::{CapabilityTier, ExecutorRef};
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Name of the catch-all specialist used when no domain matches.
pub const GENERALIST: &str = "generalist";

/// Built-in catalog: specialist name and the tags it answers to.
pub const DEFAULT_CATALOG: &[(&str, &[&str])] = &[
    (
        "security",
        &[
            "security", "auth", "authentication", "authorization", "vulnerability", "injection",
            "xss", "csrf", "crypto", "encryption", "secret", "exploit",
        ],
    ),
    (
        "system-design",
        &[
            "system-design", "architecture", "scalability", "distributed", "microservice",
            "availability", "replication", "queue",
        ],
    ),
    (
        "algorithms",
        &[
            "algorithms", "algorithm", "complexity", "sorting", "graph", "recursion",
            "heuristic", "search",
        ],
    ),
    (
        "data-science",
        &[
            "data-science", "statistics", "regression", "dataset", "pandas", "training",
            "classification", "clustering",
        ],
    ),
    (
        "code-architecture",
        &[
            "code-architecture", "refactor", "refactoring", "module", "coupling", "abstraction",
            "interface", "dependency",
        ],
    ),
    (
        "performance",
        &[
            "performance", "latency", "throughput", "optimize", "optimization", "profiling",
            "memory", "slow", "benchmark",
        ],
    ),
    (
        "database",
        &[
            "database", "sql", "query", "index", "schema", "migration", "transaction",
            "postgres", "mysql",
        ],
    ),
    (
        "networking",
        &[
            "networking", "network", "tcp", "udp", "http", "dns", "socket", "protocol", "tls",
            "packet",
        ],
    ),
];

/// A named specialist bound to its executor.
#[derive(Clone)]
pub struct SpecialistProfile {
    pub name: String,
    pub domain_tags: Vec<String>,
    /// Relative cost class; never below the top ordinary tier
    pub cost_class: f64,
    executor: Arc<dyn CapabilityTier>,
}

impl SpecialistProfile {
    pub fn new<I, S>(
        name: impl Into<String>,
        domain_tags: I,
        cost_class: f64,
        executor: Arc<dyn CapabilityTier>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            domain_tags: domain_tags
                .into_iter()
                .map(|t| t.into().to_lowercase())
                .collect(),
            cost_class,
            executor,
        }
    }

    pub fn executor(&self) -> &Arc<dyn CapabilityTier> {
        &self.executor
    }

    pub fn executor_ref(&self) -> ExecutorRef {
        ExecutorRef::Specialist {
            name: self.name.clone(),
        }
    }

    /// Number of tags matched by the keywords. Hyphenated tags match when
    /// every part is present.
    pub fn overlap(&self, keywords: &BTreeSet<String>) -> usize {
        self.domain_tags
            .iter()
            .filter(|tag| {
                keywords.contains(tag.as_str())
                    || (tag.contains('-') && tag.split('-').all(|part| keywords.contains(part)))
            })
            .count()
    }
}

impl std::fmt::Debug for SpecialistProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistProfile")
            .field("name", &self.name)
            .field("domain_tags", &self.domain_tags)
            .field("cost_class", &self.cost_class)
            .finish_non_exhaustive()
    }
}

/// Builds executors for specialists created at runtime.
pub trait SpecialistFactory: Send + Sync {
    fn build(&self, name: &str, domain_tags: &[String]) -> Arc<dyn CapabilityTier>;
}

/// Append-only catalog of specialists.
pub struct SpecialistRegistry {
    entries: RwLock<Vec<Arc<SpecialistProfile>>>,
    cost_floor: f64,
}

impl SpecialistRegistry {
    /// Empty registry. `cost_floor` is the top ordinary tier's cost class.
    pub fn new(cost_floor: f64) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            cost_floor,
        }
    }

    /// Registry pre-populated with [`DEFAULT_CATALOG`] plus a generalist,
    /// all at the cost floor.
    pub fn with_default_catalog(
        cost_floor: f64,
        factory: &dyn SpecialistFactory,
    ) -> Result<Self, RegistryError> {
        let registry = Self::new(cost_floor);
        for (name, tags) in DEFAULT_CATALOG {
            registry.spawn(factory, name, tags.iter().copied(), cost_floor)?;
        }
        registry.spawn(factory, GENERALIST, std::iter::empty::<&str>(), cost_floor)?;
        Ok(registry)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn cost_floor(&self) -> f64 {
        self.cost_floor
    }

    /// Append a specialist. Names are unique (case-insensitive).
    pub fn register(
        &self,
        profile: SpecialistProfile,
    ) -> Result<Arc<SpecialistProfile>, RegistryError> {
        // NaN fails this comparison too
        if !(profile.cost_class >= self.cost_floor) {
            return Err(RegistryError::BelowCostFloor {
                name: profile.name,
                cost_class: profile.cost_class,
                floor: self.cost_floor,
            });
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?;
        if entries
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(&profile.name))
        {
            return Err(RegistryError::Duplicate(profile.name));
        }

        let profile = Arc::new(profile);
        entries.push(profile.clone());
        tracing::debug!(
            specialist = %profile.name,
            tags = ?profile.domain_tags,
            "registered specialist"
        );
        Ok(profile)
    }

    /// Create a specialist through `factory` and register it.
    pub fn spawn<I, S>(
        &self,
        factory: &dyn SpecialistFactory,
        name: &str,
        domain_tags: I,
        cost_class: f64,
    ) -> Result<Arc<SpecialistProfile>, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = domain_tags
            .into_iter()
            .map(|t| t.into().to_lowercase())
            .collect();
        let executor = factory.build(name, &tags);
        self.register(SpecialistProfile::new(name, tags, cost_class, executor))
    }

    pub fn get(&self, name: &str) -> Option<Arc<SpecialistProfile>> {
        self.read()
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.read().iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Pick the specialist for a task.
    ///
    /// A known `suggested` name wins. Otherwise the specialist with the most
    /// tags matching the task's keywords is chosen (earliest registered on a
    /// tie), falling back to the generalist. `None` only when nothing
    /// matches and no generalist is registered.
    pub fn select(&self, suggested: Option<&str>, task: &Task) -> Option<Arc<SpecialistProfile>> {
        if let Some(profile) = suggested.and_then(|name| self.get(name)) {
            return Some(profile);
        }
        if let Some(name) = suggested {
            tracing::debug!(suggested = %name, "unknown specialist suggested, selecting by tags");
        }

        let keywords = task.keywords();
        let entries = self.read();
        let mut best: Option<(&Arc<SpecialistProfile>, usize)> = None;
        for entry in entries.iter() {
            let score = entry.overlap(&keywords);
            if score == 0 {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((entry, score)),
            }
        }

        best.map(|(entry, _)| entry.clone()).or_else(|| {
            entries
                .iter()
                .find(|e| e.name.eq_ignore_ascii_case(GENERALIST))
                .cloned()
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<SpecialistProfile>>> {
        // Entries are append-only, so a poisoned lock still holds a valid list.
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SpecialistRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistRegistry")
            .field("specialists", &self.names())
            .field("cost_floor", &self.cost_floor)
            .finish()
    }
}
