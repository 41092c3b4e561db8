//! Engine configuration.
//!
//! Built from defaults, then overridden by a TOML file and/or `ESCALATION_*`
//! environment variables.

use crate::error::ConfigError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Defaults applied to tasks created through [`crate::task::Task::from_defaults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDefaults {
    pub quality_threshold: f64,
    pub max_tier_attempts: u32,
    pub max_attempts_total: u32,
    pub budget_limit: f64,
    pub time_limit_secs: u64,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            quality_threshold: 6.0,
            max_tier_attempts: 3,
            max_attempts_total: 15,
            budget_limit: 1.0,
            time_limit_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopDetectionConfig {
    /// Consecutive attempts that must share a normalized error
    pub error_repeat_window: usize,
    /// Flag A→B→A response patterns
    pub detect_oscillation: bool,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            error_repeat_window: 3,
            detect_oscillation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialistConfig {
    /// Attempts a chosen specialist gets (first try plus expanded-context retries)
    pub max_attempts: u32,
    /// Fall back to a tag-selected specialist once the top tier runs out,
    /// even without an oracle suggestion
    pub auto_fallback: bool,
}

impl Default for SpecialistConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            auto_fallback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub defaults: TaskDefaults,
    pub loop_detection: LoopDetectionConfig,
    pub specialists: SpecialistConfig,
    /// Wrap the oracle in a [`crate::oracle::MemoizedOracle`]
    pub memoize_evaluations: bool,
    /// Directory for per-task JSONL audit files
    pub audit_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            defaults: TaskDefaults::default(),
            loop_detection: LoopDetectionConfig::default(),
            specialists: SpecialistConfig::default(),
            memoize_evaluations: true,
            audit_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply `ESCALATION_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string());

        if let Some(n) = parsed(&read, "ESCALATION_QUALITY_THRESHOLD") {
            self.defaults.quality_threshold = n;
        }
        if let Some(n) = parsed(&read, "ESCALATION_MAX_TIER_ATTEMPTS") {
            self.defaults.max_tier_attempts = n;
        }
        if let Some(n) = parsed(&read, "ESCALATION_MAX_ATTEMPTS_TOTAL") {
            self.defaults.max_attempts_total = n;
        }
        if let Some(n) = parsed(&read, "ESCALATION_BUDGET_LIMIT") {
            self.defaults.budget_limit = n;
        }
        if let Some(n) = parsed(&read, "ESCALATION_TIME_LIMIT_SECS") {
            self.defaults.time_limit_secs = n;
        }
        if let Some(n) = parsed(&read, "ESCALATION_ERROR_REPEAT_WINDOW") {
            self.loop_detection.error_repeat_window = n;
        }
        if let Some(val) = read("ESCALATION_DETECT_OSCILLATION") {
            self.loop_detection.detect_oscillation = parse_bool(&val);
        }
        if let Some(n) = parsed(&read, "ESCALATION_SPECIALIST_MAX_ATTEMPTS") {
            self.specialists.max_attempts = n;
        }
        if let Some(val) = read("ESCALATION_SPECIALIST_AUTO_FALLBACK") {
            self.specialists.auto_fallback = parse_bool(&val);
        }
        if let Some(val) = read("ESCALATION_MEMOIZE") {
            self.memoize_evaluations = parse_bool(&val);
        }
        if let Some(dir) = read("ESCALATION_AUDIT_DIR") {
            self.audit_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
    }

    /// Parse a TOML document. Missing sections keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse engine config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.defaults;
        if !(0.0..=10.0).contains(&d.quality_threshold) {
            return Err(invalid("defaults.quality_threshold", d.quality_threshold));
        }
        if !(d.budget_limit >= 0.0) {
            return Err(invalid("defaults.budget_limit", d.budget_limit));
        }
        if d.max_tier_attempts == 0 {
            return Err(invalid("defaults.max_tier_attempts", 0));
        }
        if d.max_attempts_total == 0 {
            return Err(invalid("defaults.max_attempts_total", 0));
        }
        if self.loop_detection.error_repeat_window < 2 {
            return Err(invalid(
                "loop_detection.error_repeat_window",
                self.loop_detection.error_repeat_window,
            ));
        }
        if self.specialists.max_attempts == 0 {
            return Err(invalid("specialists.max_attempts", 0));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parsed<T: std::str::FromStr>(read: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = read(key)?;
    match value.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring invalid configuration value");
            None
        }
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.defaults.quality_threshold, 6.0);
        assert_eq!(config.defaults.max_tier_attempts, 3);
        assert_eq!(config.defaults.max_attempts_total, 15);
        assert_eq!(config.loop_detection.error_repeat_window, 3);
        assert_eq!(config.specialists.max_attempts, 2);
        assert!(config.memoize_evaluations);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ESCALATION_QUALITY_THRESHOLD", "7.5"),
            ("ESCALATION_MAX_TIER_ATTEMPTS", "2"),
            ("ESCALATION_SPECIALIST_AUTO_FALLBACK", "true"),
            ("ESCALATION_MEMOIZE", "0"),
            ("ESCALATION_AUDIT_DIR", "/tmp/audit"),
            ("ESCALATION_BUDGET_LIMIT", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.defaults.quality_threshold, 7.5);
        assert_eq!(config.defaults.max_tier_attempts, 2);
        assert!(config.specialists.auto_fallback);
        assert!(!config.memoize_evaluations);
        assert_eq!(config.audit_dir, Some(PathBuf::from("/tmp/audit")));
        // invalid value leaves the default in place
        assert_eq!(config.defaults.budget_limit, 1.0);
    }

    #[test]
    fn test_toml_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            memoize_evaluations = false

            [defaults]
            quality_threshold = 8.0
            budget_limit = 0.5

            [specialists]
            auto_fallback = true
            "#,
        )
        .unwrap();
        assert_eq!(config.defaults.quality_threshold, 8.0);
        assert_eq!(config.defaults.max_tier_attempts, 3);
        assert!(config.specialists.auto_fallback);
        assert_eq!(config.specialists.max_attempts, 2);
        assert!(!config.memoize_evaluations);
    }

    #[test]
    fn test_toml_rejects_invalid_values() {
        let err = EngineConfig::from_toml_str("[defaults]\nquality_threshold = 11.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(EngineConfig::from_toml_str("defaults = 3").is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "[loop_detection]\ndetect_oscillation = false\n").unwrap();
        let config = EngineConfig::from_toml_file(&path).unwrap();
        assert!(!config.loop_detection.detect_oscillation);

        let missing = EngineConfig::from_toml_file(&dir.path().join("nope.toml"));
        assert!(missing.is_err());
    }
}
