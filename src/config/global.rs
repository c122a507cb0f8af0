//! Global configuration.
//!
//! Loaded from ~/.config/cadence/cadence.yml or .cadence.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CadenceError;

/// Global configuration for Cadence.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Dispatcher settings.
    pub scheduler: SchedulerConfig,

    /// Per-agent stage machine settings.
    pub agent: AgentConfig,
}

impl Config {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .cadence.yml in current directory
    /// 3. ~/.config/cadence/cadence.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project config
        let project_config = PathBuf::from(".cadence.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .cadence.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .cadence.yml: {}", e);
                }
            }
        }

        // Try user config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("cadence").join("cadence.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate a single file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Render as YAML (used by `cadence config`).
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), CadenceError> {
        self.scheduler.validate()?;
        self.agent.validate()
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker cap: maximum ticks executing at once.
    #[serde(rename = "max-concurrent-agents")]
    pub max_concurrent_agents: usize,

    /// Aging constant `k` in `base * exp(-k * idle_secs)`.
    #[serde(rename = "decay-rate")]
    pub decay_rate: f64,

    /// Sleep between main-loop and poller iterations.
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Optional budget of ticks per run. `None` runs until stopped.
    #[serde(rename = "max-iterations")]
    pub max_iterations: Option<u64>,

    /// Base priority used by `Dispatcher::add_agent`. Lower is more urgent.
    #[serde(rename = "default-base-priority")]
    pub default_base_priority: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 8,
            decay_rate: 0.1,
            poll_interval_ms: 100,
            max_iterations: None,
            default_base_priority: 1.0,
        }
    }
}

impl SchedulerConfig {
    /// Poll interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Set the worker cap.
    pub fn with_max_concurrent_agents(mut self, max: usize) -> Self {
        self.max_concurrent_agents = max;
        self
    }

    /// Set the poll interval in milliseconds.
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max: Option<u64>) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the aging constant.
    pub fn with_decay_rate(mut self, k: f64) -> Self {
        self.decay_rate = k;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), CadenceError> {
        if self.max_concurrent_agents == 0 {
            return Err(CadenceError::Config("scheduler.max-concurrent-agents must be > 0".into()));
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(CadenceError::Config("scheduler.decay-rate must be finite and >= 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(CadenceError::Config("scheduler.poll-interval-ms must be > 0".into()));
        }
        if !self.default_base_priority.is_finite() || self.default_base_priority < 0.0 {
            return Err(CadenceError::Config(
                "scheduler.default-base-priority must be finite and >= 0".into(),
            ));
        }
        Ok(())
    }
}

/// Per-agent stage machine settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on Attend sub-iterations within one tick.
    #[serde(rename = "max-attend-iterations")]
    pub max_attend_iterations: u32,

    /// Extra attempts after a failed reasoner call.
    #[serde(rename = "decision-retries")]
    pub decision_retries: u32,

    /// Timeout wrapped around every reasoner call.
    #[serde(rename = "decision-timeout-ms")]
    pub decision_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attend_iterations: 3,
            decision_retries: 2,
            decision_timeout_ms: 60_000,
        }
    }
}

impl AgentConfig {
    /// Decision timeout as a Duration.
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), CadenceError> {
        if self.max_attend_iterations == 0 {
            return Err(CadenceError::Config("agent.max-attend-iterations must be > 0".into()));
        }
        if self.decision_timeout_ms == 0 {
            return Err(CadenceError::Config("agent.decision-timeout-ms must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrent_agents, 8);
        assert_eq!(config.decay_rate, 0.1);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.max_iterations, None);
    }

    #[test]
    fn test_scheduler_config_builder() {
        let config = SchedulerConfig::default()
            .with_max_concurrent_agents(2)
            .with_poll_interval_ms(5)
            .with_max_iterations(Some(10))
            .with_decay_rate(0.5);
        assert_eq!(config.max_concurrent_agents, 2);
        assert_eq!(config.poll_interval_ms, 5);
        assert_eq!(config.max_iterations, Some(10));
        assert_eq!(config.decay_rate, 0.5);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = SchedulerConfig::default().with_max_concurrent_agents(0);
        assert!(matches!(config.validate(), Err(CadenceError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_negative_decay() {
        let config = SchedulerConfig::default().with_decay_rate(-0.1);
        assert!(config.validate().is_err());
        let config = SchedulerConfig::default().with_decay_rate(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attend_iterations() {
        let mut config = Config::default();
        config.agent.max_attend_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_kebab_keys() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "scheduler:\n  max-concurrent-agents: 3\n  decay-rate: 0.25\n  max-iterations: 40\nagent:\n  decision-retries: 5"
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.scheduler.max_concurrent_agents, 3);
        assert_eq!(config.scheduler.decay_rate, 0.25);
        assert_eq!(config.scheduler.max_iterations, Some(40));
        // Unspecified keys fall back to defaults
        assert_eq!(config.scheduler.poll_interval_ms, 100);
        assert_eq!(config.agent.decision_retries, 5);
        assert_eq!(config.agent.max_attend_iterations, 3);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "scheduler:\n  max-concurrent-agents: 0").unwrap();
        assert!(Config::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let path = PathBuf::from("/nonexistent/cadence.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_yaml_roundtrip_preserves_values() {
        let mut config = Config::default();
        config.scheduler.max_iterations = Some(7);
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("max-concurrent-agents"));
        let restored: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored, config);
    }
}
