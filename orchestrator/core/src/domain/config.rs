// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Runtime Configuration
//
// YAML configuration for the Corpus runtime:
// - bus queue sizing and backpressure
// - circuit breaker thresholds
// - orchestrator deadline and subscriber id
// - pattern learning and reranking
// - optional state directory for persistence

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::circuit_breaker::CircuitBreakerConfig;
use crate::domain::message::BackpressurePolicy;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorpusConfig {
    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub learning: LearningConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_queue_capacity")]
    pub default_queue_capacity: usize,

    #[serde(default)]
    pub backpressure: BackpressurePolicy,

    /// Number of most recent delivered messages kept for inspection.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Trailing window (in messages) for the partition balance metric.
    #[serde(default = "default_balance_window")]
    pub balance_window: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_queue_capacity: default_queue_capacity(),
            backpressure: BackpressurePolicy::default(),
            history_capacity: default_history_capacity(),
            balance_window: default_balance_window(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_subscriber_id")]
    pub subscriber_id: String,

    #[serde(default = "default_action_deadline", with = "humantime_serde")]
    pub action_deadline: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            subscriber_id: default_subscriber_id(),
            action_deadline: default_action_deadline(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default = "default_pattern_capacity")]
    pub pattern_capacity: usize,

    #[serde(default = "default_rerank_interval", with = "humantime_serde")]
    pub rerank_interval: Duration,

    /// Particles whose repeated consecutive use is a batching opportunity.
    #[serde(default = "default_batchable_particles")]
    pub batchable_particles: Vec<String>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            pattern_capacity: default_pattern_capacity(),
            rerank_interval: default_rerank_interval(),
            batchable_particles: default_batchable_particles(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Durable state is kept in memory only when unset.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl PersistenceConfig {
    pub fn particles_dir(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("particles"))
    }

    pub fn patterns_file(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("patterns.json"))
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_history_capacity() -> usize {
    1024
}

fn default_balance_window() -> usize {
    256
}

fn default_subscriber_id() -> String {
    "orchestrator".to_string()
}

fn default_action_deadline() -> Duration {
    Duration::from_secs(5)
}

fn default_pattern_capacity() -> usize {
    corpus_cortex::DEFAULT_PATTERN_CAPACITY
}

fn default_rerank_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_batchable_particles() -> Vec<String> {
    vec!["file_writer".to_string()]
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

impl CorpusConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        std::fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CORPUS_CONFIG_PATH environment variable
    /// 2. ./corpus-config.yaml (working directory)
    /// 3. ~/.corpus/config.yaml (user home)
    /// 4. /etc/corpus/config.yaml (system, Unix) or C:\ProgramData\Corpus\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CORPUS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./corpus-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".corpus").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/corpus/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Corpus\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CORPUS_ACTION_DEADLINE_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: CORPUS_ACTION_DEADLINE_MS={}", ms);
                    self.orchestrator.action_deadline = Duration::from_millis(ms);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for CORPUS_ACTION_DEADLINE_MS: '{}'. Expected milliseconds. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("CORPUS_PATTERN_CAPACITY") {
            match val.parse::<usize>() {
                Ok(capacity) => {
                    tracing::info!("Environment override: CORPUS_PATTERN_CAPACITY={}", capacity);
                    self.learning.pattern_capacity = capacity;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for CORPUS_PATTERN_CAPACITY: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("CORPUS_STATE_DIR") {
            if !val.is_empty() {
                tracing::info!("Environment override: CORPUS_STATE_DIR={}", val);
                self.persistence.state_dir = Some(PathBuf::from(val));
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.default_queue_capacity == 0 {
            return Err(ConfigError("bus.default_queue_capacity must be greater than 0".into()));
        }
        if self.bus.history_capacity == 0 {
            return Err(ConfigError("bus.history_capacity must be greater than 0".into()));
        }
        if self.bus.balance_window == 0 {
            return Err(ConfigError("bus.balance_window must be greater than 0".into()));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError("breaker.failure_threshold must be greater than 0".into()));
        }
        if self.breaker.half_open_max_requests == 0 {
            return Err(ConfigError("breaker.half_open_max_requests must be greater than 0".into()));
        }
        if self.breaker.recovery_timeout.is_zero() {
            return Err(ConfigError("breaker.recovery_timeout must be greater than 0".into()));
        }
        if self.orchestrator.subscriber_id.is_empty() {
            return Err(ConfigError("orchestrator.subscriber_id cannot be empty".into()));
        }
        if self.orchestrator.action_deadline.is_zero() {
            return Err(ConfigError("orchestrator.action_deadline must be greater than 0".into()));
        }
        if self.learning.pattern_capacity == 0 {
            return Err(ConfigError("learning.pattern_capacity must be greater than 0".into()));
        }
        if self.learning.rerank_interval.is_zero() {
            return Err(ConfigError("learning.rerank_interval must be greater than 0".into()));
        }
        Ok(())
    }
}
