//! Runtime configuration, persisted as TOML and overridable from `TALKY_*`
//! environment variables.

use std::path::Path;
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::execute::ExecutionLimits;
use crate::planner::SearchLimits;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "TALKY_";

/// Errors from configuration loading and validation.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(talky::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(talky::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    ConfigParse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(talky::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value \"{value}\" for {key}: {message}")]
    #[diagnostic(
        code(talky::config::env_override),
        help("Environment overrides must parse as the field's type (integers, or a float for TALKY_MIN_CONFIDENCE).")
    )]
    InvalidOverride {
        key: String,
        value: String,
        message: String,
    },

    #[error("invalid configuration: {field} {message}")]
    #[diagnostic(code(talky::config::invalid))]
    Invalid { field: &'static str, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Planner, executor and pipeline knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalkyConfig {
    /// Upper bound on concurrently running actions.
    #[serde(default = "default_max_concurrent_actions")]
    pub max_concurrent_actions: usize,
    /// Node expansions before a search gives up.
    #[serde(default = "default_search_max_expansions")]
    pub search_max_expansions: usize,
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
    /// Retries after a transient invocation error.
    #[serde(default = "default_node_retries")]
    pub node_retries: u32,
    /// Deadline for executing one plan.
    #[serde(default = "default_plan_timeout_ms")]
    pub plan_timeout_ms: u64,
    /// Intents classified below this confidence are rejected.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_max_concurrent_actions() -> usize {
    4
}
fn default_search_max_expansions() -> usize {
    10_000
}
fn default_search_timeout_ms() -> u64 {
    2_000
}
fn default_node_retries() -> u32 {
    2
}
fn default_plan_timeout_ms() -> u64 {
    30_000
}
fn default_min_confidence() -> f64 {
    0.6
}
fn default_retry_base_delay_ms() -> u64 {
    100
}
fn default_retry_max_delay_ms() -> u64 {
    2_000
}

impl Default for TalkyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_actions: default_max_concurrent_actions(),
            search_max_expansions: default_search_max_expansions(),
            search_timeout_ms: default_search_timeout_ms(),
            node_retries: default_node_retries(),
            plan_timeout_ms: default_plan_timeout_ms(),
            min_confidence: default_min_confidence(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl TalkyConfig {
    /// Parse from a TOML string. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ConfigParse {
            path: "<string>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::ConfigWrite {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Apply `TALKY_*` overrides from `vars`; unrelated keys are ignored.
    pub fn with_env_overrides<I, K, V>(mut self, vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field {
                "MAX_CONCURRENT_ACTIONS" => self.max_concurrent_actions = parse(key, value)?,
                "SEARCH_MAX_EXPANSIONS" => self.search_max_expansions = parse(key, value)?,
                "SEARCH_TIMEOUT_MS" => self.search_timeout_ms = parse(key, value)?,
                "NODE_RETRIES" => self.node_retries = parse(key, value)?,
                "PLAN_TIMEOUT_MS" => self.plan_timeout_ms = parse(key, value)?,
                "MIN_CONFIDENCE" => self.min_confidence = parse(key, value)?,
                "RETRY_BASE_DELAY_MS" => self.retry_base_delay_ms = parse(key, value)?,
                "RETRY_MAX_DELAY_MS" => self.retry_max_delay_ms = parse(key, value)?,
                _ => tracing::debug!(key, "ignoring unknown config override"),
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Apply overrides from the process environment.
    pub fn with_process_env(self) -> ConfigResult<Self> {
        self.with_env_overrides(std::env::vars())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent_actions == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_actions",
                message: "must be at least 1".into(),
            });
        }
        if self.search_max_expansions == 0 {
            return Err(ConfigError::Invalid {
                field: "search_max_expansions",
                message: "must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::Invalid {
                field: "min_confidence",
                message: format!("must be within [0, 1], got {}", self.min_confidence),
            });
        }
        Ok(())
    }

    pub fn search_limits(&self) -> SearchLimits {
        SearchLimits {
            max_expansions: self.search_max_expansions,
            timeout: Duration::from_millis(self.search_timeout_ms),
        }
    }

    pub fn execution_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            max_concurrent_actions: self.max_concurrent_actions,
            node_retries: self.node_retries,
            plan_timeout: Duration::from_millis(self.plan_timeout_ms),
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

fn parse<T>(key: &str, value: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })
}
