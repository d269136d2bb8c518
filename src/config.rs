//! Static process configuration.
//!
//! Hierarchical loading through figment: programmatic defaults, a YAML
//! file, then `FORMATION_`-prefixed environment variables (highest
//! priority). All knobs the core reads at start live here: worker counts,
//! cache sizes, the cache-key version prefix, the status poll cadence,
//! and the gateway endpoint.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A worker count of zero would stall that controller.
    #[error("invalid worker count for {0}: must be at least 1")]
    InvalidWorkerCount(&'static str),

    /// The log level is not a tracing level.
    #[error("invalid log level {0:?}: must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// The log format is unknown.
    #[error("invalid log format {0:?}: must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Engine caches need room to be useful.
    #[error("invalid cache capacity for {0}: must be at least 1")]
    InvalidCacheCapacity(&'static str),

    /// The gateway URL is required.
    #[error("gateway.base_url cannot be empty")]
    EmptyGatewayUrl,
}

/// Behavior when a plane CR names no observability plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservabilityPolicy {
    /// Observability wiring is skipped for that plane.
    Disable,
    /// Reconciliation degrades with a missing-reference condition.
    Fail,
}

impl Default for ObservabilityPolicy {
    fn default() -> Self {
        Self::Disable
    }
}

/// Per-controller worker counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkersConfig {
    /// Workers per plane variant.
    #[serde(default = "default_plane_workers")]
    pub planes: usize,
    /// Project workers.
    #[serde(default = "default_plane_workers")]
    pub projects: usize,
    /// Component workers.
    #[serde(default = "default_component_workers")]
    pub components: usize,
    /// Binding workers.
    #[serde(default = "default_component_workers")]
    pub bindings: usize,
    /// Env-settings workers.
    #[serde(default = "default_plane_workers")]
    pub env_settings: usize,
    /// Workflow-run workers.
    #[serde(default = "default_component_workers")]
    pub workflow_runs: usize,
}

const fn default_plane_workers() -> usize {
    1
}

const fn default_component_workers() -> usize {
    2
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            planes: default_plane_workers(),
            projects: default_plane_workers(),
            components: default_component_workers(),
            bindings: default_component_workers(),
            env_settings: default_plane_workers(),
            workflow_runs: default_component_workers(),
        }
    }
}

/// Cache sizing and versioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CachesConfig {
    /// Engine environment-cache capacity.
    #[serde(default = "default_env_cache_capacity")]
    pub env_capacity: usize,
    /// Engine program-cache capacity.
    #[serde(default = "default_program_cache_capacity")]
    pub program_capacity: usize,
    /// Version prefix baked into every plane-client cache key; bumping it
    /// invalidates all entries.
    #[serde(default = "default_client_key_version")]
    pub client_key_version: String,
}

const fn default_env_cache_capacity() -> usize {
    crate::engine::ENV_CACHE_CAPACITY
}

const fn default_program_cache_capacity() -> usize {
    crate::engine::PROGRAM_CACHE_CAPACITY
}

fn default_client_key_version() -> String {
    crate::planes::DEFAULT_CACHE_KEY_VERSION.to_string()
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            env_capacity: default_env_cache_capacity(),
            program_capacity: default_program_cache_capacity(),
            client_key_version: default_client_key_version(),
        }
    }
}

/// Gateway endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GatewaySettings {
    /// Base URL of the gateway process.
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    /// Per-request timeout, seconds.
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8445".to_string()
}

const fn default_gateway_timeout_secs() -> u64 {
    10
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format: json or pretty.
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Optional directory for file output alongside stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Per-controller worker counts.
    #[serde(default)]
    pub workers: WorkersConfig,
    /// Cache sizing and key versioning.
    #[serde(default)]
    pub caches: CachesConfig,
    /// Gateway endpoint.
    #[serde(default)]
    pub gateway: GatewaySettings,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Agent-status poll cadence, seconds.
    #[serde(default = "default_status_update_interval")]
    pub status_update_interval_secs: u64,
    /// Full-relist cadence, seconds.
    #[serde(default = "default_relist_interval")]
    pub relist_interval_secs: u64,
    /// Field owner stamped on remote applies.
    #[serde(default = "default_field_owner")]
    pub field_owner: String,
    /// Behavior when an observability plane reference is absent.
    #[serde(default)]
    pub observability_policy: ObservabilityPolicy,
}

const fn default_status_update_interval() -> u64 {
    crate::planes::DEFAULT_STATUS_UPDATE_INTERVAL_SECS
}

const fn default_relist_interval() -> u64 {
    300
}

fn default_field_owner() -> String {
    "formation-controller".to_string()
}

impl Config {
    /// Load configuration: defaults, then an optional YAML file, then
    /// `FORMATION_*` environment variables.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed("FORMATION_").split("__"))
            .extract()
            .context("failed to extract configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, count) in [
            ("planes", self.workers.planes),
            ("projects", self.workers.projects),
            ("components", self.workers.components),
            ("bindings", self.workers.bindings),
            ("env_settings", self.workers.env_settings),
            ("workflow_runs", self.workers.workflow_runs),
        ] {
            if count == 0 {
                return Err(ConfigError::InvalidWorkerCount(name));
            }
        }
        if self.caches.env_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity("env_capacity"));
        }
        if self.caches.program_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity("program_capacity"));
        }
        if self.gateway.base_url.is_empty() {
            return Err(ConfigError::EmptyGatewayUrl);
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.logging.format.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.caches.client_key_version, "v2");
        assert_eq!(config.status_update_interval_secs, 30);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "workers:\n  components: 4\ncaches:\n  client_key_version: v3\n"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.workers.components, 4);
        assert_eq!(config.caches.client_key_version, "v3");
        // Untouched fields keep their defaults.
        assert_eq!(config.workers.bindings, 2);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.workers.bindings = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWorkerCount("bindings"))
        ));
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
