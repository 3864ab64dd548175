// Configuration File Support
//
// This module provides configuration file parsing for the quota engine.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/quota-engine/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::quota::defaults::{DefaultTable, STANDARD_TIERS};
use crate::quota::engine::EngineOptions;
use crate::quota::policy::FailurePolicy;
use crate::quota::types::{TierRule, DEFAULT_TIER};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Engine tunables
    pub engine: EngineConfig,

    /// Default tier tables added to the compiled defaults, keyed by service id
    pub services: HashMap<String, BTreeMap<String, TierRule>>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to enable metrics collection
    pub enabled: bool,

    /// Port for metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Tier labels requests may name
    pub tiers: Vec<String>,

    /// Retention of usage records in hours
    pub retention_hours: u64,

    /// Interval between expired-record sweeps in seconds
    pub eviction_interval_secs: u64,

    /// Failure policy for the read helpers (open, closed)
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tiers: STANDARD_TIERS.iter().map(|t| t.to_string()).collect(),
            retention_hours: 24,
            eviction_interval_secs: 60,
            failure_policy: FailurePolicy::Open,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            engine: EngineConfig::default(),
            services: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation. If the config file does not exist, returns default
    /// configuration (with environment overrides applied).
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            let config = Self::default().apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        // Apply environment variable overrides
        let config = config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/quota-engine/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "quota-engine", "quota-engine") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("quota-engine").join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - QUOTA_ENGINE_LOG_LEVEL
    /// - QUOTA_ENGINE_LOG_FORMAT
    /// - QUOTA_ENGINE_METRICS_ENABLED
    /// - QUOTA_ENGINE_METRICS_PORT
    /// - QUOTA_ENGINE_RETENTION_HOURS
    /// - QUOTA_ENGINE_FAILURE_POLICY
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("QUOTA_ENGINE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("QUOTA_ENGINE_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(enabled) = std::env::var("QUOTA_ENGINE_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }
        if let Ok(port) = std::env::var("QUOTA_ENGINE_METRICS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.metrics.port = port;
            }
        }

        if let Ok(hours) = std::env::var("QUOTA_ENGINE_RETENTION_HOURS") {
            if let Ok(hours) = hours.parse::<u64>() {
                if hours >= 1 {
                    self.engine.retention_hours = hours;
                }
            }
        }
        if let Ok(policy) = std::env::var("QUOTA_ENGINE_FAILURE_POLICY") {
            if let Ok(policy) = policy.parse::<FailurePolicy>() {
                self.engine.failure_policy = policy;
            }
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}. Must be one of: trace, debug, info, warn, error", self.logging.level),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!("Invalid log format: {}. Must be one of: json, pretty, compact", self.logging.format),
        }

        if self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }

        if self.engine.retention_hours == 0 {
            anyhow::bail!("Usage record retention must be at least 1 hour");
        }
        if self.engine.eviction_interval_secs == 0 {
            anyhow::bail!("Eviction interval must be > 0");
        }
        if !self.engine.tiers.iter().any(|t| t == DEFAULT_TIER) {
            anyhow::bail!("Engine tiers must include '{}'", DEFAULT_TIER);
        }

        for (service_id, rules) in &self.services {
            if service_id.trim().is_empty() {
                anyhow::bail!("Service table has an empty service id");
            }
            if !rules.contains_key(DEFAULT_TIER) {
                anyhow::bail!("Service '{}' has no '{}' tier", service_id, DEFAULT_TIER);
            }
            for (tier, rule) in rules {
                if rule.window_ms == 0 || rule.max_requests == 0 {
                    anyhow::bail!(
                        "Service '{}' tier '{}' must have window_ms > 0 and max_requests > 0",
                        service_id,
                        tier
                    );
                }
            }
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging.level.to_lowercase().parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }

    /// Engine options described by this configuration
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            tiers: self.engine.tiers.clone(),
            retention: Duration::from_secs(self.engine.retention_hours * 3600),
            failure_policy: self.engine.failure_policy,
        }
    }

    /// Compiled defaults extended with the configured service tables
    pub fn default_table(&self) -> DefaultTable {
        DefaultTable::with_overrides(&self.services)
    }

    /// Interval between expired-record sweeps
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.engine.eviction_interval_secs)
    }
}
