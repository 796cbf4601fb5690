//! Configuration module for Planwise.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::RetryPolicy;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Planwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub connectivity: ConnectivityConfig,
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Scheduler and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic passes.
    pub periodic_interval_secs: u64,
    /// Milliseconds to wait after connectivity returns before syncing.
    pub connectivity_debounce_ms: u64,
    /// Milliseconds to wait after a queued mutation before syncing.
    pub mutation_debounce_ms: u64,
    /// Failed attempts after which a queue item is dropped.
    pub max_retries: u32,
    /// Base of the quadratic retry backoff, in minutes.
    pub backoff_base_minutes: u32,
    /// Priority given to mutations enqueued without one.
    pub default_priority: i32,
}

/// Connectivity quality thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Minimum quality (0-100) for a sync pass.
    pub sync_quality_threshold: u8,
    /// Minimum quality (0-100) for heavy operations such as full refreshes.
    pub heavy_quality_threshold: u8,
    /// Seconds between network transport probes.
    pub probe_interval_secs: u64,
}

/// Remote store endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the document store. `None` keeps the daemon offline.
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Identifier of the signed-in user.
    pub user_id: Option<String>,
    /// Name of the environment variable holding the bearer token.
    pub token_env: String,
}

/// Durable storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the SQLite database.
    pub database_path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/planwise/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("planwise")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            periodic_interval_secs: 15 * 60,
            connectivity_debounce_ms: 2_000,
            mutation_debounce_ms: 1_000,
            max_retries: 3,
            backoff_base_minutes: 5,
            default_priority: crate::domain::DEFAULT_PRIORITY,
        }
    }
}

impl SyncConfig {
    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    pub fn connectivity_debounce(&self) -> Duration {
        Duration::from_millis(self.connectivity_debounce_ms)
    }

    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    /// Retry ceiling and backoff base as a domain policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: chrono::Duration::minutes(i64::from(self.backoff_base_minutes)),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            sync_quality_threshold: 40,
            heavy_quality_threshold: 70,
            probe_interval_secs: 10,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: 30,
            user_id: None,
            token_env: "PLANWISE_TOKEN".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let database_path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("planwise")
            .join("sync.db");
        Self { database_path }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_retries"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        positive(
            &mut errors,
            "sync.periodic_interval_secs",
            self.sync.periodic_interval_secs,
        );
        positive(
            &mut errors,
            "sync.connectivity_debounce_ms",
            self.sync.connectivity_debounce_ms,
        );
        positive(
            &mut errors,
            "sync.mutation_debounce_ms",
            self.sync.mutation_debounce_ms,
        );
        positive(&mut errors, "sync.max_retries", u64::from(self.sync.max_retries));

        // --- connectivity ---
        let c = &self.connectivity;
        for (field, value) in [
            ("connectivity.sync_quality_threshold", c.sync_quality_threshold),
            ("connectivity.heavy_quality_threshold", c.heavy_quality_threshold),
        ] {
            if value > 100 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must be between 0 and 100, got {}", value),
                });
            }
        }
        if c.sync_quality_threshold > c.heavy_quality_threshold {
            errors.push(ValidationError {
                field: "connectivity.sync_quality_threshold".into(),
                message: format!(
                    "must not exceed heavy_quality_threshold ({} > {})",
                    c.sync_quality_threshold, c.heavy_quality_threshold
                ),
            });
        }
        positive(
            &mut errors,
            "connectivity.probe_interval_secs",
            c.probe_interval_secs,
        );

        // --- remote ---
        if let Some(ref base_url) = self.remote.base_url {
            if let Err(e) = url::Url::parse(base_url) {
                errors.push(ValidationError {
                    field: "remote.base_url".into(),
                    message: format!("invalid URL '{}': {}", base_url, e),
                });
            }
        }
        positive(
            &mut errors,
            "remote.request_timeout_secs",
            self.remote.request_timeout_secs,
        );
        if self.remote.token_env.trim().is_empty() {
            errors.push(ValidationError {
                field: "remote.token_env".into(),
                message: "must not be empty".into(),
            });
        }

        // --- storage ---
        if self.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.database_path".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn periodic_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.periodic_interval_secs = seconds;
        self
    }

    pub fn connectivity_debounce_ms(mut self, ms: u64) -> Self {
        self.config.sync.connectivity_debounce_ms = ms;
        self
    }

    pub fn mutation_debounce_ms(mut self, ms: u64) -> Self {
        self.config.sync.mutation_debounce_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.sync.max_retries = n;
        self
    }

    pub fn backoff_base_minutes(mut self, minutes: u32) -> Self {
        self.config.sync.backoff_base_minutes = minutes;
        self
    }

    pub fn default_priority(mut self, priority: i32) -> Self {
        self.config.sync.default_priority = priority;
        self
    }

    // --- connectivity ---

    pub fn sync_quality_threshold(mut self, quality: u8) -> Self {
        self.config.connectivity.sync_quality_threshold = quality;
        self
    }

    pub fn heavy_quality_threshold(mut self, quality: u8) -> Self {
        self.config.connectivity.heavy_quality_threshold = quality;
        self
    }

    pub fn probe_interval_secs(mut self, seconds: u64) -> Self {
        self.config.connectivity.probe_interval_secs = seconds;
        self
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = Some(url.into());
        self
    }

    pub fn remote_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.config.remote.user_id = Some(user_id.into());
        self
    }

    pub fn remote_token_env(mut self, name: impl Into<String>) -> Self {
        self.config.remote.token_env = name.into();
        self
    }

    pub fn request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.remote.request_timeout_secs = seconds;
        self
    }

    // --- storage ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.storage.database_path = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
