use std::net::SocketAddr;

use chrono::{Duration, FixedOffset};
use domain::services::{EngineSettings, TriggerPolicy};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Push delivery configuration
    #[serde(default)]
    pub fcm: FcmConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

/// Which store backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local store; state is lost on restart.
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Background cadence and attendance engine tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Run the background jobs at all (disabled in tests)
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    #[serde(default = "default_queue_interval")]
    pub queue_interval_secs: u64,

    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,

    /// How long after dispatch a location sample still counts
    #[serde(default = "default_grace_window")]
    pub grace_window_secs: u64,

    /// Tolerance for device clocks behind the server: captures this long
    /// before dispatch still count
    #[serde(default)]
    pub capture_skew_secs: u64,

    /// `midpoint` or `end_of_class`
    #[serde(default = "default_trigger_policy")]
    pub trigger_policy: String,

    /// Campus offset from UTC; class times are written in this local time
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_job_retention_days")]
    pub job_retention_days: u32,

    #[serde(default = "default_sample_retention_days")]
    pub sample_retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: default_scan_interval(),
            queue_interval_secs: default_queue_interval(),
            purge_interval_secs: default_purge_interval(),
            grace_window_secs: default_grace_window(),
            capture_skew_secs: 0,
            trigger_policy: default_trigger_policy(),
            utc_offset_minutes: 0,
            job_retention_days: default_job_retention_days(),
            sample_retention_days: default_sample_retention_days(),
        }
    }
}

impl SchedulerConfig {
    /// Engine settings derived from this section.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigValidationError> {
        let trigger_policy: TriggerPolicy = self.trigger_policy.parse().map_err(|_| {
            ConfigValidationError::InvalidValue(format!(
                "scheduler.trigger_policy must be 'midpoint' or 'end_of_class', got '{}'",
                self.trigger_policy
            ))
        })?;
        let utc_offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .filter(|_| self.utc_offset_minutes.abs() <= 14 * 60)
            .ok_or_else(|| {
                ConfigValidationError::InvalidValue(format!(
                    "scheduler.utc_offset_minutes must be within +/-840, got {}",
                    self.utc_offset_minutes
                ))
            })?;

        if self.capture_skew_secs > self.grace_window_secs {
            return Err(ConfigValidationError::InvalidValue(format!(
                "scheduler.capture_skew_secs ({}) cannot exceed grace_window_secs ({})",
                self.capture_skew_secs, self.grace_window_secs
            )));
        }

        Ok(EngineSettings {
            grace_window: Duration::seconds(self.grace_window_secs as i64),
            capture_skew: Duration::seconds(self.capture_skew_secs as i64),
            trigger_policy,
            utc_offset,
            job_retention: Duration::days(i64::from(self.job_retention_days)),
            sample_retention: Duration::days(i64::from(self.sample_retention_days)),
        })
    }
}

/// Firebase Cloud Messaging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FcmConfig {
    /// Send real pushes; otherwise requests are only logged
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub project_id: String,

    /// Service account JSON, inline or as a file path
    #[serde(default)]
    pub credentials: String,

    #[serde(default = "default_fcm_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_fcm_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_true")]
    pub high_priority: bool,
}

impl Default for FcmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            project_id: String::new(),
            credentials: String::new(),
            timeout_ms: default_fcm_timeout_ms(),
            max_retries: default_fcm_max_retries(),
            high_priority: true,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_true() -> bool {
    true
}
fn default_scan_interval() -> u64 {
    60
}
fn default_queue_interval() -> u64 {
    15
}
fn default_purge_interval() -> u64 {
    3600
}
fn default_grace_window() -> u64 {
    300
}
fn default_trigger_policy() -> String {
    "midpoint".to_string()
}
fn default_job_retention_days() -> u32 {
    2
}
fn default_sample_retention_days() -> u32 {
    30
}
fn default_fcm_timeout_ms() -> u64 {
    10_000
}
fn default_fcm_max_retries() -> u32 {
    3
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml
    /// 2. config/local.toml (optional, not in git)
    /// 3. Environment variables with ATT__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("ATT").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration from embedded defaults plus overrides, without
    /// touching the file system or validating.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""

            [storage]
            backend = "memory"

            [logging]
            level = "info"
            format = "pretty"

            [scheduler]
            enabled = false
            grace_window_secs = 300
            trigger_policy = "midpoint"
            utc_offset_minutes = 0

            [fcm]
            enabled = false
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.storage.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "ATT__DATABASE__URL must be set when storage.backend is postgres".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        let scheduler = &self.scheduler;
        for (name, value) in [
            ("scan_interval_secs", scheduler.scan_interval_secs),
            ("queue_interval_secs", scheduler.queue_interval_secs),
            ("purge_interval_secs", scheduler.purge_interval_secs),
            ("grace_window_secs", scheduler.grace_window_secs),
        ] {
            if value == 0 {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "scheduler.{} must be positive",
                    name
                )));
            }
        }
        scheduler.engine_settings()?;

        if self.fcm.enabled && (self.fcm.project_id.is_empty() || self.fcm.credentials.is_empty())
        {
            return Err(ConfigValidationError::MissingRequired(
                "fcm.project_id and fcm.credentials are required when fcm.enabled".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
