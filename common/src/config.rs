// Configuration management with layered configuration (file, env)

use crate::models::MissedFirePolicy;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub scheduler: SchedulerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    /// Refuse to start without the database instead of falling back to memory
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// When false, deliveries are logged instead of sent
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_smtp_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_interval_seconds: u64,
    #[serde(default)]
    pub missed_fire_policy: MissedFirePolicy,
    pub max_concurrent_deliveries: usize,
    pub shutdown_grace_seconds: u64,
    /// Pause between consecutive immediate sends of one batch
    #[serde(default)]
    pub immediate_send_pause_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Built-in defaults so a bare environment still yields a full config
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.database.min_connections > self.database.max_connections {
            return Err("Database min_connections cannot exceed max_connections".to_string());
        }

        if self.smtp.enabled {
            if self.smtp.host.is_empty() {
                return Err("SMTP host cannot be empty when SMTP is enabled".to_string());
            }
            if self.smtp.port == 0 {
                return Err("SMTP port must be greater than 0".to_string());
            }
            if self.smtp.from_address.is_empty() {
                return Err("SMTP from_address cannot be empty".to_string());
            }
        }

        // Fire times have minute resolution, a longer interval could skip a minute
        if self.scheduler.tick_interval_seconds == 0 || self.scheduler.tick_interval_seconds > 60 {
            return Err("Scheduler tick_interval_seconds must be between 1 and 60".to_string());
        }
        if self.scheduler.max_concurrent_deliveries == 0 {
            return Err("Scheduler max_concurrent_deliveries must be greater than 0".to_string());
        }

        if self.observability.log_level.is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/outreach".to_string(),
                max_connections: 10,
                min_connections: 1,
                connect_timeout_seconds: 5,
                required: false,
            },
            smtp: SmtpConfig {
                enabled: false,
                host: "smtp.gmail.com".to_string(),
                port: 587,
                username: String::new(),
                password: String::new(),
                from_address: "outreach@example.com".to_string(),
                from_name: None,
                timeout_seconds: 30,
            },
            scheduler: SchedulerConfig {
                tick_interval_seconds: 30,
                missed_fire_policy: MissedFirePolicy::CatchUp,
                max_concurrent_deliveries: 8,
                shutdown_grace_seconds: 2,
                immediate_send_pause_ms: 2000,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: None,
            },
        }
    }
}
