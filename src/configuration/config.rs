use super::types::*;
use crate::error_handling::types::ConfigError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable pointing at a configuration file.
pub const CONFIG_ENV_VAR: &str = "WARDEN_CONFIG";

/// Longest duration accepted for any `*_secs` setting (ten years).
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Application configuration structure that defines all runtime parameters.
///
/// The configuration is read from a TOML file. Each section maps onto one component of the
/// engine; omitted sections and fields fall back to their defaults.
///
/// # Examples
///
/// ```
/// use warden::configuration::config::Config;
///
/// let config = Config::from_toml_str("[login]\nmax_failures = 3\n").unwrap();
/// assert_eq!(config.login.max_failures, 3);
/// assert_eq!(config.sessions.idle_timeout_secs, 30 * 60);
/// ```
///
/// # Fields Overview
///
/// - `sessions`: lifetime, idle timeout and cap of the session table
/// - `login`: brute-force window, threshold and block duration
/// - `connections`: idle timeout and cap of the live connection table
/// - `reputation`: suspicion threshold and caps of the ban tables
/// - `metrics`: history capacity and sampling period
/// - `janitor`: sweep period
/// - `web`: dashboard binding
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sessions: SessionSettings,
    pub login: LoginSettings,
    pub connections: ConnectionSettings,
    pub reputation: ReputationSettings,
    pub metrics: MetricsSettings,
    pub janitor: JanitorSettings,
    pub web: WebSettings,
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_secs("sessions.lifetime_secs", self.sessions.lifetime_secs)?;
        check_secs("sessions.idle_timeout_secs", self.sessions.idle_timeout_secs)?;
        check_secs("login.window_secs", self.login.window_secs)?;
        check_secs("login.block_secs", self.login.block_secs)?;
        check_secs("connections.idle_timeout_secs", self.connections.idle_timeout_secs)?;
        check_secs("metrics.interval_secs", self.metrics.interval_secs)?;
        check_secs("janitor.sweep_interval_secs", self.janitor.sweep_interval_secs)?;

        check_positive("sessions.max_sessions", self.sessions.max_sessions)?;
        check_positive("login.max_failures", self.login.max_failures)?;
        check_positive("login.max_attempts", self.login.max_attempts)?;
        check_positive("login.max_blocks", self.login.max_blocks)?;
        check_positive("connections.max_connections", self.connections.max_connections)?;
        check_positive(
            "reputation.suspicion_threshold",
            self.reputation.suspicion_threshold as usize,
        )?;
        check_positive("reputation.max_banned", self.reputation.max_banned)?;
        check_positive("reputation.max_suspicious", self.reputation.max_suspicious)?;
        check_positive("metrics.capacity", self.metrics.capacity)?;

        if self.web.enabled && self.web.port < 1024 {
            return Err(ConfigError::NotInRange(format!(
                "web.port must be within 1024-65535, got {}",
                self.web.port
            )));
        }

        Ok(())
    }
}

fn check_secs(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_DURATION_SECS {
        return Err(ConfigError::NotInRange(format!(
            "{} must be within 1-{}, got {}",
            name, MAX_DURATION_SECS, value
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NotInRange(format!("{} must be positive", name)));
    }
    Ok(())
}
