//! Per-component settings sections of the configuration file.
//!
//! Every field has a default so a partial TOML file only needs to name what it overrides.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Absolute lifetime of a session, counted from its creation.
    pub lifetime_secs: u64,
    /// Maximum inactivity between two successful validations.
    pub idle_timeout_secs: u64,
    /// Hard cap on stored sessions; the least recently active one is evicted first.
    pub max_sessions: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            lifetime_secs: 24 * 60 * 60,
            idle_timeout_secs: 30 * 60,
            max_sessions: 10_000,
        }
    }
}

impl SessionSettings {
    pub fn lifetime(&self) -> Duration {
        secs(self.lifetime_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    /// Sliding window in which failed attempts are counted.
    pub window_secs: u64,
    /// Number of failures inside the window that triggers a block.
    pub max_failures: usize,
    pub block_secs: u64,
    pub max_attempts: usize,
    pub max_blocks: usize,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            window_secs: 5 * 60,
            max_failures: 5,
            block_secs: 15 * 60,
            max_attempts: 100_000,
            max_blocks: 10_000,
        }
    }
}

impl LoginSettings {
    pub fn window(&self) -> Duration {
        secs(self.window_secs)
    }

    pub fn block_duration(&self) -> Duration {
        secs(self.block_secs)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// A connection without activity for longer than this is evicted by the sweep.
    pub idle_timeout_secs: u64,
    pub max_connections: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 5 * 60,
            max_connections: 10_000,
        }
    }
}

impl ConnectionSettings {
    pub fn idle_timeout(&self) -> Duration {
        secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationSettings {
    /// Number of suspicious events after which an address is banned.
    pub suspicion_threshold: u32,
    pub max_banned: usize,
    pub max_suspicious: usize,
}

impl Default for ReputationSettings {
    fn default() -> Self {
        Self {
            suspicion_threshold: 3,
            max_banned: 100_000,
            max_suspicious: 100_000,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub capacity: usize,
    pub interval_secs: u64,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            capacity: 1440,
            interval_secs: 1,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorSettings {
    pub sweep_interval_secs: u64,
}

impl Default for JanitorSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    pub enabled: bool,
    pub bind_address: IpAddr,
    pub port: u16,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: IpAddr::from([127, 0, 0, 1]),
            port: 8080,
        }
    }
}

fn secs(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
