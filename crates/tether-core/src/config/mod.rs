//! Configuration parsing and management.
//!
//! Hosts describe leak thresholds, monitor cadence, and socket defaults in a
//! TOML file (or embed the same structure in their own config). Parsing is
//! fail-closed: a cadence of zero or a population ceiling of zero would make
//! the monitor spin or flag everything, so both are rejected at load time
//! rather than surfacing as runtime misbehavior.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::leak::LeakThresholds;
use crate::socket::HeartbeatConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TetherConfig {
    /// Leak-scan thresholds.
    #[serde(default)]
    pub leak: LeakThresholds,

    /// Periodic monitor settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Socket defaults.
    #[serde(default)]
    pub socket: SocketDefaults,
}

impl TetherConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML and
    /// [`ConfigError::Validation`] for values that would misbehave at
    /// runtime.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// The heartbeat settings the socket defaults describe, if enabled.
    #[must_use]
    pub fn heartbeat(&self) -> Option<HeartbeatConfig> {
        self.socket.heartbeat_enabled.then(|| HeartbeatConfig {
            interval: self.socket.heartbeat_interval,
            payload: self.socket.heartbeat_payload.clone().into_bytes(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.cadence.is_zero() {
            return Err(ConfigError::Validation(
                "monitor.cadence must be non-zero".to_string(),
            ));
        }
        if self.leak.max_population == 0 {
            return Err(ConfigError::Validation(
                "leak.max_population must be at least 1".to_string(),
            ));
        }
        if self.socket.heartbeat_enabled && self.socket.heartbeat_interval.is_zero() {
            return Err(ConfigError::Validation(
                "socket.heartbeat_interval must be non-zero when heartbeats are enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Periodic monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Whether the periodic monitor should run.
    #[serde(default = "default_monitor_enabled")]
    pub enabled: bool,

    /// Scan cadence.
    #[serde(default = "default_cadence")]
    #[serde(with = "humantime_serde")]
    pub cadence: Duration,
}

const fn default_monitor_enabled() -> bool {
    true
}

const fn default_cadence() -> Duration {
    Duration::from_secs(60)
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitor_enabled(),
            cadence: default_cadence(),
        }
    }
}

/// Socket defaults applied when a caller does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketDefaults {
    /// Whether connections get a heartbeat by default.
    #[serde(default = "default_heartbeat_enabled")]
    pub heartbeat_enabled: bool,

    /// Default heartbeat interval.
    #[serde(default = "default_heartbeat_interval")]
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// Default heartbeat payload.
    #[serde(default = "default_heartbeat_payload")]
    pub heartbeat_payload: String,
}

const fn default_heartbeat_enabled() -> bool {
    true
}

const fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_heartbeat_payload() -> String {
    "ping".to_string()
}

impl Default for SocketDefaults {
    fn default() -> Self {
        Self {
            heartbeat_enabled: default_heartbeat_enabled(),
            heartbeat_interval: default_heartbeat_interval(),
            heartbeat_payload: default_heartbeat_payload(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File read failed.
    #[error("failed to read config file: {0}")]
    Io(#[source] std::io::Error),

    /// TOML parse failed.
    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    /// TOML serialization failed.
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] toml::ser::Error),

    /// A parsed value would misbehave at runtime.
    #[error("invalid config: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses_with_defaults() {
        let config = TetherConfig::from_toml("").expect("defaults");
        assert!(config.monitor.enabled);
        assert_eq!(config.monitor.cadence, Duration::from_secs(60));
        assert_eq!(config.leak.max_population, 50);
        assert_eq!(config.socket.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn full_config_round_trips_through_toml() {
        let config = TetherConfig::from_toml(
            r#"
            [leak]
            max_population = 32
            stale_age = "2m"
            runaway_ceiling = 5000
            dormant_grace = "20m"

            [monitor]
            enabled = true
            cadence = "15s"

            [socket]
            heartbeat_enabled = true
            heartbeat_interval = "10s"
            heartbeat_payload = "hb"
            "#,
        )
        .expect("valid config");
        assert_eq!(config.leak.max_population, 32);
        assert_eq!(config.monitor.cadence, Duration::from_secs(15));

        let rendered = config.to_toml().expect("serializes");
        let reparsed = TetherConfig::from_toml(&rendered).expect("round trips");
        assert_eq!(reparsed.leak.max_population, 32);
        assert_eq!(reparsed.socket.heartbeat_payload, "hb");
    }

    #[test]
    fn zero_cadence_is_rejected() {
        let err = TetherConfig::from_toml(
            r#"
            [monitor]
            cadence = "0s"
            "#,
        )
        .expect_err("fail-closed");
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn zero_population_ceiling_is_rejected() {
        let err = TetherConfig::from_toml(
            r#"
            [leak]
            max_population = 0
            "#,
        )
        .expect_err("fail-closed");
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn heartbeat_helper_respects_the_enabled_flag() {
        let mut config = TetherConfig::default();
        let heartbeat = config.heartbeat().expect("enabled by default");
        assert_eq!(heartbeat.payload, b"ping");

        config.socket.heartbeat_enabled = false;
        assert!(config.heartbeat().is_none());
    }

    #[test]
    fn config_loads_from_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tether.toml");
        std::fs::write(&path, "[monitor]\ncadence = \"5s\"\n").expect("write config");

        let config = TetherConfig::from_file(&path).expect("loads");
        assert_eq!(config.monitor.cadence, Duration::from_secs(5));

        let missing = TetherConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
