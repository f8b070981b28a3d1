//! Configuration management for the Glowmarkt bridge
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The location can be overridden with the
//! `GLOWMARKT_CONFIG` environment variable.

use crate::error::{GlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

pub use defaults::{DEFAULT_APPLICATION_ID, DEFAULT_CALORIFIC_VALUE, DEFAULT_VOLUME_CORRECTION};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Glowmarkt account and API endpoint
    pub glowmarkt: GlowmarktConfig,

    /// Gas kWh to m³ conversion constants
    pub gas: GasConfig,

    /// Polling cadence and refresh windows
    pub polling: PollingConfig,

    /// Live CAD feed over MQTT
    pub mqtt: MqttConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// IANA timezone used for daily reporting windows
    pub timezone: String,

    /// JSON file the refreshed token is persisted into
    pub state_file: String,
}

/// Glowmarkt account credentials and endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlowmarktConfig {
    /// REST API base URL
    pub base_url: String,

    /// Application id sent as the `applicationId` header
    pub application_id: String,

    /// Bright app username (email)
    pub username: String,

    /// Bright app password
    pub password: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Gas volume conversion constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Volume correction factor
    pub volume_correction: f64,

    /// Calorific value in MJ/m³
    pub calorific_value: f64,
}

/// Minute-of-hour range (inclusive on both ends)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshWindow {
    pub start_minute: u32,
    pub end_minute: u32,
}

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between update cycles
    pub interval_secs: u64,

    /// Minutes of the hour in which upstream data may have been finalised
    pub refresh_windows: Vec<RefreshWindow>,

    /// Local time (HH:MM) at or before which the daily window is yesterday
    pub yesterday_cutoff: String,
}

/// MQTT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Whether to subscribe to the CAD feed
    pub enabled: bool,

    /// Broker host
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Topic template, `{hardwareId}` is replaced with the CAD hardware id
    pub topic_template: String,

    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first location that exists
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("GLOWMARKT_CONFIG")
            && !path.trim().is_empty()
        {
            return Self::from_file(path.trim());
        }

        let default_paths = [
            "glowmarkt_config.yaml",
            "/data/glowmarkt_config.yaml",
            "/etc/glowmarkt/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| GlowError::validation("timezone", "Unknown IANA timezone"))
    }

    /// Parsed yesterday cutoff
    pub fn yesterday_cutoff(&self) -> Result<chrono::NaiveTime> {
        chrono::NaiveTime::parse_from_str(&self.polling.yesterday_cutoff, "%H:%M")
            .map_err(|_| GlowError::validation("polling.yesterday_cutoff", "Expected HH:MM"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.glowmarkt.base_url.trim().is_empty() {
            return Err(GlowError::validation(
                "glowmarkt.base_url",
                "Base URL cannot be empty",
            ));
        }

        if self.glowmarkt.application_id.trim().is_empty() {
            return Err(GlowError::validation(
                "glowmarkt.application_id",
                "Application id cannot be empty",
            ));
        }

        if self.glowmarkt.username.trim().is_empty() || self.glowmarkt.password.is_empty() {
            return Err(GlowError::validation(
                "glowmarkt.username",
                "Username and password are required",
            ));
        }

        if self.glowmarkt.request_timeout_secs == 0 {
            return Err(GlowError::validation(
                "glowmarkt.request_timeout_secs",
                "Must be greater than 0",
            ));
        }

        if !(self.gas.volume_correction > 0.0) {
            return Err(GlowError::validation(
                "gas.volume_correction",
                "Must be positive",
            ));
        }

        if !(self.gas.calorific_value > 0.0) {
            return Err(GlowError::validation(
                "gas.calorific_value",
                "Must be positive",
            ));
        }

        if self.polling.interval_secs == 0 {
            return Err(GlowError::validation(
                "polling.interval_secs",
                "Must be greater than 0",
            ));
        }

        for w in &self.polling.refresh_windows {
            if w.start_minute > 59 || w.end_minute > 59 || w.start_minute > w.end_minute {
                return Err(GlowError::validation(
                    "polling.refresh_windows",
                    "Minutes must be within 0..=59 and start <= end",
                ));
            }
        }

        self.yesterday_cutoff()?;
        self.tz()?;

        if self.mqtt.enabled {
            if self.mqtt.host.trim().is_empty() || self.mqtt.port == 0 {
                return Err(GlowError::validation(
                    "mqtt.host",
                    "Host and port are required when MQTT is enabled",
                ));
            }
            if !self.mqtt.topic_template.contains("{hardwareId}") {
                return Err(GlowError::validation(
                    "mqtt.topic_template",
                    "Template must contain {hardwareId}",
                ));
            }
        }

        Ok(())
    }
}
