//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (optional; every field has a default)
//! 2. Environment variables (prefixed with `SENSOR_DAQ_`, `__` separates sections)
//!
//! # Example
//! ```no_run
//! use sensor_daq::config::MonitorConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MonitorConfig::load_from("config/sensor_daq.toml")?;
//! config.validate()?;
//! println!("Serial port: {}", config.serial.port);
//! # Ok(())
//! # }
//! ```

use crate::error::MonitorError;
use crate::logging::OutputFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SENSOR_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial link settings
    #[serde(default)]
    pub serial: SerialConfig,
    /// Store and audit trail locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Report output locations
    #[serde(default)]
    pub report: ReportConfig,
    /// Live chart settings
    #[serde(default)]
    pub chart: ChartConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Console format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM8")
    #[serde(default = "default_port")]
    pub port: String,
    /// Communication speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Driver-level read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Delay between connection attempts in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Give up after this many failed attempts (absent = retry forever)
    #[serde(default)]
    pub max_connect_attempts: Option<u32>,
    /// How long one poll waits for a line before reporting "no data"
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Persistence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// CSV store of accepted readings
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Audit trail of anomalies and diagnostics
    #[serde(default = "default_audit_path")]
    pub audit_path: PathBuf,
}

/// Report configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Markdown report document
    #[serde(default = "default_report_path")]
    pub document_path: PathBuf,
    /// Temperature trend image
    #[serde(default = "default_temperature_chart")]
    pub temperature_chart_path: PathBuf,
    /// Humidity trend image
    #[serde(default = "default_humidity_chart")]
    pub humidity_chart_path: PathBuf,
}

/// Live chart configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Re-read interval for the store in milliseconds
    #[serde(default = "default_refresh_ms")]
    pub refresh_interval_ms: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_port() -> String {
    "COM8".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_data_path() -> PathBuf {
    PathBuf::from("dados_sensores.csv")
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("anomalias.log")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("relatorio.md")
}

fn default_temperature_chart() -> PathBuf {
    PathBuf::from("grafico_temperatura.svg")
}

fn default_humidity_chart() -> PathBuf {
    PathBuf::from("grafico_umidade.svg")
}

fn default_refresh_ms() -> u64 {
    2000
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_connect_attempts: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            audit_path: default_audit_path(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            document_path: default_report_path(),
            temperature_chart_path: default_temperature_chart(),
            humidity_chart_path: default_humidity_chart(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_ms(),
        }
    }
}

impl SerialConfig {
    /// Poll window as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reconnect delay as a `Duration`.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Driver timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl MonitorConfig {
    /// Layered figment: defaults, then the TOML file, then the environment.
    ///
    /// A missing file is not an error; the defaults apply.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(MonitorConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from a specific file path plus environment overrides
    ///
    /// Example: `SENSOR_DAQ_SERIAL__PORT=/dev/ttyACM0`
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, MonitorError> {
        Ok(Self::figment(path).extract()?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), MonitorError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(MonitorError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.application
            .log_format
            .parse::<OutputFormat>()
            .map_err(MonitorError::Configuration)?;

        if self.serial.port.trim().is_empty() {
            return Err(MonitorError::Configuration(
                "Serial port must not be empty".to_string(),
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(MonitorError::Configuration(
                "Invalid baud_rate 0".to_string(),
            ));
        }

        if self.serial.poll_interval_ms == 0 {
            return Err(MonitorError::Configuration(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.serial.max_connect_attempts == Some(0) {
            return Err(MonitorError::Configuration(
                "max_connect_attempts must be at least 1 when set".to_string(),
            ));
        }

        if self.storage.data_path == self.storage.audit_path {
            return Err(MonitorError::Configuration(format!(
                "Store and audit trail share the same path '{}'",
                self.storage.data_path.display()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_field_deployment() {
        let config = MonitorConfig::default();
        assert_eq!(config.serial.port, "COM8");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.storage.data_path, PathBuf::from("dados_sensores.csv"));
        assert_eq!(config.storage.audit_path, PathBuf::from("anomalias.log"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let config = MonitorConfig::load_from("does_not_exist.toml")
                .map_err(|e| e.to_string())?;
            assert_eq!(config, MonitorConfig::default());
            Ok(())
        });
    }

    #[test]
    fn toml_and_env_layers_merge() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sensor_daq.toml",
                r#"
                    [serial]
                    port = "/dev/ttyUSB0"
                    baud_rate = 9600

                    [storage]
                    data_path = "readings.csv"
                "#,
            )?;
            jail.set_env("SENSOR_DAQ_SERIAL__PORT", "/dev/ttyACM1");
            jail.set_env("SENSOR_DAQ_APPLICATION__LOG_LEVEL", "debug");
            jail.set_env("SENSOR_DAQ_APPLICATION__LOG_FORMAT", "json");

            let config = MonitorConfig::load_from("sensor_daq.toml")
                .map_err(|e| e.to_string())?;
            assert_eq!(config.serial.port, "/dev/ttyACM1");
            assert_eq!(config.serial.baud_rate, 9600);
            assert_eq!(config.storage.data_path, PathBuf::from("readings.csv"));
            assert_eq!(config.storage.audit_path, PathBuf::from("anomalias.log"));
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.application.log_format, "json");
            Ok(())
        });
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let mut config = MonitorConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_format_is_validated() {
        let mut config = MonitorConfig::default();
        config.application.log_format = "JSON".to_string();
        assert!(config.validate().is_ok());

        config.application.log_format = "xml".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn shared_store_and_audit_path_is_rejected() {
        let mut config = MonitorConfig::default();
        config.storage.audit_path = config.storage.data_path.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("same path"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut config = MonitorConfig::default();
        config.serial.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
