//! Operator console setup.
//!
//! Installs a `tracing-subscriber` registry with one `fmt` layer whose format
//! comes from `application.log_format` and whose level comes from
//! `application.log_level`. `RUST_LOG`, when set, replaces the configured
//! level filter.
//!
//! The durable audit trail is written by [`crate::audit::AuditLog`], which also
//! emits every entry through `tracing`, so entries reach this console too.
//!
//! # Example
//! ```no_run
//! use sensor_daq::{config::MonitorConfig, logging};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MonitorConfig::default();
//! logging::init_from_config(&config)?;
//! info!("Application started");
//! # Ok(())
//! # }
//! ```

use crate::config::MonitorConfig;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Multi-line, coloured
    Pretty,
    /// One line per event, no colours
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "Invalid log_format '{}'. Must be one of: pretty, compact, json",
                s
            )),
        }
    }
}

/// Resolved console settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingConfig {
    /// Maximum level when `RUST_LOG` is unset
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
}

impl TracingConfig {
    /// Settings from the `application` section.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, String> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: config.application.log_format.parse()?,
        })
    }
}

/// Initialize the console from the application configuration.
pub fn init_from_config(config: &MonitorConfig) -> Result<(), String> {
    init(TracingConfig::from_config(config)?)
}

/// Install the global subscriber.
///
/// Does nothing if a global subscriber is already installed.
pub fn init(config: TracingConfig) -> Result<(), String> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    tracing_subscriber::registry()
        .with(format_layer(config.format).with_filter(filter))
        .try_init()
        .map_err(|e| format!("Failed to initialize tracing: {}", e))
}

fn format_layer(format: OutputFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        OutputFormat::Pretty => fmt::layer().pretty().boxed(),
        OutputFormat::Compact => fmt::layer().compact().with_ansi(false).boxed(),
        OutputFormat::Json => fmt::layer().json().boxed(),
    }
}

/// Parse a level name (case-insensitive).
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}
