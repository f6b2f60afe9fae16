//! CLI Entry Point for sensor_daq
//!
//! Provides command-line interface for:
//! - Ingesting sensor readings from the serial link until Ctrl+C
//! - Generating the summary report from the persisted data
//!
//! # Usage
//!
//! Ingest (optionally with the live chart window and a report at the end):
//! ```bash
//! sensor_daq run --port /dev/ttyUSB0 --gui --report
//! ```
//!
//! Generate the report from existing files:
//! ```bash
//! sensor_daq report
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensor_daq::audit::AuditLog;
use sensor_daq::config::MonitorConfig;
use sensor_daq::link::ReconnectPolicy;
use sensor_daq::logging;
use sensor_daq::report::{ReportGenerator, ReportOutcome};
use sensor_daq::store::ReadingStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sensor_daq")]
#[command(about = "Serial sensor ingestion with anomaly detection and reporting", long_about = None)]
struct Cli {
    /// Configuration file (missing file = defaults)
    #[arg(long, global = true, default_value = "config/sensor_daq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest readings until interrupted
    Run {
        /// Serial port override
        #[arg(long)]
        port: Option<String>,

        /// Baud rate override
        #[arg(long)]
        baud: Option<u32>,

        /// Show the live chart window
        #[arg(long)]
        gui: bool,

        /// Generate the report after ingestion stops
        #[arg(long)]
        report: bool,
    },

    /// Generate the report from the persisted data
    Report,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = MonitorConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load '{}'", cli.config.display()))?;
    if let Commands::Run { port, baud, .. } = &cli.command {
        if let Some(port) = port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = baud {
            config.serial.baud_rate = *baud;
        }
    }
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run { gui, report, .. } => {
            run(&config, gui)?;
            if report && !generate_report(&config) {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Report => Ok(if generate_report(&config) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }),
    }
}

/// Run ingestion on a single-threaded runtime, optionally beside the chart window.
fn run(config: &MonitorConfig, gui: bool) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    if !gui {
        return ingest_blocking(config.clone(), shutdown_tx, shutdown_rx);
    }

    #[cfg(feature = "gui")]
    {
        let worker_config = config.clone();
        let worker_tx = shutdown_tx.clone();
        let worker =
            std::thread::spawn(move || ingest_blocking(worker_config, worker_tx, shutdown_rx));

        let store = ReadingStore::new(config.storage.data_path.clone());
        let refresh = std::time::Duration::from_millis(config.chart.refresh_interval_ms);
        if let Err(e) = sensor_daq::gui::run(store, refresh) {
            error!(error = %e, "Live chart window failed");
        }

        // Closing the window stops ingestion as well.
        shutdown_tx.send_replace(true);
        return worker
            .join()
            .map_err(|_| anyhow::anyhow!("Ingestion thread panicked"))?;
    }

    #[cfg(not(feature = "gui"))]
    {
        drop((shutdown_tx, shutdown_rx));
        Err(sensor_daq::error::MonitorError::FeatureNotEnabled("gui".to_string()).into())
    }
}

fn ingest_blocking(
    config: MonitorConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async move {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Program interrupted by user.");
                shutdown_tx.send_replace(true);
            }
        });
        ingest(&config, shutdown_rx).await
    })
}

async fn ingest(config: &MonitorConfig, shutdown: watch::Receiver<bool>) -> Result<()> {
    let store = ReadingStore::new(config.storage.data_path.clone());
    store.initialize()?;
    let audit = AuditLog::open(config.storage.audit_path.clone()).with_context(|| {
        format!(
            "Failed to open audit trail '{}'",
            config.storage.audit_path.display()
        )
    })?;

    let policy = ReconnectPolicy {
        delay: config.serial.reconnect_delay(),
        max_attempts: config.serial.max_connect_attempts,
    };

    #[cfg(feature = "serial")]
    {
        use sensor_daq::ingest::IngestionLoop;
        use sensor_daq::link::{ConnectionManager, SerialConnector};

        let connector = SerialConnector::from_config(&config.serial);
        let link = ConnectionManager::new(connector, policy, config.serial.poll_interval());
        let mut pipeline = IngestionLoop::new(link, store, audit);
        let stats = pipeline.run(shutdown).await?;
        info!(
            readings = stats.readings,
            anomalies = stats.anomalies,
            "Serial connection closed."
        );
        Ok(())
    }

    #[cfg(not(feature = "serial"))]
    {
        drop((store, audit, policy, shutdown));
        Err(sensor_daq::error::MonitorError::FeatureNotEnabled("serial".to_string()).into())
    }
}

/// Generate the report, logging the outcome once. Returns `false` on failure.
fn generate_report(config: &MonitorConfig) -> bool {
    let generator = ReportGenerator::from_config(&config.storage, &config.report);
    match generator.generate() {
        Ok(ReportOutcome::Generated(_)) | Ok(ReportOutcome::Skipped) => true,
        Err(e) => {
            error!(error = %e, "An error occurred while generating the report: {}", e);
            false
        }
    }
}
