//! Durable audit trail of anomalies and pipeline diagnostics.
//!
//! Every entry is appended as one line to the audit file and emitted as a
//! `tracing` event, so it is both persisted and immediately visible on the
//! operator console. Line format:
//!
//! ```text
//! 2024-05-01 12:00:05,123 - WARNING - [ANOMALY] Node: N2 - Overheat! Temperature: 35.0°C
//! ```
//!
//! The report generator reads the file back as plain lines and counts those
//! containing [`ANOMALY_MARKER`].

use crate::reading::AnomalyEvent;
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Token that marks anomaly lines.
pub const ANOMALY_MARKER: &str = "[ANOMALY]";

/// What the marker becomes inside non-anomaly entries.
const NEUTRALIZED_MARKER: &str = "(ANOMALY)";

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    /// Lifecycle information (connected, reconnected, ...)
    Info,
    /// Anomalies and retry notices
    Warning,
    /// Recovered pipeline errors
    Error,
}

impl AuditLevel {
    fn as_str(self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Warning => "WARNING",
            AuditLevel::Error => "ERROR",
        }
    }
}

/// One thing to record.
#[derive(Debug, Clone, Copy)]
pub enum AuditEntry<'a> {
    /// A threshold violation
    Anomaly(&'a AnomalyEvent),
    /// A free-form diagnostic
    Message(AuditLevel, &'a str),
}

/// Append-only audit trail writer.
pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    /// Open (or create) the audit file for appending.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Audit file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one entry in the file and on the console.
    ///
    /// Entries are written in call order; each line is flushed to disk before
    /// this returns.
    pub fn record(&mut self, entry: AuditEntry<'_>) -> std::io::Result<()> {
        let (level, message) = match entry {
            AuditEntry::Anomaly(event) => {
                let message = format!(
                    "{} {}",
                    ANOMALY_MARKER,
                    escape_controls(&event.describe())
                );
                warn!(
                    node_id = %event.node_id,
                    kind = %event.kind,
                    value = event.value,
                    threshold = event.threshold,
                    "{}",
                    message
                );
                (AuditLevel::Warning, message)
            }
            AuditEntry::Message(level, text) => {
                // Only anomaly entries may carry the marker.
                let message =
                    escape_controls(text).replace(ANOMALY_MARKER, NEUTRALIZED_MARKER);
                match level {
                    AuditLevel::Info => info!("{}", message),
                    AuditLevel::Warning => warn!("{}", message),
                    AuditLevel::Error => error!("{}", message),
                }
                (level, message)
            }
        };

        let line = format!(
            "{} - {} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            level.as_str(),
            message
        );
        self.file.write_all(line.as_bytes())?;
        self.file.sync_data()
    }

    /// Record an anomaly event.
    pub fn anomaly(&mut self, event: &AnomalyEvent) -> std::io::Result<()> {
        self.record(AuditEntry::Anomaly(event))
    }

    /// Record an informational message.
    pub fn info(&mut self, message: &str) -> std::io::Result<()> {
        self.record(AuditEntry::Message(AuditLevel::Info, message))
    }

    /// Record a warning.
    pub fn warning(&mut self, message: &str) -> std::io::Result<()> {
        self.record(AuditEntry::Message(AuditLevel::Warning, message))
    }

    /// Record a recovered error.
    pub fn error(&mut self, message: &str) -> std::io::Result<()> {
        self.record(AuditEntry::Message(AuditLevel::Error, message))
    }
}

/// Escape control characters (`\n`, `\r`, ...) so an entry stays on one line.
fn escape_controls(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() {
            escaped.extend(c.escape_default());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Count anomaly lines in an audit file. A missing file counts as zero.
pub fn count_anomalies(path: &Path) -> std::io::Result<usize> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut count = 0;
    for line in BufReader::new(file).lines() {
        if line?.contains(ANOMALY_MARKER) {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{AnomalyKind, Reading};
    use chrono::NaiveDate;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    fn event(kind: AnomalyKind) -> AnomalyEvent {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        AnomalyEvent::from_reading(&Reading::new(ts, "N2", 35.0, 30.0), kind)
    }

    #[test]
    #[traced_test]
    fn entries_reach_file_and_console_in_order() {
        let dir = tempdir().unwrap();
        let mut log = AuditLog::open(dir.path().join("audit.log")).unwrap();

        log.info("Connected to COM8").unwrap();
        log.anomaly(&event(AnomalyKind::Overheat)).unwrap();
        log.error("SyntaxError: expected value").unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(" - INFO - Connected to COM8"));
        assert!(lines[1].ends_with(" - WARNING - [ANOMALY] Node: N2 - Overheat! Temperature: 35.0°C"));
        assert!(lines[2].contains(" - ERROR - SyntaxError"));

        // Timestamp prefix: "YYYY-MM-DD HH:MM:SS,mmm"
        assert_eq!(lines[0].find(" - "), Some(23));

        assert!(logs_contain("Connected to COM8"));
        assert!(logs_contain("[ANOMALY] Node: N2 - Overheat!"));
        assert!(logs_contain("SyntaxError: expected value"));
    }

    #[test]
    fn reopening_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        AuditLog::open(&path).unwrap().info("first").unwrap();
        AuditLog::open(&path).unwrap().info("second").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn counts_only_marker_lines() {
        let dir = tempdir().unwrap();
        let mut log = AuditLog::open(dir.path().join("audit.log")).unwrap();
        log.info("Connected").unwrap();
        log.anomaly(&event(AnomalyKind::Overheat)).unwrap();
        log.anomaly(&event(AnomalyKind::LowHumidity)).unwrap();
        log.warning("Port not found, retrying").unwrap();

        assert_eq!(count_anomalies(log.path()).unwrap(), 2);
    }

    #[test]
    fn messages_cannot_forge_anomaly_lines() {
        let dir = tempdir().unwrap();
        let mut log = AuditLog::open(dir.path().join("audit.log")).unwrap();
        log.error("SyntaxError: bad. Line: '[ANOMALY] garbage'").unwrap();
        log.info("two\nlines\r").unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Line: '(ANOMALY) garbage'"));
        assert!(lines[1].ends_with(" - INFO - two\\nlines\\r"));
        assert_eq!(count_anomalies(log.path()).unwrap(), 0);
    }

    #[test]
    fn node_ids_with_newlines_stay_on_one_line() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let reading = Reading::new(ts, "N1\n[ANOMALY] fake", 35.0, 50.0);
        let dir = tempdir().unwrap();
        let mut log = AuditLog::open(dir.path().join("audit.log")).unwrap();
        log.anomaly(&AnomalyEvent::from_reading(&reading, AnomalyKind::Overheat))
            .unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("Node: N1\\n[ANOMALY] fake - Overheat!"));
        assert_eq!(count_anomalies(log.path()).unwrap(), 1);
    }

    #[test]
    fn missing_audit_file_counts_zero() {
        let dir = tempdir().unwrap();
        assert_eq!(count_anomalies(&dir.path().join("none.log")).unwrap(), 0);
    }
}
