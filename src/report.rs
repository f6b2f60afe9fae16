//! Summary report generation.
//!
//! Reads the full store and the audit trail, then writes:
//! - per-node statistics (mean/max/min of temperature and humidity)
//! - the total anomaly count from the audit trail
//! - automatic suggestions for nodes whose peak temperature crossed the limit
//! - two SVG trend charts referenced from a Markdown document
//!
//! Failures never touch the store or the audit trail; they come back as a
//! [`ReportError`] for the caller to log once.

use crate::audit::count_anomalies;
use crate::chart::ChartContext;
use crate::config::{ReportConfig, StorageConfig};
use crate::error::ReportError;
use crate::reading::{thresholds, Reading};
use crate::store::ReadingStore;
use crate::trend::render_svg;
use chrono::Local;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Aggregates for one node, rounded to two decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatistics {
    /// Node identifier
    pub node_id: String,
    /// Number of readings
    pub count: usize,
    /// Mean temperature
    pub temp_mean: f64,
    /// Peak temperature
    pub temp_max: f64,
    /// Lowest temperature
    pub temp_min: f64,
    /// Mean humidity
    pub hum_mean: f64,
    /// Peak humidity
    pub hum_max: f64,
    /// Lowest humidity
    pub hum_min: f64,
}

/// Contents of a generated report.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Statistics per node, sorted by node id
    pub statistics: Vec<NodeStatistics>,
    /// Anomaly lines in the audit trail
    pub anomaly_count: usize,
    /// Suggestion lines
    pub suggestions: Vec<String>,
    /// Where the document was written
    pub document_path: PathBuf,
}

/// Result of [`ReportGenerator::generate`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// The store held no readings; nothing was written
    Skipped,
    /// Report written
    Generated(Report),
}

/// Builds the report from the store and the audit trail.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    store: ReadingStore,
    audit_path: PathBuf,
    output: ReportConfig,
}

impl ReportGenerator {
    /// Generator reading `store` and `audit_path`, writing to `output`.
    pub fn new(store: ReadingStore, audit_path: impl Into<PathBuf>, output: ReportConfig) -> Self {
        Self {
            store,
            audit_path: audit_path.into(),
            output,
        }
    }

    /// Generator wired from configuration sections.
    pub fn from_config(storage: &StorageConfig, report: &ReportConfig) -> Self {
        Self::new(
            ReadingStore::new(storage.data_path.clone()),
            storage.audit_path.clone(),
            report.clone(),
        )
    }

    /// Compute statistics, render charts and write the document.
    pub fn generate(&self) -> Result<ReportOutcome, ReportError> {
        info!("Starting report generation...");

        let readings = self.store.read_all()?;
        if readings.is_empty() {
            warn!("The data store is empty. Report cannot be generated.");
            return Ok(ReportOutcome::Skipped);
        }

        let statistics = compute_statistics(&readings);
        let anomaly_count =
            count_anomalies(&self.audit_path).map_err(|source| ReportError::Audit {
                path: self.audit_path.clone(),
                source,
            })?;
        let suggestions = suggestions(&statistics, anomaly_count);

        let mut chart = ChartContext::new();
        chart.rebuild(&readings);
        write_artifact(
            &self.output.temperature_chart_path,
            &render_svg("Historical temperature trend per node", &chart.temperature, chart.origin)?,
        )?;
        write_artifact(
            &self.output.humidity_chart_path,
            &render_svg("Historical humidity trend per node", &chart.humidity, chart.origin)?,
        )?;

        let report = Report {
            statistics,
            anomaly_count,
            suggestions,
            document_path: self.output.document_path.clone(),
        };
        write_artifact(&report.document_path, &self.render_document(&report)?)?;

        info!(
            path = %report.document_path.display(),
            nodes = report.statistics.len(),
            anomalies = report.anomaly_count,
            "Report '{}' generated successfully!",
            report.document_path.display()
        );
        Ok(ReportOutcome::Generated(report))
    }

    fn render_document(&self, report: &Report) -> Result<String, ReportError> {
        let doc_dir = report.document_path.parent();
        let mut doc = String::new();

        writeln!(doc, "# IIoT Monitoring Report\n")?;
        writeln!(doc, "Generated: {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"))?;

        writeln!(doc, "## 1. Statistics per node\n")?;
        writeln!(
            doc,
            "| Node | Readings | temp_mean | temp_max | temp_min | hum_mean | hum_max | hum_min |"
        )?;
        writeln!(doc, "|---|---:|---:|---:|---:|---:|---:|---:|")?;
        for s in &report.statistics {
            writeln!(
                doc,
                "| {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |",
                s.node_id.replace('|', "\\|"),
                s.count,
                s.temp_mean,
                s.temp_max,
                s.temp_min,
                s.hum_mean,
                s.hum_max,
                s.hum_min
            )?;
        }

        writeln!(doc, "\n## 2. Anomaly summary\n")?;
        writeln!(
            doc,
            "Total anomalies recorded in the log: {}\n",
            report.anomaly_count
        )?;

        writeln!(doc, "## 3. Automatic suggestions\n")?;
        if report.suggestions.is_empty() {
            writeln!(doc, "- No suggestions.")?;
        }
        for suggestion in &report.suggestions {
            writeln!(doc, "- {}", suggestion)?;
        }

        writeln!(doc, "\n## 4. Trend charts\n")?;
        writeln!(
            doc,
            "![Temperature trend]({})\n",
            link_target(doc_dir, &self.output.temperature_chart_path)
        )?;
        writeln!(
            doc,
            "![Humidity trend]({})",
            link_target(doc_dir, &self.output.humidity_chart_path)
        )?;
        Ok(doc)
    }
}

/// Per-node aggregates, sorted by node id.
pub fn compute_statistics(readings: &[Reading]) -> Vec<NodeStatistics> {
    let mut by_node: BTreeMap<&str, Vec<&Reading>> = BTreeMap::new();
    for reading in readings {
        by_node.entry(reading.node_id.as_str()).or_default().push(reading);
    }

    by_node
        .into_iter()
        .map(|(node_id, rows)| {
            let temps: Vec<f64> = rows.iter().map(|r| r.temperature).collect();
            let hums: Vec<f64> = rows.iter().map(|r| r.humidity).collect();
            NodeStatistics {
                node_id: node_id.to_string(),
                count: rows.len(),
                temp_mean: round2(mean(&temps)),
                temp_max: round2(max(&temps)),
                temp_min: round2(min(&temps)),
                hum_mean: round2(mean(&hums)),
                hum_max: round2(max(&hums)),
                hum_min: round2(min(&hums)),
            }
        })
        .collect()
}

/// Suggestion lines for the report.
///
/// One per node whose peak temperature exceeded the overheat limit; when the
/// audit trail holds no anomalies, a single "normal operation" line.
pub fn suggestions(statistics: &[NodeStatistics], anomaly_count: usize) -> Vec<String> {
    let mut lines: Vec<String> = statistics
        .iter()
        .filter(|s| s.temp_max > thresholds::TEMP_MAX)
        .map(|s| {
            format!(
                "{} showed overheating peaks ({:.2} °C). Suggestion: check the ventilation \
                 system or the workload of the associated equipment.",
                s.node_id, s.temp_max
            )
        })
        .collect();

    if anomaly_count == 0 {
        lines.push(
            "The system operated within normal parameters during the monitoring period."
                .to_string(),
        );
    }
    lines
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn link_target(doc_dir: Option<&Path>, artifact: &Path) -> String {
    let relative = doc_dir
        .and_then(|dir| artifact.strip_prefix(dir).ok())
        .filter(|rel| !rel.as_os_str().is_empty());
    match relative {
        Some(rel) => rel.display().to_string(),
        None => artifact.display().to_string(),
    }
}

fn write_artifact(path: &Path, contents: &str) -> Result<(), ReportError> {
    let output_err = |source| ReportError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(output_err)?;
        }
    }
    std::fs::write(path, contents).map_err(output_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reading(node: &str, t: f64, h: f64) -> Reading {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Reading::new(ts, node, t, h)
    }

    #[test]
    fn statistics_are_grouped_and_rounded() {
        let stats = compute_statistics(&[
            reading("N2", 20.0, 50.0),
            reading("N1", 21.0, 40.0),
            reading("N1", 22.0, 41.0),
            reading("N1", 22.0, 45.0),
        ]);

        assert_eq!(stats.len(), 2);
        let n1 = &stats[0];
        assert_eq!(n1.node_id, "N1");
        assert_eq!(n1.count, 3);
        assert_eq!(n1.temp_mean, 21.67);
        assert_eq!(n1.temp_max, 22.0);
        assert_eq!(n1.temp_min, 21.0);
        assert_eq!(n1.hum_mean, 42.0);
        assert_eq!(n1.hum_max, 45.0);
        assert_eq!(n1.hum_min, 40.0);
        assert_eq!(stats[1].node_id, "N2");
    }

    #[test]
    fn suggestions_name_overheated_nodes() {
        let stats = compute_statistics(&[
            reading("N1", 25.0, 50.0),
            reading("N1", 36.5, 50.0),
            reading("N2", 30.0, 50.0),
        ]);
        let lines = suggestions(&stats, 1);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("N1 showed overheating peaks (36.50 °C)"));
    }

    #[test]
    fn quiet_period_gets_normal_operation_line() {
        let stats = compute_statistics(&[reading("N1", 25.0, 50.0)]);
        let lines = suggestions(&stats, 0);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("normal parameters"));
    }

    #[test]
    fn link_targets_are_relative_to_document() {
        let dir = Path::new("/tmp/out");
        assert_eq!(
            link_target(Some(dir), Path::new("/tmp/out/temp.svg")),
            "temp.svg"
        );
        assert_eq!(
            link_target(Some(dir), Path::new("/elsewhere/temp.svg")),
            "/elsewhere/temp.svg"
        );
        assert_eq!(link_target(Some(Path::new("")), Path::new("temp.svg")), "temp.svg");
    }
}
