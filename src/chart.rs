//! Live chart model.
//!
//! [`ChartContext`] is the rendering context of the live view: it owns the
//! per-node series and the threshold guides and is refreshed by re-reading the
//! store. It never touches the ingestion pipeline; a missing or empty store just
//! yields an empty chart.

use crate::error::StoreError;
use crate::reading::{thresholds, Reading};
use crate::store::ReadingStore;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Points of one node, `[seconds since first sample, value]`.
pub type SeriesPoints = Vec<[f64; 2]>;

/// A horizontal guide line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Guide {
    /// Legend label
    pub label: &'static str,
    /// Y value
    pub value: f64,
}

/// One panel (temperature or humidity).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    /// Panel title
    pub title: &'static str,
    /// Y axis label
    pub y_label: &'static str,
    /// Series per node, sorted by node id
    pub series: BTreeMap<String, SeriesPoints>,
    /// Threshold guides
    pub guides: Vec<Guide>,
}

/// Rendering context for the two live panels.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartContext {
    /// Temperature over time
    pub temperature: Panel,
    /// Humidity over time
    pub humidity: Panel,
    /// Time of the earliest sample (x = 0)
    pub origin: Option<NaiveDateTime>,
    /// Readings behind the current series
    pub samples: usize,
}

impl Default for ChartContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartContext {
    /// Empty chart with the threshold guides in place.
    pub fn new() -> Self {
        Self {
            temperature: Panel {
                title: "Live temperature",
                y_label: "Temperature (°C)",
                series: BTreeMap::new(),
                guides: vec![Guide {
                    label: "Limit (30.0°C)",
                    value: thresholds::TEMP_MAX,
                }],
            },
            humidity: Panel {
                title: "Live humidity",
                y_label: "Humidity (%)",
                series: BTreeMap::new(),
                guides: vec![
                    Guide {
                        label: "Min (40.0%)",
                        value: thresholds::HUMIDITY_MIN,
                    },
                    Guide {
                        label: "Max (70.0%)",
                        value: thresholds::HUMIDITY_MAX,
                    },
                ],
            },
            origin: None,
            samples: 0,
        }
    }

    /// Re-read the store and rebuild the series.
    ///
    /// A store that does not exist yet clears the chart. Other read errors keep
    /// the previous series and are returned.
    pub fn refresh(&mut self, store: &ReadingStore) -> Result<(), StoreError> {
        match store.read_all() {
            Ok(readings) => {
                self.rebuild(&readings);
                debug!(samples = self.samples, "Chart refreshed");
                Ok(())
            }
            Err(StoreError::Unavailable(_)) => {
                self.rebuild(&[]);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Chart refresh failed");
                Err(e)
            }
        }
    }

    /// Rebuild the series from `readings`.
    pub fn rebuild(&mut self, readings: &[Reading]) {
        self.temperature.series.clear();
        self.humidity.series.clear();
        self.origin = readings.iter().map(|r| r.timestamp).min();
        self.samples = readings.len();

        let Some(origin) = self.origin else {
            return;
        };

        for reading in readings {
            let x = (reading.timestamp - origin).num_milliseconds() as f64 / 1000.0;
            self.temperature
                .series
                .entry(reading.node_id.clone())
                .or_default()
                .push([x, reading.temperature]);
            self.humidity
                .series
                .entry(reading.node_id.clone())
                .or_default()
                .push([x, reading.humidity]);
        }
    }

    /// Whether there is anything to draw.
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}
