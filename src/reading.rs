//! Sensor domain types.
//!
//! A [`Reading`] is one validated sample; an [`AnomalyEvent`] is derived from a
//! reading that violates one of the fixed thresholds in [`thresholds`].

use chrono::NaiveDateTime;
use std::fmt;

/// Timestamp format used by the store, the audit trail and the report.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fixed anomaly thresholds.
pub mod thresholds {
    /// Temperatures strictly above this are an overheat (°C).
    pub const TEMP_MAX: f64 = 30.0;
    /// Humidity strictly below this is too dry (%).
    pub const HUMIDITY_MIN: f64 = 40.0;
    /// Humidity strictly above this is too wet (%).
    pub const HUMIDITY_MAX: f64 = 70.0;
}

/// One validated sensor sample.
///
/// `timestamp` is the receipt time on this host, truncated to whole seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Receipt time (local wall clock)
    pub timestamp: NaiveDateTime,
    /// Sending node identifier
    pub node_id: String,
    /// Temperature in °C
    pub temperature: f64,
    /// Relative humidity in %
    pub humidity: f64,
}

impl Reading {
    /// Create a new reading.
    pub fn new(
        timestamp: NaiveDateTime,
        node_id: impl Into<String>,
        temperature: f64,
        humidity: f64,
    ) -> Self {
        Self {
            timestamp,
            node_id: node_id.into(),
            temperature,
            humidity,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, Temp: {:?}°C, Hum: {:?}%",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.node_id,
            self.temperature,
            self.humidity
        )
    }
}

/// Kind of threshold violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyKind {
    /// `temperature > TEMP_MAX`
    Overheat,
    /// `humidity < HUMIDITY_MIN`
    LowHumidity,
    /// `humidity > HUMIDITY_MAX`
    HighHumidity,
}

impl AnomalyKind {
    /// Threshold that this kind compares against.
    pub fn threshold(self) -> f64 {
        match self {
            AnomalyKind::Overheat => thresholds::TEMP_MAX,
            AnomalyKind::LowHumidity => thresholds::HUMIDITY_MIN,
            AnomalyKind::HighHumidity => thresholds::HUMIDITY_MAX,
        }
    }

    /// Upper-case wire name (`OVERHEAT`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyKind::Overheat => "OVERHEAT",
            AnomalyKind::LowHumidity => "LOW_HUMIDITY",
            AnomalyKind::HighHumidity => "HIGH_HUMIDITY",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A threshold violation derived from one persisted [`Reading`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyEvent {
    /// Timestamp of the originating reading
    pub timestamp: NaiveDateTime,
    /// Node of the originating reading
    pub node_id: String,
    /// Which threshold was violated
    pub kind: AnomalyKind,
    /// Offending value
    pub value: f64,
    /// Threshold that was crossed
    pub threshold: f64,
}

impl AnomalyEvent {
    /// Build an event of `kind` for `reading`, picking the matching field.
    pub fn from_reading(reading: &Reading, kind: AnomalyKind) -> Self {
        let value = match kind {
            AnomalyKind::Overheat => reading.temperature,
            AnomalyKind::LowHumidity | AnomalyKind::HighHumidity => reading.humidity,
        };
        Self {
            timestamp: reading.timestamp,
            node_id: reading.node_id.clone(),
            kind,
            value,
            threshold: kind.threshold(),
        }
    }

    /// Human-readable description used in the audit trail.
    pub fn describe(&self) -> String {
        match self.kind {
            AnomalyKind::Overheat => format!(
                "Node: {} - Overheat! Temperature: {:?}°C",
                self.node_id, self.value
            ),
            AnomalyKind::LowHumidity => format!(
                "Node: {} - Low humidity! Humidity: {:?}%",
                self.node_id, self.value
            ),
            AnomalyKind::HighHumidity => format!(
                "Node: {} - High humidity! Humidity: {:?}%",
                self.node_id, self.value
            ),
        }
    }
}
