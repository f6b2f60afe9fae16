//! Threshold-based anomaly classification.

use crate::reading::{thresholds, AnomalyEvent, AnomalyKind, Reading};

/// Evaluates readings against the fixed thresholds.
///
/// Temperature and humidity are checked independently. The humidity branch is
/// exclusive: a reading is either too dry, too wet or neither.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyDetector;

impl AnomalyDetector {
    /// Create a detector.
    pub fn new() -> Self {
        Self
    }

    /// Classify a reading. Returns between zero and two events.
    pub fn evaluate(&self, reading: &Reading) -> Vec<AnomalyEvent> {
        let mut events = Vec::with_capacity(2);

        if reading.temperature > thresholds::TEMP_MAX {
            events.push(AnomalyEvent::from_reading(reading, AnomalyKind::Overheat));
        }

        if reading.humidity < thresholds::HUMIDITY_MIN {
            events.push(AnomalyEvent::from_reading(reading, AnomalyKind::LowHumidity));
        } else if reading.humidity > thresholds::HUMIDITY_MAX {
            events.push(AnomalyEvent::from_reading(reading, AnomalyKind::HighHumidity));
        }

        events
    }
}
