//! Line decoder for the sensor wire format.
//!
//! Each line on the link is one JSON object:
//!
//! ```text
//! {"nodeID":"N1","temperature":25.0,"humidity":50.0}
//! ```
//!
//! Decoding runs in stages (UTF-8, JSON syntax, required fields, numeric values)
//! and the first stage that fails decides the [`ParseError`] class. Extra fields
//! are ignored. Blank lines decode to `Ok(None)`.

use crate::error::ParseError;
use crate::reading::Reading;
use chrono::{Local, NaiveDateTime, SubsecRound};
use serde_json::{Map, Value};

const FIELD_NODE_ID: &str = "nodeID";
const FIELD_TEMPERATURE: &str = "temperature";
const FIELD_HUMIDITY: &str = "humidity";

/// Stateless record parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordParser;

impl RecordParser {
    /// Create a parser.
    pub fn new() -> Self {
        Self
    }

    /// Decode one raw line, stamping it with the current local time.
    pub fn parse(&self, raw: &[u8]) -> Result<Option<Reading>, ParseError> {
        self.parse_at(raw, Local::now().naive_local())
    }

    /// Decode one raw line with an explicit receipt time.
    ///
    /// The timestamp is truncated to whole seconds so it survives the store's
    /// text format unchanged.
    pub fn parse_at(
        &self,
        raw: &[u8],
        received_at: NaiveDateTime,
    ) -> Result<Option<Reading>, ParseError> {
        let text = std::str::from_utf8(raw).map_err(|e| ParseError::Encoding(e.to_string()))?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let value: Value =
            serde_json::from_str(text).map_err(|e| ParseError::Syntax(e.to_string()))?;
        let Value::Object(record) = value else {
            return Err(ParseError::Syntax(format!(
                "expected a JSON object, got {}",
                json_type_name(&value)
            )));
        };

        // All required fields must be present before any is type-checked.
        let node_id = required(&record, FIELD_NODE_ID)?;
        let temperature = required(&record, FIELD_TEMPERATURE)?;
        let humidity = required(&record, FIELD_HUMIDITY)?;

        Ok(Some(Reading {
            timestamp: received_at.trunc_subsecs(0),
            node_id: node_id_value(node_id)?,
            temperature: numeric_value(FIELD_TEMPERATURE, temperature)?,
            humidity: numeric_value(FIELD_HUMIDITY, humidity)?,
        }))
    }
}

fn required<'a>(record: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ParseError> {
    match record.get(field) {
        Some(Value::Null) | None => Err(ParseError::Field(field)),
        Some(value) => Ok(value),
    }
}

fn node_id_value(value: &Value) -> Result<String, ParseError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(ParseError::Type {
            field: FIELD_NODE_ID,
            value: other.to_string(),
        }),
    }
}

/// Accepts JSON numbers and numeric strings; rejects non-finite values.
fn numeric_value(field: &'static str, value: &Value) -> Result<f64, ParseError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::Type {
            field,
            value: value.to_string(),
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
