//! Append-only CSV store of accepted readings.
//!
//! File layout:
//!
//! ```text
//! timestamp,id_do_no,temperatura,umidade
//! 2024-05-01 12:00:05,N1,25.0,50.0
//! ```
//!
//! Every append encodes the full row in memory, writes it with a single
//! `write_all` on a handle opened in append mode and syncs it before returning,
//! so readers in other processes never observe a partial row and a successful
//! append survives a crash.

use crate::error::StoreError;
use crate::reading::{Reading, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Column names of the store header row.
pub const HEADER: [&str; 4] = ["timestamp", "id_do_no", "temperatura", "umidade"];

/// On-disk row shape.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    timestamp: String,
    id_do_no: String,
    temperatura: f64,
    umidade: f64,
}

impl From<&Reading> for StoredRow {
    fn from(reading: &Reading) -> Self {
        Self {
            timestamp: reading.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            id_do_no: reading.node_id.clone(),
            temperatura: reading.temperature,
            umidade: reading.humidity,
        }
    }
}

impl TryFrom<StoredRow> for Reading {
    type Error = StoreError;

    fn try_from(row: StoredRow) -> Result<Self, Self::Error> {
        let timestamp = NaiveDateTime::parse_from_str(&row.timestamp, TIMESTAMP_FORMAT)
            .map_err(|source| StoreError::Timestamp {
                value: row.timestamp.clone(),
                source,
            })?;
        Ok(Reading {
            timestamp,
            node_id: row.id_do_no,
            temperature: row.temperatura,
            humidity: row.umidade,
        })
    }
}

/// Handle on the CSV store.
///
/// Holds no open file between calls; each append opens, writes and syncs.
#[derive(Debug, Clone)]
pub struct ReadingStore {
    path: PathBuf,
}

impl ReadingStore {
    /// Create a handle for the store at `path`. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the store with its header row if it does not exist or is empty.
    ///
    /// Existing content is never modified.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let needs_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        if !needs_header {
            debug!(path = %self.path.display(), "Store already initialized");
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(HEADER)?;
        let bytes = into_bytes(writer)?;
        self.write_durably(&bytes)?;

        info!(path = %self.path.display(), "Created reading store");
        Ok(())
    }

    /// Durably append one reading.
    pub fn append(&self, reading: &Reading) -> Result<(), StoreError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.serialize(StoredRow::from(reading))?;
        let bytes = into_bytes(writer)?;
        self.write_durably(&bytes)
    }

    /// Read every stored reading in append order.
    ///
    /// Returns [`StoreError::Unavailable`] when the file does not exist.
    pub fn read_all(&self) -> Result<Vec<Reading>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::Unavailable(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        reader
            .deserialize::<StoredRow>()
            .map(|row| Reading::try_from(row?))
            .collect()
    }

    fn write_durably(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(bytes)?;
        file.sync_data()?;
        Ok(())
    }
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, StoreError> {
    writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))
}
