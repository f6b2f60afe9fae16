//! Custom error types for the application.
//!
//! Each layer of the pipeline owns a small `thiserror` enum so that callers can
//! match on the failure class they care about:
//!
//! - **`LinkError`**: connection-level failures from the serial link. `LinkLost`
//!   is recovered by the ingestion loop through reconnection.
//! - **`ParseError`**: one per decoding stage (encoding, syntax, field, type).
//!   Parse failures are skipped and logged, never fatal.
//! - **`StoreError`**: persistence failures. `Unavailable` means the store file
//!   does not exist yet and read-only consumers treat it as empty.
//! - **`ReportError`**: anything that goes wrong while building the report.
//!
//! `MonitorError` consolidates them for the outer surfaces (binary, GUI) and
//! adds configuration failures. By using `#[from]`, the `?` operator converts the
//! layer errors automatically.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, MonitorError>;

/// Connection-level failures.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The link failed while reading. The caller must `close` and `connect` again.
    #[error("Serial link lost: {0}")]
    LinkLost(#[source] std::io::Error),

    /// A bounded reconnect policy gave up.
    #[error("Gave up connecting to '{port}' after {attempts} attempts")]
    RetriesExhausted {
        /// Port description of the connector
        port: String,
        /// Number of attempts made
        attempts: u32,
    },
}

/// Classified failure of one line decode.
///
/// The variants follow the decoding stages in order; the first stage that fails
/// determines the class.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Bytes are not valid UTF-8.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Text is not a structured record.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// A required field is absent.
    #[error("Missing field '{0}'")]
    Field(&'static str),

    /// A field is present but has the wrong type (e.g. non-numeric temperature).
    #[error("Invalid value for '{field}': {value}")]
    Type {
        /// Field name as it appears on the wire
        field: &'static str,
        /// Offending value rendered as JSON
        value: String,
    },
}

impl ParseError {
    /// Short class name used in audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::Encoding(_) => "EncodingError",
            ParseError::Syntax(_) => "SyntaxError",
            ParseError::Field(_) => "FieldError",
            ParseError::Type { .. } => "TypeError",
        }
    }
}

/// Persistence store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store file does not exist (yet).
    #[error("Store '{0}' is not available")]
    Unavailable(PathBuf),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid timestamp '{value}' in store: {source}")]
    Timestamp {
        /// Raw timestamp cell
        value: String,
        /// Parse failure
        #[source]
        source: chrono::ParseError,
    },
}

/// Failure while generating the summary report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to read store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to read audit trail '{path}': {source}")]
    Audit {
        /// Audit trail path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render report content: {0}")]
    Render(#[from] std::fmt::Error),

    #[error("Failed to write '{path}': {source}")]
    Output {
        /// Artifact path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Top-level application error.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for MonitorError {
    fn from(value: figment::Error) -> Self {
        MonitorError::Config(Box::new(value))
    }
}

impl MonitorError {
    /// Whether the ingestion path can continue after this error.
    pub fn can_recover(&self) -> bool {
        match self {
            MonitorError::Link(LinkError::LinkLost(_)) => true,
            MonitorError::Store(StoreError::Unavailable(_)) => true,
            MonitorError::Report(_) => true,
            MonitorError::Config(_)
            | MonitorError::Configuration(_)
            | MonitorError::Io(_)
            | MonitorError::Link(LinkError::RetriesExhausted { .. })
            | MonitorError::Store(_)
            | MonitorError::FeatureNotEnabled(_) => false,
        }
    }
}
