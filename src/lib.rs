//! # Sensor DAQ Core Library
//!
//! Ingests line-delimited JSON sensor readings (node id, temperature, humidity)
//! from a serial link, persists every valid reading to an append-only CSV store,
//! flags out-of-range readings in a durable audit trail, and builds live charts
//! and a summary report from the persisted data.
//!
//! ## Crate Structure
//!
//! - **`link`**: connection lifecycle for the serial link (connect with fixed
//!   backoff, poll for lines, close). `mock` provides scripted links for tests.
//! - **`parser`**: decodes one raw line into a [`reading::Reading`] or a
//!   classified [`error::ParseError`].
//! - **`store`**: the append-only CSV store.
//! - **`anomaly`**: fixed-threshold anomaly classification.
//! - **`audit`**: the durable audit trail, mirrored to the console via `tracing`.
//! - **`ingest`**: the ingestion loop state machine tying the above together.
//! - **`chart`** / **`gui`**: the live chart model and its `eframe` window
//!   (`gui` feature).
//! - **`report`** / **`trend`**: the on-demand summary report and its SVG charts.
//! - **`config`**: figment-based configuration (TOML + environment).
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: error types for every layer.

pub mod anomaly;
pub mod audit;
pub mod chart;
pub mod config;
pub mod error;
pub mod ingest;
pub mod link;
pub mod logging;
pub mod mock;
pub mod parser;
pub mod reading;
pub mod report;
pub mod store;
pub mod trend;

#[cfg(feature = "gui")]
pub mod gui;
