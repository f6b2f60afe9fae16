//! Ingestion loop: link → parser → {store, detector} → audit trail.
//!
//! The loop is a small state machine:
//!
//! ```text
//!            no data                      parse ok        append ok/failed
//!   ┌──────────────────┐   line   ┌──────────┐   ┌────────────┐
//!   └─► AWAITING_DATA ─┴────────► │ DECODING ├──►│ PERSISTING ├──► AWAITING_DATA
//!            ▲                    └────┬─────┘   └────────────┘
//!            │   blank / parse error   │
//!            └─────────────────────────┘
//!   any ──(link lost)──► RECOVERING ──(reconnected)──► AWAITING_DATA
//!   any ──(cancelled)──► SHUTTING_DOWN
//! ```
//!
//! Transitions are computed by [`transition`] from the event alone. Nothing in
//! the loop is fatal: parse and store failures are logged and skipped, link loss
//! triggers reconnection. Only a bounded reconnect policy can end the loop with
//! an error.

use crate::anomaly::AnomalyDetector;
use crate::audit::{AuditEntry, AuditLevel, AuditLog};
use crate::error::{LinkError, ParseError};
use crate::link::{ConnectionManager, Connector, Delay, LineRead, TokioDelay};
use crate::parser::RecordParser;
use crate::reading::{AnomalyEvent, Reading};
use crate::store::ReadingStore;
use tokio::sync::watch;
use tracing::{error, info, instrument};

/// Ingestion loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// Polling the link
    AwaitingData,
    /// Decoding a received line
    Decoding,
    /// Appending a decoded reading
    Persisting,
    /// Reconnecting after link loss
    Recovering,
    /// Cancelled; the link is being released
    ShuttingDown,
}

/// Inputs that drive [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// Poll window expired without a line
    NoData,
    /// A line arrived
    LineReceived,
    /// The line decoded to a reading
    Decoded,
    /// The line was blank
    Blank,
    /// The line failed to decode
    Rejected,
    /// The reading was appended
    Persisted,
    /// The append failed
    PersistFailed,
    /// The link failed
    LinkLost,
    /// The link is back
    Reconnected,
    /// External cancellation
    Cancelled,
}

/// Next state for an event. Independent of the current state.
pub fn transition(event: LoopEvent) -> IngestState {
    match event {
        LoopEvent::LineReceived => IngestState::Decoding,
        LoopEvent::Decoded => IngestState::Persisting,
        LoopEvent::LinkLost => IngestState::Recovering,
        LoopEvent::Cancelled => IngestState::ShuttingDown,
        LoopEvent::NoData
        | LoopEvent::Blank
        | LoopEvent::Rejected
        | LoopEvent::Persisted
        | LoopEvent::PersistFailed
        | LoopEvent::Reconnected => IngestState::AwaitingData,
    }
}

/// What one [`IngestionLoop::step`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// No data within the poll window
    Idle,
    /// Blank line skipped
    Skipped,
    /// Reading persisted and evaluated
    Persisted {
        /// The stored reading
        reading: Reading,
        /// Anomalies recorded for it
        events: Vec<AnomalyEvent>,
    },
    /// Line rejected by the parser
    Rejected(ParseError),
    /// Reading decoded but could not be stored
    StoreFailed,
    /// Link lost and re-established
    Recovered {
        /// Connection attempts needed
        attempts: u32,
    },
}

/// Running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines received (including blank and rejected ones)
    pub lines: u64,
    /// Readings persisted
    pub readings: u64,
    /// Anomaly events recorded
    pub anomalies: u64,
    /// Lines rejected by the parser
    pub parse_errors: u64,
    /// Failed appends
    pub store_errors: u64,
    /// Successful reconnections after link loss
    pub reconnects: u64,
}

/// Single-writer ingestion pipeline.
pub struct IngestionLoop<C, D = TokioDelay> {
    link: ConnectionManager<C, D>,
    parser: RecordParser,
    store: ReadingStore,
    detector: AnomalyDetector,
    audit: AuditLog,
    state: IngestState,
    stats: IngestStats,
}

impl<C: Connector, D: Delay> IngestionLoop<C, D> {
    /// Assemble the pipeline. The store should already be initialized.
    pub fn new(link: ConnectionManager<C, D>, store: ReadingStore, audit: AuditLog) -> Self {
        Self {
            link,
            parser: RecordParser::new(),
            store,
            detector: AnomalyDetector::new(),
            audit,
            state: IngestState::AwaitingData,
            stats: IngestStats::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> IngestState {
        self.state
    }

    /// Totals so far.
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// The connection manager.
    pub fn link(&self) -> &ConnectionManager<C, D> {
        &self.link
    }

    /// The reading store.
    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    /// Establish the initial connection.
    pub async fn connect(&mut self) -> Result<u32, LinkError> {
        let attempts = self.link.connect().await?;
        let message = format!("Connected successfully to {}", self.link.describe());
        self.audit_message(AuditLevel::Info, &message);
        self.state = IngestState::AwaitingData;
        Ok(attempts)
    }

    /// Poll once and route whatever arrived.
    pub async fn step(&mut self) -> Result<StepOutcome, LinkError> {
        match self.link.read_line().await {
            Ok(LineRead::Empty) => {
                self.state = transition(LoopEvent::NoData);
                Ok(StepOutcome::Idle)
            }
            Ok(LineRead::Line(raw)) => {
                self.state = transition(LoopEvent::LineReceived);
                self.stats.lines += 1;
                Ok(self.handle_line(&raw))
            }
            Err(LinkError::LinkLost(e)) => {
                self.state = transition(LoopEvent::LinkLost);
                self.recover(e).await
            }
            Err(other) => Err(other),
        }
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// Connects first if needed. The link is always closed before returning.
    #[instrument(skip_all, fields(endpoint = %self.link.describe()))]
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<IngestStats, LinkError> {
        let result = self.run_until_cancelled(&mut shutdown).await;
        self.shutdown();
        result.map(|()| self.stats)
    }

    async fn run_until_cancelled(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), LinkError> {
        if *shutdown.borrow() {
            return Ok(());
        }

        if self.link.state() == crate::link::ConnectionState::Disconnected {
            tokio::select! {
                biased;
                _ = cancelled(shutdown) => return Ok(()),
                connected = self.connect() => { connected?; }
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = cancelled(shutdown) => return Ok(()),
                step = self.step() => { step?; }
            }
            // Let other tasks on this thread (chart refresh, signal handling) run.
            tokio::task::yield_now().await;
        }
    }

    /// Release the link and log the totals. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.state = transition(LoopEvent::Cancelled);
        self.link.close();
        let stats = self.stats;
        info!(
            lines = stats.lines,
            readings = stats.readings,
            anomalies = stats.anomalies,
            parse_errors = stats.parse_errors,
            store_errors = stats.store_errors,
            reconnects = stats.reconnects,
            "Ingestion stopped"
        );
    }

    fn handle_line(&mut self, raw: &[u8]) -> StepOutcome {
        let reading = match self.parser.parse(raw) {
            Ok(Some(reading)) => reading,
            Ok(None) => {
                self.state = transition(LoopEvent::Blank);
                return StepOutcome::Skipped;
            }
            Err(e) => {
                self.state = transition(LoopEvent::Rejected);
                self.stats.parse_errors += 1;
                let message = format!(
                    "{}: {}. Line: '{}'",
                    e.kind(),
                    e,
                    String::from_utf8_lossy(raw)
                );
                self.audit_message(AuditLevel::Error, &message);
                return StepOutcome::Rejected(e);
            }
        };

        self.state = transition(LoopEvent::Decoded);
        if let Err(e) = self.store.append(&reading) {
            self.state = transition(LoopEvent::PersistFailed);
            self.stats.store_errors += 1;
            let message = format!("Failed to persist reading from {}: {}", reading.node_id, e);
            self.audit_message(AuditLevel::Error, &message);
            return StepOutcome::StoreFailed;
        }

        info!(node_id = %reading.node_id, "Data received: {}", reading);
        self.stats.readings += 1;

        let events = self.detector.evaluate(&reading);
        for event in &events {
            self.audit_entry(AuditEntry::Anomaly(event));
        }
        self.stats.anomalies += events.len() as u64;

        self.state = transition(LoopEvent::Persisted);
        StepOutcome::Persisted { reading, events }
    }

    async fn recover(&mut self, cause: std::io::Error) -> Result<StepOutcome, LinkError> {
        let message = format!("Serial communication error: {}. Reconnecting...", cause);
        self.audit_message(AuditLevel::Error, &message);

        self.link.close();
        let attempts = self.link.connect().await?;
        self.stats.reconnects += 1;

        let message = format!(
            "Reconnected to {} after {} attempt(s)",
            self.link.describe(),
            attempts
        );
        self.audit_message(AuditLevel::Info, &message);
        self.state = transition(LoopEvent::Reconnected);
        Ok(StepOutcome::Recovered { attempts })
    }

    fn audit_message(&mut self, level: AuditLevel, message: &str) {
        self.audit_entry(AuditEntry::Message(level, message));
    }

    fn audit_entry(&mut self, entry: AuditEntry<'_>) {
        if let Err(e) = self.audit.record(entry) {
            error!(path = %self.audit.path().display(), error = %e, "Failed to write audit trail");
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    // Cannot fail: an `Err` means every sender is dropped, which also cancels.
    let _ = shutdown.wait_for(|stop| *stop).await;
}
