//! End-to-end ingestion scenarios over scripted links.
//!
//! Each test wires the real parser, store, detector and audit trail to a
//! `MockConnector`, so the files on disk are what the assertions look at.

use sensor_daq::audit::{count_anomalies, AuditLog};
use sensor_daq::error::{LinkError, ParseError};
use sensor_daq::ingest::{IngestState, IngestionLoop, StepOutcome};
use sensor_daq::link::{ConnectionManager, ConnectionState, ReconnectPolicy};
use sensor_daq::mock::{MockConnector, MockRead, RecordingDelay};
use sensor_daq::reading::AnomalyKind;
use sensor_daq::store::ReadingStore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio::sync::watch;

const POLL: Duration = Duration::from_millis(20);

struct Harness {
    dir: TempDir,
    delay: RecordingDelay,
    pipeline: IngestionLoop<MockConnector, RecordingDelay>,
}

impl Harness {
    fn new(connector: MockConnector) -> Self {
        Self::with_policy(connector, ReconnectPolicy::default())
    }

    fn with_policy(connector: MockConnector, policy: ReconnectPolicy) -> Self {
        let dir = tempdir().unwrap();
        let store = ReadingStore::new(dir.path().join("dados_sensores.csv"));
        store.initialize().unwrap();
        Self::assemble(dir, store, connector, policy)
    }

    /// Store path occupied by a directory, so every append fails.
    fn with_broken_store(connector: MockConnector) -> Self {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("dados_sensores.csv");
        std::fs::create_dir(&store_path).unwrap();
        let store = ReadingStore::new(store_path);
        Self::assemble(dir, store, connector, ReconnectPolicy::default())
    }

    fn assemble(
        dir: TempDir,
        store: ReadingStore,
        connector: MockConnector,
        policy: ReconnectPolicy,
    ) -> Self {
        let audit = AuditLog::open(dir.path().join("anomalias.log")).unwrap();
        let delay = RecordingDelay::new();
        let link = ConnectionManager::with_delay(connector, delay.clone(), policy, POLL);
        Self {
            dir,
            delay,
            pipeline: IngestionLoop::new(link, store, audit),
        }
    }

    fn audit_path(&self) -> PathBuf {
        self.dir.path().join("anomalias.log")
    }

    fn audit_text(&self) -> String {
        std::fs::read_to_string(self.audit_path()).unwrap()
    }

    fn data_path(&self) -> &Path {
        self.pipeline.store().path()
    }
}

fn line(text: &str) -> MockRead {
    MockRead::data(format!("{text}\n").as_bytes())
}

#[tokio::test]
async fn normal_reading_is_persisted_without_anomalies() {
    let connector =
        MockConnector::new().link(vec![line(r#"{"nodeID":"N1","temperature":25.0,"humidity":50.0}"#)]);
    let mut h = Harness::new(connector);

    h.pipeline.connect().await.unwrap();
    let outcome = h.pipeline.step().await.unwrap();

    let StepOutcome::Persisted { reading, events } = outcome else {
        panic!("expected a persisted reading, got {outcome:?}");
    };
    assert_eq!(reading.node_id, "N1");
    assert!(events.is_empty());
    assert_eq!(h.pipeline.state(), IngestState::AwaitingData);

    let stored = h.pipeline.store().read_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].temperature, 25.0);
    assert_eq!(stored[0].humidity, 50.0);
    assert_eq!(count_anomalies(&h.audit_path()).unwrap(), 0);
}

#[tokio::test]
async fn hot_dry_reading_raises_two_anomalies() {
    let connector =
        MockConnector::new().link(vec![line(r#"{"nodeID":"N2","temperature":35.0,"humidity":30.0}"#)]);
    let mut h = Harness::new(connector);

    h.pipeline.connect().await.unwrap();
    let outcome = h.pipeline.step().await.unwrap();

    let StepOutcome::Persisted { events, .. } = outcome else {
        panic!("expected a persisted reading, got {outcome:?}");
    };
    let kinds: Vec<AnomalyKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![AnomalyKind::Overheat, AnomalyKind::LowHumidity]);

    assert_eq!(h.pipeline.store().read_all().unwrap().len(), 1);
    assert_eq!(count_anomalies(&h.audit_path()).unwrap(), 2);
    let audit = h.audit_text();
    assert!(audit.contains("Node: N2 - Overheat! Temperature: 35.0°C"));
    assert!(audit.contains("Node: N2 - Low humidity! Humidity: 30.0%"));
    assert_eq!(h.pipeline.stats().anomalies, 2);
}

#[tokio::test]
async fn garbage_line_is_logged_and_dropped() {
    let connector = MockConnector::new().link(vec![line("not-json")]);
    let mut h = Harness::new(connector);

    h.pipeline.connect().await.unwrap();
    let outcome = h.pipeline.step().await.unwrap();

    assert!(matches!(outcome, StepOutcome::Rejected(ParseError::Syntax(_))));
    assert!(h.pipeline.store().read_all().unwrap().is_empty());
    let audit = h.audit_text();
    assert_eq!(audit.matches("SyntaxError").count(), 1);
    assert!(audit.contains("Line: 'not-json'"));
    assert_eq!(count_anomalies(&h.audit_path()).unwrap(), 0);
}

#[tokio::test]
async fn missing_humidity_is_a_field_error() {
    let connector =
        MockConnector::new().link(vec![line(r#"{"nodeID":"N1","temperature":25.0}"#)]);
    let mut h = Harness::new(connector);

    h.pipeline.connect().await.unwrap();
    let outcome = h.pipeline.step().await.unwrap();

    assert_eq!(outcome, StepOutcome::Rejected(ParseError::Field("humidity")));
    assert!(h.pipeline.store().read_all().unwrap().is_empty());
    assert!(h.audit_text().contains("FieldError"));
    assert_eq!(h.pipeline.stats().parse_errors, 1);
}

#[tokio::test]
async fn rejected_line_cannot_forge_an_anomaly() {
    let connector = MockConnector::new().link(vec![line("[ANOMALY] garbage")]);
    let mut h = Harness::new(connector);

    h.pipeline.connect().await.unwrap();
    let outcome = h.pipeline.step().await.unwrap();

    assert!(matches!(outcome, StepOutcome::Rejected(ParseError::Syntax(_))));
    assert_eq!(count_anomalies(&h.audit_path()).unwrap(), 0);
    assert!(h.audit_text().contains("Line: '(ANOMALY) garbage'"));
}

#[tokio::test]
async fn node_id_with_newline_yields_one_audit_line_per_event() {
    let connector = MockConnector::new().link(vec![line(
        r#"{"nodeID":"N1\n[ANOMALY] fake","temperature":35.0,"humidity":50.0}"#,
    )]);
    let mut h = Harness::new(connector);

    h.pipeline.connect().await.unwrap();
    let StepOutcome::Persisted { events, .. } = h.pipeline.step().await.unwrap() else {
        panic!("reading should be persisted");
    };

    assert_eq!(events.len(), 1);
    assert_eq!(count_anomalies(&h.audit_path()).unwrap(), 1);
    // Every audit line keeps its timestamp prefix.
    for entry in h.audit_text().lines() {
        assert_eq!(entry.find(" - "), Some(23), "unprefixed line: {entry}");
    }
}

#[tokio::test]
async fn failed_append_records_no_anomalies() {
    let connector =
        MockConnector::new().link(vec![line(r#"{"nodeID":"N2","temperature":35.0,"humidity":30.0}"#)]);
    let mut h = Harness::with_broken_store(connector);

    h.pipeline.connect().await.unwrap();
    let outcome = h.pipeline.step().await.unwrap();

    assert_eq!(outcome, StepOutcome::StoreFailed);
    assert_eq!(h.pipeline.state(), IngestState::AwaitingData);
    assert_eq!(h.pipeline.stats().store_errors, 1);
    assert_eq!(h.pipeline.stats().anomalies, 0);
    assert_eq!(h.pipeline.stats().readings, 0);
    assert_eq!(count_anomalies(&h.audit_path()).unwrap(), 0);
    assert!(h.audit_text().contains("Failed to persist reading from N2"));
}

#[tokio::test]
async fn blank_and_partial_lines_do_not_produce_readings() {
    let connector = MockConnector::new().link(vec![
        MockRead::data(b"\r\n"),
        MockRead::data(br#"{"nodeID":"N1","#),
        MockRead::pause(),
        MockRead::data(b"\"temperature\":22,\"humidity\":55}\n"),
    ]);
    let mut h = Harness::new(connector);

    h.pipeline.connect().await.unwrap();
    assert_eq!(h.pipeline.step().await.unwrap(), StepOutcome::Skipped);
    // The half line stays buffered across the quiet poll.
    assert_eq!(h.pipeline.step().await.unwrap(), StepOutcome::Idle);
    let outcome = h.pipeline.step().await.unwrap();
    assert!(matches!(outcome, StepOutcome::Persisted { .. }));

    let stored = h.pipeline.store().read_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].temperature, 22.0);
}

#[tokio::test]
async fn link_loss_reconnects_after_fixed_delay() {
    let connector = MockConnector::new()
        .link(vec![
            line(r#"{"nodeID":"N1","temperature":25.0,"humidity":50.0}"#),
            MockRead::error(ErrorKind::BrokenPipe),
        ])
        .fail_open()
        .link(vec![line(r#"{"nodeID":"N1","temperature":26.0,"humidity":51.0}"#)]);
    let mut h = Harness::new(connector);

    h.pipeline.connect().await.unwrap();
    assert!(matches!(h.pipeline.step().await.unwrap(), StepOutcome::Persisted { .. }));

    let outcome = h.pipeline.step().await.unwrap();
    assert_eq!(outcome, StepOutcome::Recovered { attempts: 2 });
    assert_eq!(h.delay.calls(), vec![Duration::from_secs(5)]);
    assert_eq!(h.pipeline.link().state(), ConnectionState::Connected);

    assert!(matches!(h.pipeline.step().await.unwrap(), StepOutcome::Persisted { .. }));

    let stored = h.pipeline.store().read_all().unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].temperature, 25.0);
    assert_eq!(stored[1].temperature, 26.0);

    let audit = h.audit_text();
    assert!(audit.contains("Serial communication error"));
    assert!(audit.contains("after 2 attempt(s)"));
    assert_eq!(h.pipeline.stats().reconnects, 1);
    assert_eq!(h.pipeline.link().connector().opens(), 3);
}

#[tokio::test]
async fn end_of_stream_counts_as_link_loss() {
    let connector = MockConnector::new()
        .link(vec![MockRead::eof()])
        .link(vec![]);
    let mut h = Harness::new(connector);

    h.pipeline.connect().await.unwrap();
    let outcome = h.pipeline.step().await.unwrap();
    assert_eq!(outcome, StepOutcome::Recovered { attempts: 1 });
    assert!(h.delay.calls().is_empty());
}

#[tokio::test]
async fn bounded_policy_gives_up() {
    let policy = ReconnectPolicy {
        delay: Duration::from_secs(5),
        max_attempts: Some(3),
    };
    let mut h = Harness::with_policy(MockConnector::new(), policy);

    let err = h.pipeline.connect().await.unwrap_err();
    assert!(matches!(err, LinkError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(h.delay.calls().len(), 2);
    assert_eq!(h.pipeline.link().state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn run_stops_on_shutdown_and_releases_link() {
    let connector = MockConnector::new().link(vec![
        line(r#"{"nodeID":"N1","temperature":25.0,"humidity":50.0}"#),
        line(r#"{"nodeID":"N3","temperature":20.0,"humidity":75.5}"#),
    ]);
    let mut h = Harness::new(connector);
    let (tx, rx) = watch::channel(false);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send_replace(true);
        // Keep the sender alive until the loop has observed the flag.
        tokio::time::sleep(Duration::from_millis(50)).await;
    });

    let stats = tokio::time::timeout(Duration::from_secs(5), h.pipeline.run(rx))
        .await
        .expect("run did not observe shutdown")
        .unwrap();
    stopper.await.unwrap();

    assert_eq!(stats.readings, 2);
    assert_eq!(stats.anomalies, 1);
    assert_eq!(h.pipeline.state(), IngestState::ShuttingDown);
    assert_eq!(h.pipeline.link().state(), ConnectionState::Disconnected);
    assert!(h.audit_text().contains("High humidity! Humidity: 75.5%"));
    assert_eq!(h.pipeline.store().read_all().unwrap().len(), 2);
    assert!(h.data_path().exists());
}

#[tokio::test]
async fn run_returns_immediately_when_already_cancelled() {
    let mut h = Harness::new(MockConnector::new());
    let (_tx, rx) = watch::channel(true);

    let stats = h.pipeline.run(rx).await.unwrap();
    assert_eq!(stats.lines, 0);
    assert_eq!(h.pipeline.link().connector().opens(), 0);
}

#[tokio::test]
async fn run_can_be_cancelled_while_waiting_for_the_port() {
    // Port never appears: only cancellation ends the loop.
    let connector = MockConnector::new();
    let mut h = Harness::new(connector);
    let (tx, rx) = watch::channel(false);

    let run = h.pipeline.run(rx);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send_replace(true);
    };
    let (stats, ()) = tokio::join!(run, cancel);

    assert!(stats.is_ok());
    assert!(!h.delay.calls().is_empty());
    assert_eq!(h.pipeline.link().state(), ConnectionState::Disconnected);
}
