//! Scripted link doubles for testing without a serial device.
//!
//! - [`MockConnector`] replays a script of connection outcomes.
//! - [`MockStream`] replays a script of reads; once the script runs out the
//!   stream stays idle (reads never complete), like a quiet serial port.
//! - [`RecordingDelay`] records requested waits and returns immediately.
//!
//! # Example
//!
//! ```
//! use sensor_daq::mock::{MockConnector, MockRead};
//!
//! let connector = MockConnector::new()
//!     .fail_open()
//!     .link(vec![MockRead::data(b"{\"nodeID\":\"N1\",\"temperature\":25,\"humidity\":50}\n")]);
//! assert_eq!(connector.remaining(), 2);
//! ```

use crate::link::{Connector, Delay, LinkStream};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

/// One scripted read outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRead {
    /// Deliver these bytes (possibly across several reads)
    Data(Vec<u8>),
    /// Stay pending for one poll; the next poll continues with the script
    Pause,
    /// Fail the read with this error kind
    Error(io::ErrorKind),
    /// End of stream
    Eof,
}

impl MockRead {
    /// Bytes to deliver.
    pub fn data(bytes: &[u8]) -> Self {
        MockRead::Data(bytes.to_vec())
    }

    /// A quiet period.
    pub fn pause() -> Self {
        MockRead::Pause
    }

    /// A read failure.
    pub fn error(kind: io::ErrorKind) -> Self {
        MockRead::Error(kind)
    }

    /// End of stream.
    pub fn eof() -> Self {
        MockRead::Eof
    }
}

/// Scripted byte stream.
#[derive(Debug, Default)]
pub struct MockStream {
    script: VecDeque<MockRead>,
}

impl MockStream {
    /// Stream replaying `script`.
    pub fn new(script: Vec<MockRead>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.script.pop_front() {
            // Idle: the caller's poll timeout is what wakes the task.
            None | Some(MockRead::Pause) => Poll::Pending,
            Some(MockRead::Error(kind)) => {
                Poll::Ready(Err(io::Error::new(kind, "scripted link failure")))
            }
            Some(MockRead::Eof) => Poll::Ready(Ok(())),
            Some(MockRead::Data(mut bytes)) => {
                let n = bytes.len().min(buf.remaining());
                buf.put_slice(&bytes[..n]);
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    self.script.push_front(MockRead::Data(rest));
                }
                Poll::Ready(Ok(()))
            }
        }
    }
}

#[derive(Debug)]
enum OpenOutcome {
    Fail,
    Link(Vec<MockRead>),
}

/// Scripted [`Connector`].
///
/// Each `open` consumes the next outcome. When the script is exhausted `open`
/// keeps failing with `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    script: Arc<Mutex<VecDeque<OpenOutcome>>>,
    opens: Arc<Mutex<u32>>,
}

impl MockConnector {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `open` fails.
    pub fn fail_open(self) -> Self {
        self.push(OpenOutcome::Fail);
        self
    }

    /// Next `open` succeeds with a stream replaying `reads`.
    pub fn link(self, reads: Vec<MockRead>) -> Self {
        self.push(OpenOutcome::Link(reads));
        self
    }

    /// Outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Number of `open` calls so far.
    pub fn opens(&self) -> u32 {
        self.opens.lock().map(|n| *n).unwrap_or(0)
    }

    fn push(&self, outcome: OpenOutcome) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn describe(&self) -> String {
        "mock link".to_string()
    }

    async fn open(&mut self) -> io::Result<LinkStream> {
        if let Ok(mut opens) = self.opens.lock() {
            *opens += 1;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(OpenOutcome::Link(reads)) => Ok(Box::new(MockStream::new(reads))),
            Some(OpenOutcome::Fail) | None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "mock port not found",
            )),
        }
    }
}

/// [`Delay`] that records each request and returns after a cooperative yield.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingDelay {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested duration, in order.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
        tokio::task::yield_now().await;
    }
}
