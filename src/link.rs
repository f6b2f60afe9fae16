//! Serial link lifecycle: connect with retry, poll for lines, close.
//!
//! [`ConnectionManager`] owns the byte stream and the [`ConnectionState`]. The
//! stream itself comes from a [`Connector`] so that the production serial port
//! and scripted test links share the same code path. Waiting between connection
//! attempts goes through a [`Delay`], which lets tests retry without real time
//! passing.
//!
//! Reads use `AsyncBufReadExt::read_until`, which keeps partially read bytes in
//! the caller's buffer when the poll window expires. A line split across two
//! polls is therefore never lost.

use crate::error::LinkError;
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Boxed byte stream handed out by a [`Connector`].
pub type LinkStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opens the underlying byte stream.
#[async_trait]
pub trait Connector: Send {
    /// Human-readable endpoint, e.g. `"COM8 @ 115200 baud"`.
    fn describe(&self) -> String;

    /// Try once to open the link.
    async fn open(&mut self) -> io::Result<LinkStream>;
}

/// Waits between connection attempts.
#[async_trait]
pub trait Delay: Send + Sync {
    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Delay`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry policy for [`ConnectionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed wait between failed attempts
    pub delay: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

/// Whether a live stream is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream open
    Disconnected,
    /// Stream open and readable
    Connected,
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, without its trailing `\n`
    Line(Vec<u8>),
    /// Nothing arrived within the poll window
    Empty,
}

/// Owns the link and its connection state.
pub struct ConnectionManager<C, D = TokioDelay> {
    connector: C,
    delay: D,
    policy: ReconnectPolicy,
    poll_interval: Duration,
    reader: Option<BufReader<LinkStream>>,
    pending: Vec<u8>,
    state: watch::Sender<ConnectionState>,
}

impl<C: Connector> ConnectionManager<C, TokioDelay> {
    /// Create a manager that sleeps on the tokio timer between attempts.
    pub fn new(connector: C, policy: ReconnectPolicy, poll_interval: Duration) -> Self {
        Self::with_delay(connector, TokioDelay, policy, poll_interval)
    }
}

impl<C: Connector, D: Delay> ConnectionManager<C, D> {
    /// Create a manager with a custom [`Delay`].
    pub fn with_delay(
        connector: C,
        delay: D,
        policy: ReconnectPolicy,
        poll_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            delay,
            policy,
            poll_interval,
            reader: None,
            pending: Vec::new(),
            state,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Endpoint description of the connector.
    pub fn describe(&self) -> String {
        self.connector.describe()
    }

    /// The connector, e.g. to inspect a mock.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open the link, retrying with the fixed policy delay until it succeeds.
    ///
    /// Returns the number of attempts it took. Only a bounded policy can fail,
    /// with [`LinkError::RetriesExhausted`].
    pub async fn connect(&mut self) -> Result<u32, LinkError> {
        self.close();
        let endpoint = self.connector.describe();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.connector.open().await {
                Ok(stream) => {
                    self.reader = Some(BufReader::new(stream));
                    self.state.send_replace(ConnectionState::Connected);
                    info!(endpoint = %endpoint, attempts, "Connected to {}", endpoint);
                    return Ok(attempts);
                }
                Err(e) => {
                    if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                        warn!(endpoint = %endpoint, attempts, error = %e, "Giving up on link");
                        return Err(LinkError::RetriesExhausted {
                            port: endpoint,
                            attempts,
                        });
                    }
                    warn!(
                        endpoint = %endpoint,
                        attempt = attempts,
                        error = %e,
                        "Port {} not available. Retrying in {:?}...",
                        endpoint,
                        self.policy.delay
                    );
                    self.delay.sleep(self.policy.delay).await;
                }
            }
        }
    }

    /// Poll for the next line for at most one poll interval.
    ///
    /// Any I/O failure, end of stream, or a missing connection surfaces as
    /// [`LinkError::LinkLost`]; the caller must `close` and `connect` again.
    pub async fn read_line(&mut self) -> Result<LineRead, LinkError> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(LinkError::LinkLost(io::Error::new(
                io::ErrorKind::NotConnected,
                "link is not connected",
            )));
        };

        let read = tokio::time::timeout(
            self.poll_interval,
            reader.read_until(b'\n', &mut self.pending),
        )
        .await;

        match read {
            Err(_elapsed) => Ok(LineRead::Empty),
            Ok(Ok(0)) => Err(LinkError::LinkLost(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "link closed by peer",
            ))),
            Ok(Ok(_)) => {
                let mut line = std::mem::take(&mut self.pending);
                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                debug!(bytes = line.len(), "Line received");
                Ok(LineRead::Line(line))
            }
            Ok(Err(e)) => Err(LinkError::LinkLost(e)),
        }
    }

    /// Release the stream. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!(endpoint = %self.connector.describe(), "Link closed");
        }
        self.pending.clear();
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

/// Production connector for a serial port (8N1, no flow control).
#[cfg(feature = "serial")]
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
    timeout: Duration,
}

#[cfg(feature = "serial")]
impl SerialConnector {
    /// Connector for `port` at `baud_rate`.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            timeout: Duration::from_secs(2),
        }
    }

    /// Driver-level timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from the serial section of the configuration.
    pub fn from_config(config: &crate::config::SerialConfig) -> Self {
        Self::new(config.port.clone(), config.baud_rate).with_timeout(config.timeout())
    }
}

#[cfg(feature = "serial")]
#[async_trait]
impl Connector for SerialConnector {
    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port, self.baud_rate)
    }

    async fn open(&mut self) -> io::Result<LinkStream> {
        use tokio_serial::SerialPortBuilderExt;

        let stream = tokio_serial::new(&self.port, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(self.timeout)
            .open_native_async()
            .map_err(io::Error::from)?;
        Ok(Box::new(stream))
    }
}
