//! # Firehose Connection
//!
//! Owns the single physical streaming connection to the upstream endpoint
//! and recovers automatically from unclean loss.
//!
//! State machine: `Disconnected → Connecting → Connected → {Disconnected
//! (explicit) | Reconnecting (unclean)} → Connecting → …`. Explicit
//! disconnect is the only path that suppresses automatic reconnection.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::config::FirehoseConfig;
use crate::decoder;
use crate::errors::{FirehoseError, FirehoseResult};
use crate::event::Event;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Exponential reconnect backoff, capped and bounded in attempt count
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound on any retry delay
    pub max: Duration,
    /// Consecutive failures before giving up (0 means no retries)
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Create a policy
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`,
    /// capped at `max`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max)
    }

    /// Whether `failures` consecutive failed attempts exhaust the budget
    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            max_attempts: 20,
        }
    }
}

/// Lifecycle notification emitted by the connection
#[derive(Debug, Clone)]
pub enum ConnectionNotice {
    /// Transport opened and streaming
    Connected,
    /// Connection closed for good, no reconnect pending
    Disconnected { reason: String },
    /// Transport-level failure; a reconnect will be scheduled
    TransportError { message: String },
    /// One frame dropped; the connection is unaffected
    DecodeError { message: String },
}

/// Stream of raw inbound frames from one transport session
pub type FrameStream = Pin<Box<dyn Stream<Item = FirehoseResult<String>> + Send>>;

/// Consumer of decoded events, supplied by the client façade
pub type EventSink = Arc<dyn Fn(Event) + Send + Sync>;

/// Physical transport seam, injectable for tests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open one streaming session against `url`
    async fn open(&self, url: &str) -> FirehoseResult<FrameStream>;
}

/// WebSocket transport used in production
#[derive(Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> FirehoseResult<FrameStream> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| FirehoseError::Transport(e.to_string()))?;

        let frames = ws.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                // Control frames and binary payloads carry no events
                Ok(_) => None,
                Err(e) => Some(Err(FirehoseError::Transport(e.to_string()))),
            }
        });

        Ok(Box::pin(frames))
    }
}

/// The one physical connection, with reconnect supervision
pub struct Connection {
    config: FirehoseConfig,
    backoff: BackoffPolicy,
    transport: Arc<dyn Transport>,
    sink: EventSink,

    state: Arc<RwLock<ConnectionState>>,
    last_seq: Arc<Mutex<Option<u64>>>,
    reconnect_attempt: Arc<AtomicU32>,
    running: Arc<AtomicBool>,

    shutdown_tx: broadcast::Sender<()>,
    notice_tx: broadcast::Sender<ConnectionNotice>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("last_seq", &self.last_seq())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection. No transport activity happens until
    /// [`Connection::connect`].
    pub fn new(config: FirehoseConfig, transport: Arc<dyn Transport>, sink: EventSink) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (notice_tx, _) = broadcast::channel(64);
        let backoff = config.backoff();

        Self {
            config,
            backoff,
            transport,
            sink,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            last_seq: Arc::new(Mutex::new(None)),
            reconnect_attempt: Arc::new(AtomicU32::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            notice_tx,
        }
    }

    /// Begin connecting. Idempotent: while a supervisor task is alive
    /// (Connecting, Connected or Reconnecting) this is a no-op, so
    /// concurrent callers cannot race into duplicate transports.
    pub fn connect(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.reconnect_attempt.store(0, Ordering::SeqCst);
        set_state(&self.state, ConnectionState::Connecting);

        let ctx = Supervisor {
            config: self.config.clone(),
            backoff: self.backoff.clone(),
            transport: Arc::clone(&self.transport),
            sink: Arc::clone(&self.sink),
            state: Arc::clone(&self.state),
            last_seq: Arc::clone(&self.last_seq),
            reconnect_attempt: Arc::clone(&self.reconnect_attempt),
            running: Arc::clone(&self.running),
            shutdown_rx: self.shutdown_tx.subscribe(),
            notice_tx: self.notice_tx.clone(),
        };

        tokio::spawn(ctx.run());
    }

    /// Explicit, caller-initiated shutdown. Cancels any pending reconnect,
    /// closes the transport and suppresses further reconnection. No-op when
    /// already disconnected.
    pub fn disconnect(&self, reason: &str) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown_tx.send(());
        self.reconnect_attempt.store(0, Ordering::SeqCst);
        set_state(&self.state, ConnectionState::Disconnected);
        tracing::info!(reason, "firehose disconnected");
        let _ = self.notice_tx.send(ConnectionNotice::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// True iff the transport is open and streaming
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Last observed upstream sequence number, or `None` before any frame
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq.lock().ok().and_then(|g| *g)
    }

    /// Subscribe to lifecycle notifications
    pub fn notices(&self) -> broadcast::Receiver<ConnectionNotice> {
        self.notice_tx.subscribe()
    }
}

fn set_state(state: &RwLock<ConnectionState>, next: ConnectionState) {
    if let Ok(mut guard) = state.write() {
        *guard = next;
    }
}

/// State carried by the spawned supervisor task
struct Supervisor {
    config: FirehoseConfig,
    backoff: BackoffPolicy,
    transport: Arc<dyn Transport>,
    sink: EventSink,
    state: Arc<RwLock<ConnectionState>>,
    last_seq: Arc<Mutex<Option<u64>>>,
    reconnect_attempt: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
    shutdown_rx: broadcast::Receiver<()>,
    notice_tx: broadcast::Sender<ConnectionNotice>,
}

impl Supervisor {
    /// Connect, read until loss, back off, repeat. Exits on explicit
    /// disconnect or when the retry budget is exhausted.
    async fn run(mut self) {
        loop {
            let url = self.config.endpoint_url(self.cursor());

            let opened = tokio::select! {
                _ = self.shutdown_rx.recv() => return,
                opened = self.transport.open(&url) => opened,
            };

            match opened {
                Ok(mut frames) => {
                    set_state(&self.state, ConnectionState::Connected);
                    self.reconnect_attempt.store(0, Ordering::SeqCst);
                    tracing::info!(url = %url, "firehose connected");
                    self.notify(ConnectionNotice::Connected);

                    if self.read_frames(&mut frames).await {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "firehose connect failed");
                    self.notify(ConnectionNotice::TransportError {
                        message: e.to_string(),
                    });
                }
            }

            let failures = self.reconnect_attempt.fetch_add(1, Ordering::SeqCst) + 1;
            if self.backoff.exhausted(failures) {
                self.running.store(false, Ordering::SeqCst);
                set_state(&self.state, ConnectionState::Disconnected);
                tracing::error!(attempts = failures, "firehose retry budget exhausted");
                self.notify(ConnectionNotice::Disconnected {
                    reason: format!("giving up after {failures} failed attempts"),
                });
                return;
            }

            set_state(&self.state, ConnectionState::Reconnecting);
            let delay = self.backoff.delay_for(failures - 1);
            tracing::info!(
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "scheduling firehose reconnect"
            );

            tokio::select! {
                _ = self.shutdown_rx.recv() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            set_state(&self.state, ConnectionState::Connecting);
        }
    }

    /// Read frames until the session ends. Returns true when an explicit
    /// shutdown was requested, false on unclean loss.
    async fn read_frames(&mut self, frames: &mut FrameStream) -> bool {
        loop {
            let item = tokio::select! {
                _ = self.shutdown_rx.recv() => return true,
                item = frames.next() => item,
            };

            match item {
                Some(Ok(frame)) => self.ingest_frame(&frame),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "firehose transport error");
                    self.notify(ConnectionNotice::TransportError {
                        message: e.to_string(),
                    });
                    return false;
                }
                None => {
                    tracing::warn!("firehose stream closed by upstream");
                    self.notify(ConnectionNotice::TransportError {
                        message: "stream closed by upstream".to_string(),
                    });
                    return false;
                }
            }
        }
    }

    /// Decode one frame and hand the event to the sink. Decode failures
    /// drop the frame, still advancing the cursor when a seq is salvageable.
    fn ingest_frame(&self, frame: &str) {
        match decoder::decode_frame(frame) {
            Ok(event) => {
                self.store_seq(event.seq);
                (self.sink)(event);
            }
            Err(e) => {
                if let Some(seq) = decoder::extract_seq(frame) {
                    self.store_seq(seq);
                }
                tracing::warn!(error = %e, "dropping undecodable frame");
                self.notify(ConnectionNotice::DecodeError {
                    message: e.to_string(),
                });
            }
        }
    }

    fn cursor(&self) -> Option<u64> {
        self.last_seq.lock().ok().and_then(|g| *g)
    }

    fn store_seq(&self, seq: u64) {
        if let Ok(mut guard) = self.last_seq.lock() {
            *guard = Some(seq);
        }
    }

    fn notify(&self, notice: ConnectionNotice) {
        // Absent or lagging receivers never block the read path
        let _ = self.notice_tx.send(notice);
    }
}
