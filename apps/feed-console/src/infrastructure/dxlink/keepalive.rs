//! Keepalive Manager
//!
//! dxLink peers agree on keepalive timeouts in `SETUP`: each side must send
//! something within the timeout the other accepts. The manager asks the
//! connection task to send `KEEPALIVE` on a fixed interval and reports a
//! timeout when the server has been silent for too long.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for keepalive behavior.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Interval between outgoing `KEEPALIVE` messages.
    pub interval: Duration,
    /// Silence from the server after which the connection is considered dead.
    pub timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

impl KeepaliveConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Timeout in whole seconds as announced in `SETUP`, at least one.
    #[must_use]
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs().max(1)
    }
}

/// Events emitted by the keepalive manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepaliveEvent {
    /// Send a `KEEPALIVE` message.
    SendKeepalive,
    /// The server has been silent past the timeout.
    Timeout,
}

/// Time of the last message received from the server.
#[derive(Debug)]
pub struct KeepaliveState {
    last_received: RwLock<Instant>,
}

impl Default for KeepaliveState {
    fn default() -> Self {
        Self::new()
    }
}

impl KeepaliveState {
    /// Create new keepalive state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_received: RwLock::new(Instant::now()),
        }
    }

    /// Record that something was received from the server.
    pub fn record_activity(&self) {
        *self.last_received.write() = Instant::now();
    }

    /// Time since the server last sent anything.
    #[must_use]
    pub fn time_since_activity(&self) -> Duration {
        self.last_received.read().elapsed()
    }
}

/// Drives outgoing keepalives and detects a silent server.
pub struct KeepaliveManager {
    config: KeepaliveConfig,
    state: Arc<KeepaliveState>,
    event_tx: mpsc::Sender<KeepaliveEvent>,
    cancel: CancellationToken,
}

impl KeepaliveManager {
    /// Create a new keepalive manager.
    #[must_use]
    pub const fn new(
        config: KeepaliveConfig,
        state: Arc<KeepaliveState>,
        event_tx: mpsc::Sender<KeepaliveEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, until the event channel closes, or until a
    /// timeout has been reported.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keepalive manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if !self.tick().await {
                        break;
                    }
                }
            }
        }
    }

    /// Returns `false` when the loop should stop.
    async fn tick(&self) -> bool {
        let silent_for = self.state.time_since_activity();
        if silent_for > self.config.timeout {
            tracing::warn!(
                silent_secs = silent_for.as_secs(),
                timeout_secs = self.config.timeout.as_secs(),
                "Keepalive timeout detected"
            );
            let _ = self.event_tx.send(KeepaliveEvent::Timeout).await;
            return false;
        }

        if self.event_tx.send(KeepaliveEvent::SendKeepalive).await.is_err() {
            tracing::debug!("Event channel closed, stopping keepalive");
            return false;
        }
        true
    }
}
