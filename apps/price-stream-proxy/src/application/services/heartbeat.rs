//! Heartbeat Task
//!
//! Sends an application-level heartbeat frame on the live session at a fixed
//! interval. Each task is bound to one session; the session cancels it when it
//! closes. Heartbeat acknowledgements are recorded but a missing ack never
//! tears the session down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::connection::SessionId;
use crate::domain::streaming::OutboundFrame;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between heartbeat frames.
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Heartbeat counters shared between the heartbeat task and the router.
#[derive(Debug)]
pub struct HeartbeatState {
    sent: AtomicU64,
    acked: AtomicU64,
    last_ack: RwLock<Option<Instant>>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            last_ack: RwLock::new(None),
        }
    }

    /// Record that a heartbeat was queued for sending.
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a heartbeat acknowledgement from upstream.
    pub fn record_ack(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
        *self.last_ack.write() = Some(Instant::now());
    }

    /// Heartbeats sent since the last reset.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Acknowledgements received since the last reset.
    #[must_use]
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    /// Time since the last acknowledgement, if any.
    #[must_use]
    pub fn time_since_ack(&self) -> Option<Duration> {
        self.last_ack.read().map(|at| at.elapsed())
    }

    /// Reset for a new session.
    pub fn reset(&self) {
        self.sent.store(0, Ordering::Relaxed);
        self.acked.store(0, Ordering::Relaxed);
        *self.last_ack.write() = None;
    }
}

/// Periodic heartbeat sender for one session.
pub struct HeartbeatTask {
    config: HeartbeatConfig,
    session: SessionId,
    state: Arc<HeartbeatState>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    cancel: CancellationToken,
}

impl HeartbeatTask {
    /// Create a heartbeat task for `session`.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        session: SessionId,
        state: Arc<HeartbeatState>,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            session,
            state,
            outbound,
            cancel,
        }
    }

    /// Run until cancelled or the session's outbound channel closes.
    ///
    /// The first heartbeat goes out one full interval after start.
    pub async fn run(self) {
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut interval = tokio::time::interval_at(start, self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!(session = %self.session, "Heartbeat task cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.outbound.send(OutboundFrame::Heartbeat).is_err() {
                        tracing::debug!(session = %self.session, "Session channel closed, stopping heartbeat");
                        break;
                    }
                    self.state.record_sent();
                }
            }
        }
    }
}
