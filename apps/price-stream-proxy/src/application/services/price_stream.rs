//! Price Stream Service
//!
//! Owns the single upstream session and everything that hangs off it: the
//! subscription book, the connection lifecycle, the heartbeat and reconnect
//! timers. [`PriceStream`] is a cheap cloneable handle shared with the HTTP
//! layer.
//!
//! All state transitions happen under one mutex. Network I/O never does:
//! frames for the live session are queued on an unbounded channel that the
//! session task drains into the upstream sink.
//!
//! ```text
//!  subscribe/unsubscribe ──► Core (lifecycle + book) ──► outbound channel ──► sink
//!                                     ▲
//!  upstream stream ──► MessageRouter ─┴─► PriceCache
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{TransportError, UpstreamConnector, UpstreamLink};
use crate::application::services::heartbeat::{HeartbeatConfig, HeartbeatState, HeartbeatTask};
use crate::application::services::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::services::router::{AckMode, MessageRouter, RouteOutcome};
use crate::domain::cache::PriceCache;
use crate::domain::connection::{
    CloseOutcome, ConnectionLifecycle, ConnectionState, RetryTicket, SessionId,
};
use crate::domain::streaming::{InboundFrame, OutboundFrame, PriceSample};
use crate::domain::subscription::{SubscriptionBook, Symbol, normalize_symbols};

// =============================================================================
// Settings
// =============================================================================

/// Tuning for the upstream session.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Heartbeat timing.
    pub heartbeat: HeartbeatConfig,
    /// Reconnect timing.
    pub reconnect: ReconnectConfig,
    /// Upper bound on the connection handshake.
    pub connect_timeout: Duration,
    /// How subscribe acknowledgements are treated.
    pub ack_mode: AckMode,
    /// Re-send the whole desired set on every new session (otherwise only
    /// the pending queue is flushed).
    pub resubscribe_on_reconnect: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(10),
            ack_mode: AckMode::default(),
            resubscribe_on_reconnect: true,
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Snapshot of the stream for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    /// A session is established.
    pub connected: bool,
    /// A connection attempt is in flight.
    pub connecting: bool,
    /// Symbols believed active on the current session.
    pub active_subscriptions: Vec<Symbol>,
    /// Symbols waiting for a session.
    pub pending_subscribe: Vec<Symbol>,
    /// Number of symbols with a cached price.
    pub cache_size: usize,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Everything callers currently want streamed.
    pub desired_subscriptions: Vec<Symbol>,
    /// A reconnect timer is armed.
    pub reconnect_pending: bool,
    /// Current session id, if any.
    pub session_id: Option<String>,
    /// When the current session's attempt started (epoch milliseconds).
    pub session_started_at: Option<i64>,
    /// Configured ack mode.
    pub ack_mode: AckMode,
    /// Milliseconds since the last heartbeat ack on the current session.
    pub last_heartbeat_ack_ms: Option<u64>,
}

// =============================================================================
// Shared State
// =============================================================================

struct LiveSession {
    id: SessionId,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    heartbeat: CancellationToken,
}

impl LiveSession {
    fn send(&self, frame: OutboundFrame) {
        if let Err(mpsc::error::SendError(frame)) = self.outbound.send(frame) {
            tracing::warn!(
                session = %self.id,
                action = frame.action(),
                symbols = ?frame.symbols(),
                "Session writer gone, frame dropped"
            );
        }
    }
}

struct Core {
    lifecycle: ConnectionLifecycle,
    book: SubscriptionBook,
    link: Option<LiveSession>,
    retry_timer: Option<CancellationToken>,
    reconnect: ReconnectPolicy,
}

struct Shared {
    connector: Option<Arc<dyn UpstreamConnector>>,
    settings: StreamSettings,
    cache: Arc<PriceCache>,
    heartbeat: Arc<HeartbeatState>,
    router: MessageRouter,
    shutdown: CancellationToken,
    core: Mutex<Core>,
}

// =============================================================================
// Price Stream
// =============================================================================

/// Handle to the upstream price stream.
///
/// Must be used from within a tokio runtime; session and timer tasks are
/// spawned on the current runtime.
#[derive(Clone)]
pub struct PriceStream {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for PriceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceStream")
            .field("settings", &self.shared.settings)
            .field("has_connector", &self.shared.connector.is_some())
            .finish_non_exhaustive()
    }
}

impl PriceStream {
    /// Create a stream that connects through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn UpstreamConnector>, settings: StreamSettings) -> Self {
        Self::build(Some(connector), settings)
    }

    /// Create a stream without an upstream.
    ///
    /// Subscriptions are recorded and queued but no connection is ever made.
    #[must_use]
    pub fn inert(settings: StreamSettings) -> Self {
        Self::build(None, settings)
    }

    fn build(connector: Option<Arc<dyn UpstreamConnector>>, settings: StreamSettings) -> Self {
        let cache = Arc::new(PriceCache::new());
        let heartbeat = Arc::new(HeartbeatState::new());
        let router = MessageRouter::new(Arc::clone(&cache), Arc::clone(&heartbeat), settings.ack_mode);
        let reconnect = ReconnectPolicy::new(settings.reconnect.clone());

        Self {
            shared: Arc::new(Shared {
                connector,
                settings,
                cache,
                heartbeat,
                router,
                shutdown: CancellationToken::new(),
                core: Mutex::new(Core {
                    lifecycle: ConnectionLifecycle::new(),
                    book: SubscriptionBook::new(),
                    link: None,
                    retry_timer: None,
                    reconnect,
                }),
            }),
        }
    }

    /// Begin connecting if idle. Does not subscribe to anything.
    pub fn start_stream(&self) {
        self.begin_attempt();
    }

    /// Subscribe to symbols.
    ///
    /// Symbols are trimmed, uppercased and deduplicated; the normalized list
    /// is returned. While connected, only symbols not already active are sent
    /// upstream. Otherwise they are queued and a connection attempt starts.
    pub fn subscribe<I, S>(&self, symbols: I) -> Vec<Symbol>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return symbols;
        }

        let needs_connect = {
            let mut guard = self.shared.core.lock();
            let core = &mut *guard;

            if let Some(link) = &core.link {
                let to_add = core.book.subscribe_connected(&symbols);
                if !to_add.is_empty() {
                    tracing::info!(session = %link.id, symbols = ?to_add, "Subscribing");
                    link.send(OutboundFrame::Subscribe(to_add));
                }
                false
            } else {
                core.book.subscribe_offline(&symbols);
                tracing::debug!(symbols = ?symbols, "Queued subscribe until connected");
                true
            }
        };

        if needs_connect {
            self.begin_attempt();
        }

        symbols
    }

    /// Unsubscribe from symbols.
    ///
    /// Always removes them from the desired set and pending queue. Only
    /// symbols active on a connected session produce an upstream frame.
    pub fn unsubscribe<I, S>(&self, symbols: I) -> Vec<Symbol>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return symbols;
        }

        let mut guard = self.shared.core.lock();
        let core = &mut *guard;

        let to_remove = core.book.unsubscribe(&symbols, core.link.is_some());
        if let Some(link) = &core.link
            && !to_remove.is_empty()
        {
            tracing::info!(session = %link.id, symbols = ?to_remove, "Unsubscribing");
            link.send(OutboundFrame::Unsubscribe(to_remove));
        }

        symbols
    }

    /// Latest cached prices for the given symbols.
    ///
    /// Symbols without a price are absent from the result.
    #[must_use]
    pub fn get_prices<I, S>(&self, symbols: I) -> BTreeMap<Symbol, PriceSample>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.shared.cache.get(&normalize_symbols(symbols))
    }

    /// Diagnostic snapshot.
    #[must_use]
    pub fn get_status(&self) -> StreamStatus {
        let core = self.shared.core.lock();
        let state = core.lifecycle.state();

        StreamStatus {
            connected: state == ConnectionState::Connected,
            connecting: state == ConnectionState::Connecting,
            active_subscriptions: core.book.active(),
            pending_subscribe: core.book.pending(),
            cache_size: self.shared.cache.len(),
            state,
            desired_subscriptions: core.book.desired(),
            reconnect_pending: core.lifecycle.retry_armed(),
            session_id: core.lifecycle.session().map(|s| s.id().to_string()),
            session_started_at: core
                .lifecycle
                .session()
                .map(|s| s.created_at().timestamp_millis()),
            ack_mode: self.shared.settings.ack_mode,
            last_heartbeat_ack_ms: self
                .shared
                .heartbeat
                .time_since_ack()
                .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.core.lock().lifecycle.state()
    }

    /// Check if a session is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Heartbeat counters for the current session.
    #[must_use]
    pub fn heartbeat(&self) -> Arc<HeartbeatState> {
        Arc::clone(&self.shared.heartbeat)
    }

    /// Stop all session and timer tasks. No new attempts are made afterwards.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    fn begin_attempt(&self) {
        let Some(connector) = self.shared.connector.clone() else {
            return;
        };
        if self.shared.shutdown.is_cancelled() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("No tokio runtime, cannot connect upstream");
            return;
        };

        let session = {
            let mut core = self.shared.core.lock();
            let Some(attempt) = core.lifecycle.begin_attempt() else {
                return;
            };
            if attempt.superseded_retry.is_some()
                && let Some(timer) = core.retry_timer.take()
            {
                timer.cancel();
            }
            attempt.session
        };

        let task = runtime.spawn(self.clone().run_session(connector, session));
        runtime.spawn(self.clone().watch_session(session, task));
    }

    /// Close out a session whose task panicked, so the lifecycle does not
    /// stay parked on it.
    async fn watch_session(self, id: SessionId, task: JoinHandle<()>) {
        match task.await {
            Ok(()) => {}
            Err(error) if error.is_panic() => {
                tracing::error!(session = %id, error = %error, "Session task panicked");
                self.on_session_closed(id);
            }
            Err(error) => {
                tracing::debug!(session = %id, error = %error, "Session task cancelled");
            }
        }
    }

    async fn run_session(self, connector: Arc<dyn UpstreamConnector>, id: SessionId) {
        let timeout = self.shared.settings.connect_timeout;
        tracing::info!(session = %id, endpoint = %connector.endpoint(), "Connecting to upstream");

        let connected = tokio::select! {
            () = self.shared.shutdown.cancelled() => return,
            result = tokio::time::timeout(timeout, connector.connect()) => {
                result.unwrap_or_else(|_| Err(TransportError::ConnectTimeout(timeout)))
            }
        };

        let UpstreamLink {
            mut sink,
            mut stream,
        } = match connected {
            Ok(link) => link,
            Err(error) => {
                tracing::warn!(session = %id, error = %error, "Upstream connection failed");
                self.on_session_closed(id);
                return;
            }
        };

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        if !self.on_session_established(id, outbound_tx) {
            return;
        }

        loop {
            tokio::select! {
                () = self.shared.shutdown.cancelled() => {
                    if let Err(error) = sink.close().await {
                        tracing::debug!(session = %id, error = %error, "Close on shutdown failed");
                    }
                    break;
                }
                Some(frame) = outbound_rx.recv() => {
                    let action = frame.action();
                    let symbols = frame.symbols().to_vec();
                    if let Err(error) = sink.send(frame).await {
                        tracing::warn!(session = %id, action, ?symbols, error = %error, "Upstream send failed");
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(frame)) => self.on_frame(id, frame),
                    Some(Err(error)) => {
                        tracing::warn!(session = %id, error = %error, "Upstream transport error");
                        break;
                    }
                    None => {
                        tracing::warn!(session = %id, "Upstream closed the connection");
                        break;
                    }
                },
            }
        }

        self.on_session_closed(id);
    }

    fn on_session_established(
        &self,
        id: SessionId,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
    ) -> bool {
        let mut guard = self.shared.core.lock();
        let core = &mut *guard;

        if !core.lifecycle.on_established(id) {
            tracing::debug!(session = %id, "Ignoring stale session");
            return false;
        }
        core.reconnect.reset();

        self.shared.heartbeat.reset();
        let heartbeat_cancel = self.shared.shutdown.child_token();
        tokio::spawn(
            HeartbeatTask::new(
                self.shared.settings.heartbeat.clone(),
                id,
                Arc::clone(&self.shared.heartbeat),
                outbound.clone(),
                heartbeat_cancel.clone(),
            )
            .run(),
        );

        let link = LiveSession {
            id,
            outbound,
            heartbeat: heartbeat_cancel,
        };

        let batch = core
            .book
            .on_session_connected(self.shared.settings.resubscribe_on_reconnect);
        tracing::info!(session = %id, resubscribing = batch.len(), "Upstream connected");
        if !batch.is_empty() {
            link.send(OutboundFrame::Subscribe(batch));
        }

        core.link = Some(link);
        true
    }

    fn on_session_closed(&self, id: SessionId) {
        let mut core = self.shared.core.lock();

        if let Some(link) = core.link.take_if(|link| link.id == id) {
            link.heartbeat.cancel();
        }

        let CloseOutcome::Closed { retry: ticket, .. } = core.lifecycle.on_closed(id) else {
            return;
        };
        if self.shared.shutdown.is_cancelled() {
            return;
        }

        let delay = core.reconnect.next_delay();
        let cancel = self.shared.shutdown.child_token();
        core.retry_timer = Some(cancel.clone());
        tracing::info!(
            session = %id,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = core.reconnect.attempt_count(),
            "Reconnect scheduled"
        );

        tokio::spawn(self.clone().retry_after(delay, ticket, cancel));
    }

    async fn retry_after(self, delay: Duration, ticket: RetryTicket, cancel: CancellationToken) {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        let fired = {
            let mut core = self.shared.core.lock();
            let fired = core.lifecycle.on_retry_fired(ticket);
            if fired {
                core.retry_timer = None;
            }
            fired
        };

        if fired {
            self.begin_attempt();
        }
    }

    fn on_frame(&self, id: SessionId, frame: InboundFrame) {
        let RouteOutcome::Reject(symbols) = self.shared.router.route(id, frame) else {
            return;
        };

        let mut core = self.shared.core.lock();
        if !core.lifecycle.is_connected_session(id) {
            return;
        }
        let removed = core.book.reject(&symbols);
        if !removed.is_empty() {
            tracing::info!(session = %id, symbols = ?removed, "Dropped refused symbols from active set");
        }
    }
}
