//! Shared test fixtures: an in-memory upstream that speaks Twelve Data JSON.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, StreamExt};
use tokio::sync::{Semaphore, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use price_stream_proxy::infrastructure::twelvedata::TwelveDataCodec;
use price_stream_proxy::{
    ConnectionState, InboundFrame, OutboundFrame, PriceStream, StreamSettings, TransportError,
    UpstreamConnector, UpstreamLink,
};

/// How long a test waits for something the stream should do on its own.
pub const WAIT: Duration = Duration::from_secs(1);

// =============================================================================
// Fake Upstream
// =============================================================================

/// Server side of one fake session.
///
/// Dropping it (or calling [`FakeUpstream::disconnect`]) ends the session's
/// inbound stream, which the stream treats as the upstream closing.
pub struct FakeUpstream {
    sent: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: mpsc::UnboundedSender<Result<InboundFrame, TransportError>>,
    writer_broken: Arc<AtomicBool>,
    codec: TwelveDataCodec,
}

impl FakeUpstream {
    /// Next frame the proxy sent, waiting up to [`WAIT`].
    pub async fn next_sent(&mut self) -> OutboundFrame {
        tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("no frame sent upstream in time")
            .expect("session writer closed")
    }

    /// Next non-heartbeat frame.
    pub async fn next_control(&mut self) -> OutboundFrame {
        loop {
            let frame = self.next_sent().await;
            if frame != OutboundFrame::Heartbeat {
                return frame;
            }
        }
    }

    /// A frame already sent, without waiting.
    pub fn try_sent(&mut self) -> Option<OutboundFrame> {
        self.sent.try_recv().ok()
    }

    /// Deliver raw upstream JSON. Undecodable text is dropped, as the real
    /// connector does.
    pub fn push(&self, json: &str) {
        if let Ok(frame) = self.codec.decode(json) {
            let _ = self.inbound.send(Ok(frame));
        }
    }

    /// Deliver a transport failure.
    pub fn fail(&self, error: TransportError) {
        let _ = self.inbound.send(Err(error));
    }

    /// Make every later send on this session fail while the inbound side
    /// stays open.
    pub fn break_writer(&self) {
        self.writer_broken.store(true, Ordering::SeqCst);
    }

    /// Close the session from the upstream side.
    pub fn disconnect(self) {}
}

/// Sink half of a fake session.
///
/// Unlike `futures::sink::unfold` it stays usable after an error: each
/// failed send reports an error and the next one is attempted normally.
struct ChannelSink {
    tx: mpsc::UnboundedSender<OutboundFrame>,
    broken: Arc<AtomicBool>,
}

impl Sink<OutboundFrame> for ChannelSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, frame: OutboundFrame) -> Result<(), Self::Error> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(TransportError::Send("writer broken".to_string()));
        }
        self.tx
            .send(frame)
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

// =============================================================================
// Scripted Connector
// =============================================================================

/// [`UpstreamConnector`] handing out [`FakeUpstream`] sessions.
pub struct ScriptedConnector {
    attempts: AtomicUsize,
    failures: AtomicUsize,
    panics: AtomicBool,
    gate: Option<Semaphore>,
    sessions: mpsc::UnboundedSender<FakeUpstream>,
}

impl ScriptedConnector {
    /// Connector that succeeds immediately.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeUpstream>) {
        Self::build(None)
    }

    /// Connector whose attempts block until [`ScriptedConnector::release`].
    pub fn gated() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeUpstream>) {
        Self::build(Some(Semaphore::new(0)))
    }

    fn build(gate: Option<Semaphore>) -> (Arc<Self>, mpsc::UnboundedReceiver<FakeUpstream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            panics: AtomicBool::new(false),
            gate,
            sessions: tx,
        });
        (connector, rx)
    }

    /// Make the next `n` attempts fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Make the next attempt panic inside the session task.
    pub fn panic_next(&self) {
        self.panics.store(true, Ordering::SeqCst);
    }

    /// Let one blocked attempt proceed.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Number of connection attempts made.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamConnector for ScriptedConnector {
    async fn connect(&self) -> Result<UpstreamLink, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?
                .forget();
        }

        assert!(
            !self.panics.swap(false, Ordering::SeqCst),
            "scripted connector panic"
        );

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Connect("scripted failure".to_string()));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let writer_broken = Arc::new(AtomicBool::new(false));

        let sink = ChannelSink {
            tx: sent_tx,
            broken: Arc::clone(&writer_broken),
        };
        let stream = UnboundedReceiverStream::new(inbound_rx).boxed();

        let _ = self.sessions.send(FakeUpstream {
            sent: sent_rx,
            inbound: inbound_tx,
            writer_broken,
            codec: TwelveDataCodec::new(),
        });

        Ok(UpstreamLink::new(Box::pin(sink), stream))
    }

    fn endpoint(&self) -> String {
        "scripted://upstream".to_string()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Default settings: 10s heartbeat, fixed 2s reconnect.
pub fn settings() -> StreamSettings {
    StreamSettings::default()
}

/// Stream over a fresh scripted connector.
pub fn stream_with(
    settings: StreamSettings,
) -> (
    PriceStream,
    Arc<ScriptedConnector>,
    mpsc::UnboundedReceiver<FakeUpstream>,
) {
    let (connector, sessions) = ScriptedConnector::new();
    let stream = PriceStream::new(connector.clone(), settings);
    (stream, connector, sessions)
}

/// Wait for the connector to hand out its next session.
pub async fn next_session(sessions: &mut mpsc::UnboundedReceiver<FakeUpstream>) -> FakeUpstream {
    tokio::time::timeout(WAIT, sessions.recv())
        .await
        .expect("no session opened in time")
        .expect("connector dropped")
}

/// Poll until the stream reaches `state`.
pub async fn wait_for_state(stream: &PriceStream, state: ConnectionState) {
    for _ in 0..200 {
        if stream.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("stream stuck in {:?}, expected {state:?}", stream.state());
}

/// Let spawned tasks run without moving the clock far.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Symbols as owned strings.
pub fn symbols(raw: &[&str]) -> Vec<String> {
    raw.iter().map(ToString::to_string).collect()
}
