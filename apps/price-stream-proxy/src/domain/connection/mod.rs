//! Connection Lifecycle
//!
//! Pure state machine for the single upstream session. It decides *whether*
//! to connect, when a session counts as established, and when a retry timer
//! must be armed; the application service performs the I/O and timers.
//!
//! ```text
//!  Disconnected ──start/subscribe──► Connecting ──established──► Connected
//!       ▲                               │                          │
//!       │                            failed                      closed
//!   retry fired                         ▼                          │
//!       └──────────────────────── ClosingRetry ◄──────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// =============================================================================
// Types
// =============================================================================

/// Connection state of the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session and no retry scheduled.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Session established.
    Connected,
    /// Session ended; reconnect timer armed.
    ClosingRetry,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ClosingRetry => "closing_retry",
        }
    }

    /// Numeric code for gauges.
    #[must_use]
    pub const fn as_code(&self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::ClosingRetry => 3,
        }
    }
}

/// Identity of one upstream connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Handshake in progress.
    Connecting,
    /// Live.
    Connected,
    /// Ended.
    Closed,
}

/// One upstream connection attempt / instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    status: SessionStatus,
    created_at: DateTime<Utc>,
}

impl Session {
    fn connecting(created_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            status: SessionStatus::Connecting,
            created_at,
        }
    }

    /// Session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// When the attempt started.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Identifies one armed reconnect timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTicket(u64);

/// Result of starting a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// The new session.
    pub session: SessionId,
    /// Retry timer that this attempt supersedes and that must be cancelled.
    pub superseded_retry: Option<RetryTicket>,
}

/// Result of a session ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The event belongs to a session that is no longer current.
    Stale,
    /// The current session ended.
    Closed {
        /// The ended session (status `Closed`).
        session: Session,
        /// Newly armed retry timer.
        retry: RetryTicket,
    },
}

// =============================================================================
// Lifecycle
// =============================================================================

/// State machine for the single upstream session.
///
/// # Example
///
/// ```rust
/// use price_stream_proxy::domain::connection::{CloseOutcome, ConnectionLifecycle, ConnectionState};
///
/// let mut lifecycle = ConnectionLifecycle::new();
///
/// let attempt = lifecycle.begin_attempt().unwrap();
/// assert!(lifecycle.begin_attempt().is_none()); // one attempt at a time
///
/// assert!(lifecycle.on_established(attempt.session));
/// assert_eq!(lifecycle.state(), ConnectionState::Connected);
///
/// let CloseOutcome::Closed { retry, .. } = lifecycle.on_closed(attempt.session) else {
///     unreachable!()
/// };
/// assert_eq!(lifecycle.state(), ConnectionState::ClosingRetry);
///
/// assert!(lifecycle.on_retry_fired(retry));
/// assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
/// ```
#[derive(Debug, Default)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
    session: Option<Session>,
    retry: Option<RetryTicket>,
    next_ticket: u64,
}

impl ConnectionLifecycle {
    /// Create a lifecycle in the `Disconnected` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current session, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Check whether the session with `id` is current and connected.
    #[must_use]
    pub fn is_connected_session(&self, id: SessionId) -> bool {
        self.state == ConnectionState::Connected && self.session.as_ref().is_some_and(|s| s.id == id)
    }

    /// Check whether a reconnect timer is armed.
    #[must_use]
    pub const fn retry_armed(&self) -> bool {
        self.retry.is_some()
    }

    /// Start a connection attempt.
    ///
    /// Returns `None` if a session is already connecting or connected.
    /// An armed retry timer is superseded by the new attempt.
    pub fn begin_attempt(&mut self) -> Option<Attempt> {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return None;
        }

        let session = Session::connecting(Utc::now());
        let id = session.id;
        self.session = Some(session);
        self.state = ConnectionState::Connecting;

        Some(Attempt {
            session: id,
            superseded_retry: self.retry.take(),
        })
    }

    /// The handshake for session `id` completed.
    ///
    /// Returns `false` if `id` is not the pending attempt.
    pub fn on_established(&mut self, id: SessionId) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }

        match self.session.as_mut() {
            Some(session) if session.id == id => {
                session.status = SessionStatus::Connected;
                self.state = ConnectionState::Connected;
                true
            }
            _ => false,
        }
    }

    /// Session `id` ended (graceful close, transport error or failed connect).
    ///
    /// Always arms a fresh retry timer. A ticket is only ever armed while no
    /// session is current, because [`Self::begin_attempt`] takes it.
    pub fn on_closed(&mut self, id: SessionId) -> CloseOutcome {
        let is_current = self.session.as_ref().is_some_and(|s| s.id == id);
        if !is_current {
            return CloseOutcome::Stale;
        }

        let Some(mut session) = self.session.take() else {
            return CloseOutcome::Stale;
        };
        session.status = SessionStatus::Closed;
        self.state = ConnectionState::ClosingRetry;

        debug_assert!(self.retry.is_none(), "retry armed while a session was current");
        let retry = RetryTicket(self.next_ticket);
        self.next_ticket += 1;
        self.retry = Some(retry);

        CloseOutcome::Closed { session, retry }
    }

    /// The retry timer identified by `ticket` fired.
    ///
    /// Returns `true` if the machine moved to `Disconnected` and a new
    /// attempt should begin. Superseded or cancelled tickets are ignored.
    pub fn on_retry_fired(&mut self, ticket: RetryTicket) -> bool {
        if self.retry != Some(ticket) {
            return false;
        }
        self.retry = None;

        if self.state == ConnectionState::ClosingRetry {
            self.state = ConnectionState::Disconnected;
            true
        } else {
            false
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
