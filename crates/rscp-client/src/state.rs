// ============================================
// File: crates/rscp-client/src/state.rs
// ============================================
//! # Session State
//!
//! ## Creation Reason
//! The session handle, the dispatcher task and the keep-alive task all
//! need to see the same connection state and the same "last activity"
//! instant. `SessionStatus` is that shared record.
//!
//! ## State Machine
//! ```text
//! ┌──────────────┐  connect   ┌───────────┐  auth request  ┌────────────────┐
//! │ Disconnected │ ─────────► │ Connected │ ─────────────► │ Authenticating │
//! └──────────────┘            └───────────┘                └───────┬────────┘
//!        ▲                                        level > 0        │   error / level 0 /
//!        │                                      ┌──────────────────┤   timeout
//!        │ disconnect                           ▼                  ▼
//!        │                              ┌───────────────┐   ┌──────────┐
//!        └──────────────────────────────│ Authenticated │──►│ Faulted  │
//!                                       └───────────────┘   └──────────┘
//!                                          fatal error / repeated timeouts
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A fault never overrides `Disconnected`: an explicit disconnect wins
//!   over a dispatcher failing during shutdown
//! - Instants come from the tokio clock so paused-time tests work
//!
//! ## Last Modified
//! v0.1.0 - Initial session state

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use rscp_common::AtomicInstant;

// ============================================
// SessionState
// ============================================

/// Connection state of a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No transport.
    Disconnected,
    /// Transport established, nothing sent yet.
    Connected,
    /// Authentication request sent, waiting for the reply.
    Authenticating,
    /// Ready for exchanges.
    Authenticated,
    /// Unrecoverable error; only `disconnect` or `reconnect` help.
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Authenticated => write!(f, "Authenticated"),
            Self::Faulted => write!(f, "Faulted"),
        }
    }
}

// ============================================
// Clock
// ============================================

/// Current instant on the tokio clock.
pub(crate) fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

// ============================================
// SessionStatus
// ============================================

/// State shared by the session handle and its tasks.
#[derive(Debug)]
pub(crate) struct SessionStatus {
    state: RwLock<SessionState>,
    fault: Mutex<Option<String>>,
    last_activity: AtomicInstant,
}

impl SessionStatus {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Disconnected),
            fault: Mutex::new(None),
            last_activity: AtomicInstant::from_instant(now()),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Moves to `next`, clearing any previous fault reason.
    pub(crate) fn set(&self, next: SessionState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if next != SessionState::Faulted {
            *self.fault.lock() = None;
        }
        if previous != next {
            debug!(from = %previous, to = %next, "Session state changed");
        }
    }

    /// Moves to `Faulted` unless the session was already disconnected.
    /// The first reason is kept.
    pub(crate) fn fault(&self, reason: &str) {
        let mut state = self.state.write();
        match *state {
            SessionState::Disconnected | SessionState::Faulted => {}
            previous => {
                *state = SessionState::Faulted;
                *self.fault.lock() = Some(reason.to_string());
                warn!(from = %previous, reason, "Session faulted");
            }
        }
    }

    /// Reason reported to callers of a session that is not usable.
    pub(crate) fn unavailable_reason(&self) -> String {
        if let Some(reason) = self.fault.lock().clone() {
            return reason;
        }
        match self.state() {
            SessionState::Disconnected => "session disconnected".to_string(),
            other => format!("session is {other}"),
        }
    }

    /// Records foreground or probe traffic.
    pub(crate) fn touch(&self, at: Instant) {
        self.last_activity.store(at);
    }

    /// Time since the last recorded traffic.
    pub(crate) fn idle_at(&self, at: Instant) -> Duration {
        self.last_activity.idle_at(at)
    }
}

// ============================================
// Tests
// ============================================
