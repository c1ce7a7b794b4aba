// ============================================
// File: crates/rscp-transport/src/mock.rs
// ============================================
//! # Mock Transport Implementation
//!
//! ## Creation Reason
//! Lets session tests play the device side in memory, without sockets,
//! and inspect every chunk the session wrote.
//!
//! ## Usage in Tests
//! ```ignore
//! use rscp_transport::mock::MockTransport;
//! use rscp_transport::Transport;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (mut transport, peer) = MockTransport::pair();
//!
//! transport.send(b"request").await?;
//! assert_eq!(peer.recv().await.as_deref(), Some(&b"request"[..]));
//!
//! peer.inject(b"response".to_vec());
//! assert_eq!(transport.receive().await?, b"response");
//! # Ok(())
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//! - `MockPeer::close` simulates the device hanging up
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

// ============================================
// Shared State
// ============================================

#[derive(Default)]
struct Shared {
    /// Chunks waiting for `MockTransport::receive`
    inbound: Mutex<VecDeque<Vec<u8>>>,
    inbound_notify: Notify,
    /// Chunks waiting for `MockPeer::recv`
    outbound: Mutex<VecDeque<Vec<u8>>>,
    outbound_notify: Notify,
    /// Every chunk ever written, in order
    written: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl Shared {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.inbound_notify.notify_one();
        self.outbound_notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ============================================
// MockTransport
// ============================================

/// In-memory transport for tests.
pub struct MockTransport {
    shared: Arc<Shared>,
}

/// Device side of a [`MockTransport`].
#[derive(Clone)]
pub struct MockPeer {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Creates a connected transport/peer pair.
    #[must_use]
    pub fn pair() -> (Self, MockPeer) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockPeer { shared },
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if self.shared.is_closed() {
            return Err(TransportError::closed("mock transport closed"));
        }
        self.shared.written.lock().push(bytes.to_vec());
        self.shared.outbound.lock().push_back(bytes.to_vec());
        self.shared.outbound_notify.notify_one();
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        loop {
            let next = self.shared.inbound.lock().pop_front();
            if let Some(chunk) = next {
                return Ok(chunk);
            }
            if self.shared.is_closed() {
                return Err(TransportError::closed("mock peer hung up"));
            }
            self.shared.inbound_notify.notified().await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.close();
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.shared.is_closed()
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}

impl MockPeer {
    /// Queues bytes for the transport's next `receive`.
    pub fn inject(&self, bytes: Vec<u8>) {
        self.shared.inbound.lock().push_back(bytes);
        self.shared.inbound_notify.notify_one();
    }

    /// Waits for the next chunk the transport sent. `None` once the
    /// transport is closed and everything was read.
    pub async fn recv(&self) -> Option<Vec<u8>> {
        loop {
            let next = self.shared.outbound.lock().pop_front();
            if let Some(chunk) = next {
                return Some(chunk);
            }
            if self.shared.is_closed() {
                return None;
            }
            self.shared.outbound_notify.notified().await;
        }
    }

    /// Snapshot of every chunk written so far.
    #[must_use]
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.shared.written.lock().clone()
    }

    /// Simulates the device hanging up.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns `true` once either side closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("closed", &self.shared.is_closed())
            .field("pending_reads", &self.shared.inbound.lock().len())
            .field("written", &self.shared.written.lock().len())
            .finish()
    }
}

impl std::fmt::Debug for MockPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPeer")
            .field("closed", &self.shared.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
