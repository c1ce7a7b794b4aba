// ============================================
// File: crates/rscp-client/src/keepalive.rs
// ============================================
//! # Keep-Alive Task
//!
//! ## Creation Reason
//! The device drops connections that stay silent. When no foreground call
//! was issued within the idle window, this task asks the dispatcher for a
//! single probe exchange.
//!
//! ## Timing
//! ```text
//!  last activity            idle window               probe
//!  ──────┼───────────────────────────────────────────────┼──────►
//!        │◄──────────────── idle_window ────────────────►│
//!        └─ foreground call or previous probe            └─ becomes the
//!                                                           new activity
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This task never touches the transport; it only queues `Probe`
//!   commands and waits for their outcome before re-arming
//! - The dispatcher re-checks idleness, so a call issued while the probe
//!   waited in the queue wins
//!
//! ## Last Modified
//! v0.1.0 - Initial keep-alive

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use rscp_common::TagId;
use rscp_core::protocol::TagValue;

use crate::dispatcher::{Command, ProbeOutcome};
use crate::state::{self, SessionStatus};

/// Keep-alive parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveOptions {
    /// Idle time before a probe is sent.
    pub idle_window: Duration,
    /// Request tag used as probe.
    pub probe_tag: TagId,
}

/// Runs until `cancel` fires or the dispatcher goes away.
pub(crate) async fn run(
    commands: mpsc::Sender<Command>,
    status: Arc<SessionStatus>,
    options: KeepaliveOptions,
    probe_timeout: Duration,
    cancel: CancellationToken,
) {
    debug!(idle_window = ?options.idle_window, probe = %options.probe_tag, "Keep-alive started");

    loop {
        let idle = status.idle_at(state::now());
        if idle < options.idle_window {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(options.idle_window - idle) => continue,
            }
        }

        let (tx, rx) = oneshot::channel();
        let command = Command::Probe {
            probe: TagValue::request(options.probe_tag),
            idle_window: options.idle_window,
            timeout: probe_timeout,
            reply: tx,
        };

        let queued = tokio::select! {
            () = cancel.cancelled() => break,
            queued = commands.send(command) => queued,
        };
        if queued.is_err() {
            break;
        }

        let outcome = tokio::select! {
            () = cancel.cancelled() => break,
            outcome = rx => outcome,
        };
        match outcome {
            Ok(ProbeOutcome::Sent) => trace!("Keep-alive probe completed"),
            Ok(ProbeOutcome::Skipped) => trace!("Keep-alive probe not needed"),
            // dispatcher stopped
            Err(_) => break,
        }
    }

    debug!("Keep-alive stopped");
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use rscp_core::protocol::tags;

    fn options() -> KeepaliveOptions {
        KeepaliveOptions {
            idle_window: Duration::from_secs(30),
            probe_tag: tags::INFO_REQ_UTC_TIME,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_probe_per_window() {
        let (tx, mut rx) = mpsc::channel(4);
        let status = Arc::new(SessionStatus::new());
        status.touch(state::now());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            tx,
            Arc::clone(&status),
            options(),
            Duration::from_secs(5),
            cancel.clone(),
        ));

        let start = tokio::time::Instant::now();
        for round in 1..=3u64 {
            let Some(Command::Probe { probe, reply, .. }) = rx.recv().await else {
                panic!("expected a probe");
            };
            assert_eq!(probe.tag, tags::INFO_REQ_UTC_TIME);
            assert_eq!(start.elapsed(), Duration::from_secs(30 * round));
            // what the dispatcher does when it writes the probe
            status.touch(state::now());
            reply.send(ProbeOutcome::Sent).unwrap();
        }

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_postpones_probe() {
        let (tx, mut rx) = mpsc::channel(4);
        let status = Arc::new(SessionStatus::new());
        status.touch(state::now());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            tx,
            Arc::clone(&status),
            options(),
            Duration::from_secs(5),
            cancel.clone(),
        ));

        let start = tokio::time::Instant::now();
        tokio::time::sleep(Duration::from_secs(20)).await;
        status.touch(state::now());

        let Some(Command::Probe { reply, .. }) = rx.recv().await else {
            panic!("expected a probe");
        };
        assert_eq!(start.elapsed(), Duration::from_secs(50));
        reply.send(ProbeOutcome::Sent).unwrap();

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_dispatcher_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let status = Arc::new(SessionStatus::new());
        let options = KeepaliveOptions {
            idle_window: Duration::from_millis(1),
            probe_tag: tags::INFO_REQ_UTC_TIME,
        };
        run(tx, status, options, Duration::from_secs(1), CancellationToken::new()).await;
    }
}
