// ============================================
// File: crates/rscp-client/src/dispatcher.rs
// ============================================
//! # Dispatcher
//!
//! ## Creation Reason
//! The cipher chain allows exactly one writer and one reader per
//! connection, in lock-step. The dispatcher is the single task that owns
//! the transport and the `SecureChannel`; everything else talks to it
//! through a command queue.
//!
//! ## Main Functionality
//! - FIFO processing of foreground exchanges and keep-alive probes
//! - Response correlation by tag (`T` expects `T.response()`)
//! - Unsolicited frames are logged and discarded
//! - Fatal errors fault the session and fail every queued call
//!
//! ## Dispatcher Loop
//! ```text
//!            ┌─────────────────────────────────────────────┐
//!  Session ─►│ mpsc<Command> ──┐                           │
//!  KeepAlive►│                 ▼                           │
//!            │          ┌─────────────┐   seal   ┌───────┐ │
//!            │  select! │  Exchange   │ ───────► │       │ │
//!            │   ├─ cancel          │ │          │Transp.│ │
//!            │   ├─ command         │ │ ◄─────── │       │ │
//!            │   └─ inbound ─► warn │ │   open   └───────┘ │
//!            │          └──────┬──────┘                    │
//!            │                 ▼ oneshot reply             │
//!            └─────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Transport::receive` must stay cancel-safe: the idle loop drops the
//!   read future whenever a command arrives
//! - A reply that arrives after its `RequestTimeout` while no request is
//!   outstanding is discarded as unsolicited. If it only arrives once the
//!   next request for the same tag was written, it is taken as that
//!   request's answer; RSCP carries no request ids to tell them apart
//! - A seal failure (value too large) is reported to the caller only;
//!   the cipher chain is untouched then
//!
//! ## Last Modified
//! v0.1.0 - Initial dispatcher

use std::collections::{HashSet, VecDeque};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use rscp_common::TagId;
use rscp_core::protocol::{ErrorCode, Frame, TagValue};
use rscp_core::SecureChannel;
use rscp_transport::Transport;

use crate::error::{ClientError, Result};
use crate::state::{self, SessionStatus};

// ============================================
// Commands
// ============================================

/// Work items for the dispatcher.
#[derive(Debug)]
pub(crate) enum Command {
    /// Foreground call.
    Exchange {
        values: Vec<TagValue>,
        timeout: Duration,
        reply: oneshot::Sender<Result<Vec<TagValue>>>,
    },
    /// Keep-alive probe, sent only if the session is still idle.
    Probe {
        probe: TagValue,
        idle_window: Duration,
        timeout: Duration,
        reply: oneshot::Sender<ProbeOutcome>,
    },
}

impl Command {
    fn fail(self, reason: &str) {
        match self {
            Self::Exchange { reply, .. } => {
                let _ = reply.send(Err(ClientError::connection_lost(reason)));
            }
            // dropping the reply ends the keep-alive loop
            Self::Probe { .. } => {}
        }
    }
}

/// What happened to a probe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeOutcome {
    /// Probe written and answered (or timed out).
    Sent,
    /// Foreground traffic happened within the window.
    Skipped,
}

/// Why the dispatcher stopped.
#[derive(Debug)]
enum Stop {
    Cancelled,
    Fault(String),
}

enum Event {
    Cancelled,
    Command(Option<Command>),
    Inbound(Result<Vec<Frame>>),
}

// ============================================
// Dispatcher
// ============================================

/// Single owner of one connection.
pub(crate) struct Dispatcher {
    transport: Box<dyn Transport>,
    channel: SecureChannel,
    commands: mpsc::Receiver<Command>,
    status: Arc<SessionStatus>,
    cancel: CancellationToken,
    max_consecutive_timeouts: u32,
    consecutive_timeouts: u32,
    /// Decoded frames not yet consumed by an exchange
    backlog: VecDeque<Frame>,
}

impl Dispatcher {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        channel: SecureChannel,
        commands: mpsc::Receiver<Command>,
        status: Arc<SessionStatus>,
        cancel: CancellationToken,
        max_consecutive_timeouts: u32,
    ) -> Self {
        Self {
            transport,
            channel,
            commands,
            status,
            cancel,
            max_consecutive_timeouts,
            consecutive_timeouts: 0,
            backlog: VecDeque::new(),
        }
    }

    /// Serves commands until cancelled, the session handle is dropped, or
    /// the connection fails.
    pub(crate) async fn run(mut self) {
        debug!(transport = self.transport.kind(), "Dispatcher started");

        let stop = loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Event::Cancelled,
                command = self.commands.recv() => Event::Command(command),
                inbound = read_frames(&mut *self.transport, &mut self.channel) => Event::Inbound(inbound),
            };

            match event {
                Event::Cancelled | Event::Command(None) => break Stop::Cancelled,
                Event::Command(Some(command)) => {
                    if let ControlFlow::Break(stop) = self.handle(command).await {
                        break stop;
                    }
                }
                Event::Inbound(Ok(frames)) => {
                    for frame in &frames {
                        self.discard(frame);
                    }
                }
                Event::Inbound(Err(e)) => break Stop::Fault(e.to_string()),
            }
        };

        self.shutdown(stop).await;
    }

    // ========================================
    // Command handling
    // ========================================

    async fn handle(&mut self, command: Command) -> ControlFlow<Stop> {
        match command {
            Command::Exchange {
                values,
                timeout,
                reply,
            } => {
                let result = self.exchange(&values, timeout).await;
                let flow = self.settle(&result);
                let result = match (&flow, result) {
                    (ControlFlow::Break(Stop::Fault(reason)), Err(e)) if e.is_fatal_to_connection() => {
                        Err(ClientError::connection_lost(reason.clone()))
                    }
                    (_, result) => result,
                };
                // the caller may have given up; nothing to do then
                let _ = reply.send(result);
                flow
            }
            Command::Probe {
                probe,
                idle_window,
                timeout,
                reply,
            } => {
                let now = state::now();
                let idle = self.status.idle_at(now);
                if idle < idle_window {
                    trace!(idle = ?idle, "Keep-alive probe skipped");
                    let _ = reply.send(ProbeOutcome::Skipped);
                    return ControlFlow::Continue(());
                }

                self.status.touch(now);
                debug!(tag = %probe.tag, idle = ?idle, "Sending keep-alive probe");
                let result = self.exchange(std::slice::from_ref(&probe), timeout).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Keep-alive probe failed");
                }
                let flow = self.settle(&result);
                let _ = reply.send(ProbeOutcome::Sent);
                flow
            }
        }
    }

    /// Updates timeout accounting and decides whether to keep serving.
    fn settle(&mut self, result: &Result<Vec<TagValue>>) -> ControlFlow<Stop> {
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(Stop::Cancelled);
        }

        match result {
            Ok(_) => {
                self.consecutive_timeouts = 0;
                ControlFlow::Continue(())
            }
            Err(ClientError::RequestTimeout { .. }) => {
                self.consecutive_timeouts += 1;
                if self.consecutive_timeouts >= self.max_consecutive_timeouts {
                    self.fault(format!("{} request timeouts in a row", self.consecutive_timeouts))
                } else {
                    ControlFlow::Continue(())
                }
            }
            Err(e) if e.is_fatal_to_connection() => self.fault(e.to_string()),
            Err(_) => ControlFlow::Continue(()),
        }
    }

    /// Marks the session faulted before the caller hears about it.
    fn fault(&self, reason: String) -> ControlFlow<Stop> {
        self.status.fault(&reason);
        ControlFlow::Break(Stop::Fault(reason))
    }

    // ========================================
    // Exchange
    // ========================================

    /// Writes one request frame and waits for the frame answering it.
    async fn exchange(&mut self, values: &[TagValue], timeout: Duration) -> Result<Vec<TagValue>> {
        let expected: HashSet<TagId> = values.iter().map(|v| v.tag.response()).collect();

        let wire = self.channel.seal(values).map_err(|e| {
            debug!(error = %e, "Request could not be sealed");
            // cipher state untouched, the connection is still usable
            ClientError::Common(rscp_common::CommonError::invalid_input(
                "values",
                e.to_string(),
            ))
        })?;
        self.transport.send(&wire).await?;
        trace!(bytes = wire.len(), values = values.len(), "Request written");

        let deadline = tokio::time::Instant::now() + timeout;
        let reply = loop {
            if let Some(reply) = self.take_reply(&expected) {
                break reply;
            }

            let frames = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(ClientError::connection_lost("session disconnected"));
                }
                () = tokio::time::sleep_until(deadline) => {
                    debug!(timeout = ?timeout, "No reply before deadline");
                    return Err(ClientError::request_timeout(timeout));
                }
                inbound = read_frames(&mut *self.transport, &mut self.channel) => inbound?,
            };
            self.backlog.extend(frames);
        };

        // anything decoded after the reply cannot belong to a request
        // that has not been written yet
        while let Some(frame) = self.backlog.pop_front() {
            self.discard(&frame);
        }

        let values = reply.values;
        if let Some(denied) = values
            .iter()
            .find(|v| expected.contains(&v.tag) && v.error_code() == Some(ErrorCode::AccessDenied))
        {
            return Err(ClientError::AccessDenied { tag: denied.tag });
        }
        Ok(values)
    }

    /// Pops backlog frames until one answers the request.
    fn take_reply(&mut self, expected: &HashSet<TagId>) -> Option<Frame> {
        while let Some(frame) = self.backlog.pop_front() {
            if frame.values.iter().any(|v| expected.contains(&v.tag)) {
                return Some(frame);
            }
            self.discard(&frame);
        }
        None
    }

    fn discard(&self, frame: &Frame) {
        let vocabulary = self.channel.tags().vocabulary();
        let tags: Vec<String> = frame.values.iter().map(|v| vocabulary.label(v.tag)).collect();
        warn!(tags = ?tags, "Discarding unsolicited frame");
    }

    // ========================================
    // Shutdown
    // ========================================

    async fn shutdown(mut self, stop: Stop) {
        let reason = match &stop {
            Stop::Cancelled => "session disconnected".to_string(),
            Stop::Fault(reason) => {
                self.status.fault(reason);
                reason.clone()
            }
        };

        // stops the keep-alive task as well
        self.cancel.cancel();

        self.commands.close();
        let mut failed = 0usize;
        while let Ok(command) = self.commands.try_recv() {
            command.fail(&reason);
            failed += 1;
        }

        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "Transport close failed");
        }

        match stop {
            Stop::Cancelled => debug!(failed, "Dispatcher stopped"),
            Stop::Fault(_) => info!(failed, reason = %reason, "Dispatcher stopped after fault"),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport", &self.transport.kind())
            .field("consecutive_timeouts", &self.consecutive_timeouts)
            .field("backlog", &self.backlog.len())
            .finish_non_exhaustive()
    }
}

/// Reads once from the transport and returns the frames it completed.
async fn read_frames(
    transport: &mut dyn Transport,
    channel: &mut SecureChannel,
) -> Result<Vec<Frame>> {
    let bytes = transport.receive().await?;
    trace!(bytes = bytes.len(), "Received");
    let frames = channel.open(&bytes)?;
    for frame in &frames {
        debug!(values = frame.values.len(), "Frame received");
    }
    Ok(frames)
}

// ============================================
// Tests
// ============================================
