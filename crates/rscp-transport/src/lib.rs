// ============================================
// File: crates/rscp-transport/src/lib.rs
// ============================================
//! # RSCP Transport - Network I/O Layer
//!
//! ## Creation Reason
//! Moves encrypted RSCP bytes between the session and a device, either
//! directly over TCP or tunnelled through the vendor portal.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: The `Transport` trait
//! - [`tcp`]: `LocalTransport` to `host:5033`
//! - [`relay`]: `RelayedTransport` over the portal websocket
//! - [`envelope`]: Portal connection envelope codec
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 rscp-client                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │     rscp-core  ◄────── rscp-transport               │
//! │                        You are here                 │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │              rscp-common                            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//!  session ──► SecureChannel::seal ──► bytes ─┬─► LocalTransport ──► TCP ──► device
//!                                             │
//!                                             └─► RelayedTransport
//!                                                   └─► SERVER_REQ_RSCP_CMD envelope
//!                                                         └─► websocket ──► portal ──► device
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always use the trait for testability
//! - Mock implementation available with the `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod envelope;
pub mod error;
pub mod relay;
pub mod tcp;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export primary types
pub use error::{Result, TransportError};
pub use relay::{PortalLogin, RelayOptions, RelayedTransport};
pub use tcp::LocalTransport;
pub use traits::Transport;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockPeer, MockTransport};
