// ============================================
// File: crates/rscp-client/src/lib.rs
// ============================================
//! # RSCP Client - Session Layer
//!
//! ## Creation Reason
//! Turns the codec, cipher and transports below it into a session a
//! caller can use: connect, authenticate, exchange tag trees, stay alive
//! while idle, and fail loudly when the connection breaks.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: TOML client configuration
//! - [`session`]: `Session` lifecycle and exchanges
//! - [`state`]: `SessionState` and shared status
//! - [`handshake`]: Authentication request/reply
//! - [`keepalive`]: Idle probe options
//! - [`logging`]: Subscriber setup
//! - [`error`]: Client-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          rscp-client                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐    │
//! │  │   Config    │────►│   Session   │────►│    Handshake    │    │
//! │  │   (TOML)    │     │             │     │                 │    │
//! │  └─────────────┘     └──────┬──────┘     └─────────────────┘    │
//! │                             │                                   │
//! │                 ┌───────────┴───────────┐                       │
//! │                 ▼                       ▼                       │
//! │          ┌─────────────┐         ┌─────────────┐                │
//! │          │ Dispatcher  │◄────────│  KeepAlive  │                │
//! │          │    task     │  Probe  │    task     │                │
//! │          └──────┬──────┘         └─────────────┘                │
//! │                 │                                               │
//! ├─────────────────┼───────────────────────────────────────────────┤
//! │  rscp-core      ▼ SecureChannel (frames + Rijndael-256 chain)   │
//! │  rscp-transport   LocalTransport │ RelayedTransport             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only the dispatcher task touches the transport and cipher state
//! - Codec, frame and crypto errors fault the session; they are never
//!   retried silently
//!
//! ## Last Modified
//! v0.1.0 - Initial client library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
mod dispatcher;
pub mod error;
pub mod handshake;
pub mod keepalive;
pub mod logging;
pub mod session;
pub mod state;

// Re-export primary types
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use keepalive::KeepaliveOptions;
pub use session::{Session, SessionOptions};
pub use state::SessionState;
