// ============================================
// File: crates/rscp-common/src/lib.rs
// ============================================
//! # RSCP Common - Shared Types Library
//!
//! ## Creation Reason
//! Holds the identifiers, secrets, timestamps and base error type that every
//! other crate in the RSCP engine agrees on.
//!
//! ## Main Functionality
//! - [`types`]: `TagId`, `ConnectionId`, `AuthLevel`, `Secret`
//! - [`time`]: RSCP wire timestamps and `AtomicInstant` activity tracking
//! - [`error`]: Common error type and result alias
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 rscp-client                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │     rscp-core  ◄────── rscp-transport               │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │              rscp-common  ◄── You are here          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Leaf crate: no internal dependencies, keep external ones minimal
//! - Anything holding a password or key goes through `Secret`
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

pub use error::{CommonError, Result};
pub use time::{AtomicInstant, RscpTimestamp};
pub use types::{AuthLevel, ConnectionId, Secret, TagId};
