// ============================================
// File: crates/rscp-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! The session must not care whether its bytes go straight to the device
//! or through the portal relay. Both paths implement one trait.
//!
//! ## Design Philosophy
//! - Transports move opaque, already-encrypted bytes
//! - Connecting is a per-implementation constructor, not a trait method
//! - Async-first design with `async_trait`
//!
//! ## ⚠️ Important Note for Next Developer
//! - `receive` is raced against the request queue in `tokio::select!`, so
//!   implementations must not lose data when the future is dropped
//! - One owner at a time: methods take `&mut self`
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

// ============================================
// Transport Trait
// ============================================

/// Byte transport to a device.
///
/// # Example
/// ```ignore
/// async fn echo<T: Transport>(transport: &mut T) -> Result<()> {
///     let bytes = transport.receive().await?;
///     transport.send(&bytes).await
/// }
/// ```
#[async_trait]
pub trait Transport: Send + fmt::Debug {
    /// Sends one block of bytes.
    ///
    /// # Errors
    /// `TransportClosed` if the connection is gone.
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receives the next non-empty chunk of bytes.
    ///
    /// Chunk boundaries carry no meaning; frames may be split or coalesced.
    ///
    /// # Errors
    /// `TransportClosed` on unexpected closure.
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Closes the transport. Closing twice is not an error.
    ///
    /// # Errors
    /// Returns error if the close handshake fails.
    async fn close(&mut self) -> Result<()>;

    /// Returns `true` until the transport is closed.
    fn is_active(&self) -> bool;

    /// Short name for logs (`"local"`, `"relayed"`, ...).
    fn kind(&self) -> &'static str;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes).await
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        (**self).receive().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}
