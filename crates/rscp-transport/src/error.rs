// ============================================
// File: crates/rscp-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Errors raised while establishing or using a byte transport to the
//! device, directly over TCP or through the portal relay.
//!
//! ## Error Categories
//! 1. **Connection Errors**: Connect failures, timeouts, unexpected closure
//! 2. **Relay Errors**: Portal protocol violations during registration
//! 3. **Configuration Errors**: Invalid addresses, URLs
//! 4. **Wrapped Errors**: I/O, websocket, codec
//!
//! ## ⚠️ Important Note for Next Developer
//! - `TransportClosed` is terminal for the transport instance
//! - Never put portal credentials into error messages
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use rscp_core::CoreError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Connection Errors
    // ========================================

    /// Connection could not be established.
    #[error("Failed to connect to {target}: {reason}")]
    ConnectFailed {
        /// Address or URL we tried
        target: String,
        /// Why connecting failed
        reason: String,
    },

    /// Connect (including relay registration) did not finish in time.
    #[error("Connecting to {target} timed out after {timeout_ms}ms")]
    ConnectTimeout {
        /// Address or URL we tried
        target: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// The peer closed the connection or the transport was closed locally.
    #[error("Transport closed: {reason}")]
    TransportClosed {
        /// What closed it
        reason: String,
    },

    // ========================================
    // Relay Errors
    // ========================================

    /// The portal sent something the relay protocol does not allow.
    #[error("Relay protocol error: {reason}")]
    Relay {
        /// What went wrong
        reason: String,
    },

    // ========================================
    // Configuration Errors
    // ========================================

    /// Invalid configuration.
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Configuration field name
        field: String,
        /// Why it's invalid
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Websocket error.
    #[error("WebSocket error: {context}")]
    WebSocket {
        /// What was happening when the error occurred
        context: String,
        /// Underlying websocket error
        #[source]
        source: Box<tungstenite::Error>,
    },

    /// Relay envelope could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] CoreError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `TransportClosed` error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::TransportClosed {
            reason: reason.into(),
        }
    }

    /// Creates a `Relay` error.
    pub fn relay(reason: impl Into<String>) -> Self {
        Self::Relay {
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error with context.
    ///
    /// Connection resets and broken pipes become `TransportClosed`.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Self::closed(source.to_string()),
            _ => Self::Io {
                context: context.into(),
                source,
            },
        }
    }

    /// Creates a `WebSocket` error with context.
    ///
    /// A closed websocket becomes `TransportClosed`.
    pub fn websocket(context: impl Into<String>, source: tungstenite::Error) -> Self {
        match source {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::closed("websocket closed")
            }
            tungstenite::Error::Io(e) => Self::io(context, e),
            other => Self::WebSocket {
                context: context.into(),
                source: Box::new(other),
            },
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if establishing a new connection may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectTimeout { .. }
            | Self::ConnectFailed { .. }
            | Self::TransportClosed { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionRefused
            ),
            _ => false,
        }
    }

    /// Returns `true` if the transport can no longer be used.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::TransportClosed { .. })
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::io("unspecified I/O operation", err)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::ConnectTimeout {
            target: "192.168.1.20:5033".into(),
            timeout_ms: 5000,
        };
        assert!(err.to_string().contains("192.168.1.20:5033"));
        assert!(err.to_string().contains("5000ms"));
    }

    #[test]
    fn test_reset_becomes_closed() {
        let err = TransportError::io(
            "reading",
            io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"),
        );
        assert!(err.is_closed());

        let err = TransportError::io("reading", io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(!err.is_closed());
    }

    #[test]
    fn test_websocket_closed_becomes_closed() {
        let err = TransportError::websocket("reading", tungstenite::Error::ConnectionClosed);
        assert!(err.is_closed());
    }

    #[test]
    fn test_classification() {
        assert!(TransportError::closed("eof").is_retryable());
        assert!(!TransportError::relay("bad envelope").is_retryable());
        assert!(!TransportError::invalid_config("host", "empty").is_retryable());
    }
}
