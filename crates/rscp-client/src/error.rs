// ============================================
// File: crates/rscp-client/src/error.rs
// ============================================
//! # Client Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial client errors

use thiserror::Error;

use rscp_common::error::CommonError;
use rscp_common::TagId;
use rscp_core::error::CoreError;
use rscp_transport::error::TransportError;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error types.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        field: String,
        reason: String,
    },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed {
        reason: String,
    },

    #[error("Request timed out after {timeout_ms}ms")]
    RequestTimeout {
        timeout_ms: u64,
    },

    #[error("Access denied for tag {tag}")]
    AccessDenied {
        tag: TagId,
    },

    #[error("Connection lost: {reason}")]
    ConnectionLost {
        reason: String,
    },

    #[error("Operation not allowed in state {state}: {reason}")]
    InvalidState {
        state: String,
        reason: String,
    },

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn authentication_failed(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            reason: reason.into(),
        }
    }

    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(state: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn request_timeout(timeout: std::time::Duration) -> Self {
        Self::RequestTimeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    /// Errors after which the connection cannot carry another exchange.
    #[must_use]
    pub const fn is_fatal_to_connection(&self) -> bool {
        match self {
            Self::Core(e) => e.is_fatal_to_connection(),
            Self::Transport(_) | Self::ConnectionLost { .. } | Self::AuthenticationFailed { .. } => {
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::RequestTimeout { .. } => true,
            _ => false,
        }
    }
}
