// ============================================
// File: crates/rscp-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Caller mistakes and broken invariants that are not tied to the codec,
//! the cipher or a transport.
//!
//! ## Main Functionality
//! - `CommonError`: Bad input or internal bug
//! - `Result<T>`: Alias using `CommonError`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never put passwords or RSCP keys into error messages
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

/// Common result type.
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors shared across the RSCP crates.
///
/// # Example
/// ```
/// use rscp_common::error::{CommonError, Result};
///
/// fn check_serial(serial: &str) -> Result<()> {
///     if serial.is_empty() {
///         return Err(CommonError::invalid_input("serial", "cannot be empty"));
///     }
///     Ok(())
/// }
///
/// assert!(check_serial("").is_err());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// The caller passed something the operation cannot work with.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },

    /// Internal error (bug or unexpected condition).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of what went wrong
        message: String,
    },
}

impl CommonError {
    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
