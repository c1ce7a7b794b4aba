// ============================================
// File: crates/rscp-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Errors raised by the tag codec, the framing layer and the chained-IV
//! cipher.
//!
//! ## Error Categories
//! 1. **Codec Errors**: Structural violations inside a tag tree
//! 2. **Frame Errors**: Magic, trailer, size and padding checks
//! 3. **Crypto Errors**: Key derivation and chain desynchronization
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material in error messages
//! - Anything classified `is_fatal_to_connection` means the cipher chain
//!   can no longer be trusted; the session must reconnect
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use rscp_common::TagId;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for codec, framing and cipher operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Codec Errors
    // ========================================

    /// Tag structure violates the TLV rules.
    #[error("Malformed tag: {reason}")]
    MalformedTag {
        /// What's wrong with the tag
        reason: String,
    },

    /// Payload does not fit into the 16-bit length field.
    #[error("Tag {tag} too large: {size} bytes exceeds {max}")]
    TagTooLarge {
        /// Offending tag
        tag: TagId,
        /// Encoded payload size
        size: usize,
        /// Maximum payload size
        max: usize,
    },

    /// Tag name not present in the vocabulary.
    #[error("Unknown tag name: {0}")]
    UnknownTagName(String),

    /// Vocabulary table could not be loaded.
    #[error("Invalid vocabulary: {reason}")]
    InvalidVocabulary {
        /// Why loading failed
        reason: String,
    },

    // ========================================
    // Frame Errors
    // ========================================

    /// Frame does not start with the RSCP magic.
    #[error("Bad frame magic: 0x{found:04x}")]
    BadMagic {
        /// The two bytes found instead
        found: u16,
    },

    /// Frame control word announces an unknown protocol version.
    #[error("Unsupported protocol version: {got}")]
    UnsupportedVersion {
        /// Version nibble received
        got: u8,
    },

    /// Integrity trailer missing or not matching the frame content.
    #[error("Integrity mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    IntegrityMismatch {
        /// Checksum computed over the received bytes
        expected: u32,
        /// Checksum carried by the frame (0 if absent)
        actual: u32,
    },

    /// Declared frame size exceeds the configured maximum.
    #[error("Frame too large: max {max} bytes, got {actual}")]
    FrameTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Declared size
        actual: usize,
    },

    /// Alignment padding after a frame is not all zero.
    #[error("Invalid frame padding")]
    InvalidPadding,

    // ========================================
    // Crypto Errors
    // ========================================

    /// RSCP key cannot be derived from the passphrase.
    #[error("Invalid RSCP key: {reason}")]
    InvalidKey {
        /// Why the key is invalid
        reason: String,
    },

    /// Decrypted bytes do not form a valid frame: IV chains diverged.
    #[error("Cipher chain desynchronized: {reason}")]
    CryptoDesync {
        /// The frame-level failure that exposed the desync
        reason: String,
    },
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `MalformedTag` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedTag {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidKey` error.
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Creates a `CryptoDesync` error.
    pub fn desync(reason: impl Into<String>) -> Self {
        Self::CryptoDesync {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidVocabulary` error.
    pub fn vocabulary(reason: impl Into<String>) -> Self {
        Self::InvalidVocabulary {
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the connection carrying the offending bytes must be
    /// torn down.
    #[must_use]
    pub const fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::MalformedTag { .. }
                | Self::BadMagic { .. }
                | Self::UnsupportedVersion { .. }
                | Self::IntegrityMismatch { .. }
                | Self::FrameTooLarge { .. }
                | Self::InvalidPadding
                | Self::CryptoDesync { .. }
        )
    }

    /// Returns `true` for cipher-related errors.
    #[must_use]
    pub const fn is_crypto_error(&self) -> bool {
        matches!(self, Self::InvalidKey { .. } | Self::CryptoDesync { .. })
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
        let err = CoreError::IntegrityMismatch {
            expected: 0xCBF4_3926,
            actual: 0,
        };
        assert_eq!(
            err.to_string(),
            "Integrity mismatch: expected 0xcbf43926, got 0x00000000"
        );

        let err = CoreError::TagTooLarge {
            tag: TagId(0x0A80_0001),
            size: 70_000,
            max: 65_535,
        };
        assert!(err.to_string().contains("0x0A800001"));
    }

    #[test]
    fn test_error_classification() {
        assert!(CoreError::desync("bad magic").is_fatal_to_connection());
        assert!(CoreError::desync("bad magic").is_crypto_error());
        assert!(CoreError::malformed("short").is_fatal_to_connection());
        assert!(!CoreError::invalid_key("too long").is_fatal_to_connection());
        assert!(!CoreError::UnknownTagName("X".into()).is_fatal_to_connection());
    }
}
