// ============================================
// File: crates/rscp-core/src/crypto/keys.rs
// ============================================
//! # RSCP Key
//!
//! ## Creation Reason
//! The device derives its cipher key from the "RSCP password" configured on
//! the unit: UTF-8 bytes right-padded with `0xFF` to 32 bytes.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Passphrases longer than 32 bytes cannot be represented and are rejected
//! - Key bytes are zeroized on drop and never printed
//!
//! ## Last Modified
//! v0.1.0 - Initial key derivation

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::rijndael::KEY_SIZE;
use crate::error::{CoreError, Result};

/// Padding byte used to fill short passphrases.
pub const KEY_PAD_BYTE: u8 = 0xFF;

/// Cipher key derived from the device's RSCP passphrase.
///
/// # Example
/// ```
/// use rscp_core::crypto::RscpKey;
///
/// let key = RscpKey::from_passphrase("abc").unwrap();
/// assert_eq!(&key.as_bytes()[..4], &[b'a', b'b', b'c', 0xFF]);
/// assert!(RscpKey::from_passphrase(&"x".repeat(33)).is_err());
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RscpKey([u8; KEY_SIZE]);

impl RscpKey {
    /// Derives a key from a passphrase.
    ///
    /// # Errors
    /// Returns `InvalidKey` if the UTF-8 passphrase exceeds 32 bytes.
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        let bytes = passphrase.as_bytes();
        if bytes.len() > KEY_SIZE {
            return Err(CoreError::invalid_key(format!(
                "passphrase is {} bytes, at most {KEY_SIZE} allowed",
                bytes.len()
            )));
        }
        let mut key = [KEY_PAD_BYTE; KEY_SIZE];
        key[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Wraps raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for RscpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RscpKey([REDACTED])")
    }
}
