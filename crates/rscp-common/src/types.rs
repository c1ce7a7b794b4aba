// ============================================
// File: crates/rscp-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Newtypes for the identifiers that cross crate boundaries, so a tag id is
//! never confused with a relay connection id or an error code.
//!
//! ## Main Functionality
//! - `TagId`: 32-bit RSCP tag identifier with request/response helpers
//! - `ConnectionId`: Portal relay virtual connection identifier
//! - `AuthLevel`: User level granted by the device after authentication
//! - `Secret`: Zeroizing string for passwords and RSCP keys
//!
//! ## Tag Id Layout
//! ```text
//! 0xNN_8X_XXXX
//!   ││ │
//!   ││ └── bit 23 set: response tag
//!   └┴──── namespace (0x01 EMS, 0x0A INFO, 0xF8 SERVER, ...)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Secret` never prints its content, not even in `Debug`
//! - The response bit mapping holds for every request tag in the vendor table
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================
// TagId
// ============================================

/// RSCP tag identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub u32);

impl TagId {
    /// Bit marking a response tag.
    pub const RESPONSE_BIT: u32 = 0x0080_0000;

    /// Creates a tag id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the id of the response belonging to this request tag.
    #[must_use]
    pub const fn response(self) -> Self {
        Self(self.0 | Self::RESPONSE_BIT)
    }

    /// Returns `true` if this is a response tag.
    #[must_use]
    pub const fn is_response(self) -> bool {
        self.0 & Self::RESPONSE_BIT != 0
    }

    /// Returns the namespace byte.
    #[must_use]
    pub const fn namespace(self) -> u8 {
        (self.0 >> 24) as u8
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for TagId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<TagId> for u32 {
    fn from(id: TagId) -> Self {
        id.0
    }
}

// ============================================
// ConnectionId
// ============================================

/// Identifier of a connection registered by the vendor portal relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub i64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================
// AuthLevel
// ============================================

/// User level returned in `RSCP_AUTHENTICATION`. Zero means rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthLevel(pub u8);

impl AuthLevel {
    /// Level reported for rejected credentials.
    pub const NO_AUTH: Self = Self(0);

    /// Returns `true` if the device accepted the credentials.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================
// Secret
// ============================================

/// A password or passphrase, wiped from memory on drop.
///
/// # Example
/// ```
/// use rscp_common::types::Secret;
///
/// let secret = Secret::new("hunter2");
/// assert_eq!(secret.expose(), "hunter2");
/// assert_eq!(format!("{secret:?}"), "Secret(***)");
/// ```
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret content.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self)
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("***")
    }
}

// ============================================
// Tests
// ============================================
