// ============================================
// File: crates/rscp-transport/src/envelope.rs
// ============================================
//! # Relay Envelope
//!
//! ## Creation Reason
//! The portal relay speaks RSCP itself. Device traffic travels inside
//! `SERVER_REQ_RSCP_CMD` containers addressed to a registered connection,
//! and connections are announced with `SERVER_REGISTER_CONNECTION`.
//!
//! ## Envelope Layout
//! ```text
//! SERVER_REQ_RSCP_CMD (Container)
//! ├── SERVER_CONNECTION_ID  Int64
//! ├── SERVER_AUTH_LEVEL     UChar8
//! ├── SERVER_RSCP_DATA_LEN  Int32
//! └── SERVER_RSCP_DATA      ByteArray  ◄── inner bytes, untouched
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use rscp_common::{AuthLevel, ConnectionId};
use rscp_core::protocol::{tags, TagPayload, TagValue};

use crate::error::{Result, TransportError};

// ============================================
// Registration
// ============================================

/// Connection announced by the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Portal connection id.
    pub connection: ConnectionId,
    /// Auth level the portal granted.
    pub auth_level: AuthLevel,
}

impl Registration {
    /// Reads a `SERVER_REGISTER_CONNECTION` container.
    ///
    /// # Errors
    /// `Relay` if the id or auth level is missing or out of range.
    pub fn from_value(value: &TagValue) -> Result<Self> {
        let connection = value
            .find(tags::SERVER_CONNECTION_ID)
            .and_then(TagValue::as_i64)
            .ok_or_else(|| TransportError::relay("registration without connection id"))?;
        let auth_level = value
            .find(tags::SERVER_AUTH_LEVEL)
            .and_then(TagValue::as_i64)
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| TransportError::relay("registration without auth level"))?;
        Ok(Self {
            connection: ConnectionId(connection),
            auth_level: AuthLevel(auth_level),
        })
    }

    /// Registration body: connection id and auth level.
    fn fields(self) -> Vec<TagValue> {
        vec![
            TagValue::new(tags::SERVER_CONNECTION_ID, TagPayload::Int64(self.connection.0)),
            TagValue::new(tags::SERVER_AUTH_LEVEL, TagPayload::UChar8(self.auth_level.0)),
        ]
    }

    /// Builds the `SERVER_REGISTER_CONNECTION` announcement.
    #[must_use]
    pub fn announcement(self) -> TagValue {
        TagValue::container(tags::SERVER_REGISTER_CONNECTION, self.fields())
    }

    /// Builds the `SERVER_CONNECTION_REGISTERED` acknowledgement.
    #[must_use]
    pub fn acknowledgement(self) -> TagValue {
        TagValue::container(tags::SERVER_CONNECTION_REGISTERED, self.fields())
    }
}

// ============================================
// Envelope
// ============================================

/// Bytes addressed to one registered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Target connection.
    pub connection: ConnectionId,
    /// Auth level of the target connection.
    pub auth_level: AuthLevel,
    /// Inner bytes.
    pub data: Vec<u8>,
}

impl Envelope {
    /// Addresses `data` to a registered connection.
    #[must_use]
    pub fn new(registration: Registration, data: Vec<u8>) -> Self {
        Self {
            connection: registration.connection,
            auth_level: registration.auth_level,
            data,
        }
    }

    /// Builds the `SERVER_REQ_RSCP_CMD` container.
    ///
    /// # Errors
    /// `Relay` if the data length does not fit the length field.
    pub fn to_value(&self) -> Result<TagValue> {
        let len = i32::try_from(self.data.len())
            .map_err(|_| TransportError::relay("envelope data too large"))?;
        Ok(TagValue::container(
            tags::SERVER_REQ_RSCP_CMD,
            vec![
                TagValue::new(tags::SERVER_CONNECTION_ID, TagPayload::Int64(self.connection.0)),
                TagValue::new(tags::SERVER_AUTH_LEVEL, TagPayload::UChar8(self.auth_level.0)),
                TagValue::new(tags::SERVER_RSCP_DATA_LEN, TagPayload::Int32(len)),
                TagValue::new(tags::SERVER_RSCP_DATA, TagPayload::ByteArray(self.data.clone())),
            ],
        ))
    }

    /// Reads a `SERVER_REQ_RSCP_CMD` container.
    ///
    /// # Errors
    /// `Relay` if a field is missing or the declared length disagrees
    /// with the data.
    pub fn from_value(value: &TagValue) -> Result<Self> {
        let registration = Registration::from_value(value)?;
        let data = value
            .find(tags::SERVER_RSCP_DATA)
            .and_then(TagValue::as_bytes)
            .ok_or_else(|| TransportError::relay("envelope without data"))?;
        if let Some(declared) = value.find(tags::SERVER_RSCP_DATA_LEN).and_then(TagValue::as_i64) {
            if usize::try_from(declared).ok() != Some(data.len()) {
                return Err(TransportError::relay(format!(
                    "envelope declares {declared} bytes, carries {}",
                    data.len()
                )));
            }
        }
        Ok(Self::new(registration, data.to_vec()))
    }
}

// ============================================
// Tests
// ============================================
