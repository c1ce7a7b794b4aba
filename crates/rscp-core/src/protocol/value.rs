// ============================================
// File: crates/rscp-core/src/protocol/value.rs
// ============================================
//! # Tag Values
//!
//! ## Creation Reason
//! In-memory form of RSCP tag trees. A value is built top-down, so trees are
//! finite and acyclic by construction.
//!
//! ## Main Functionality
//! - `TypeTag`: Wire type discriminator
//! - `TagPayload`: Typed payload, one variant per wire type
//! - `TagValue`: Tag id + payload, with tree search and typed accessors
//! - `ErrorCode`: Device error codes carried by `Error`-typed values
//!
//! ## ⚠️ Important Note for Next Developer
//! - `TagValue::encoded_len` must agree byte-for-byte with `TagCodec::encode`
//! - `find` searches depth-first, parent before children
//!
//! ## Last Modified
//! v0.1.0 - Initial value model

use std::fmt;

use serde::{Deserialize, Serialize};

use rscp_common::{RscpTimestamp, TagId};

// ============================================
// Constants
// ============================================

/// Size of a tag header on the wire: id (4) + type (1) + length (2).
pub const TAG_HEADER_SIZE: usize = 7;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Encoded size of a `Timestamp` payload: i64 seconds + i32 nanoseconds.
pub const TIMESTAMP_SIZE: usize = 12;

// ============================================
// TypeTag
// ============================================

/// RSCP data type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeTag {
    /// No payload.
    None = 0x00,
    /// Boolean, one byte.
    Bool = 0x01,
    /// Signed 8-bit integer.
    Char8 = 0x02,
    /// Unsigned 8-bit integer.
    UChar8 = 0x03,
    /// Signed 16-bit integer.
    Int16 = 0x04,
    /// Unsigned 16-bit integer.
    Uint16 = 0x05,
    /// Signed 32-bit integer.
    Int32 = 0x06,
    /// Unsigned 32-bit integer.
    Uint32 = 0x07,
    /// Signed 64-bit integer.
    Int64 = 0x08,
    /// Unsigned 64-bit integer.
    Uint64 = 0x09,
    /// IEEE 754 single precision.
    Float32 = 0x0A,
    /// IEEE 754 double precision.
    Double64 = 0x0B,
    /// Raw bit field.
    Bitfield = 0x0C,
    /// UTF-8 string without terminator.
    CString = 0x0D,
    /// Nested tag values.
    Container = 0x0E,
    /// Seconds + nanoseconds.
    Timestamp = 0x0F,
    /// Raw bytes.
    ByteArray = 0x10,
    /// Device error code.
    Error = 0xFF,
}

impl TypeTag {
    /// Parses a wire discriminator.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::None,
            0x01 => Self::Bool,
            0x02 => Self::Char8,
            0x03 => Self::UChar8,
            0x04 => Self::Int16,
            0x05 => Self::Uint16,
            0x06 => Self::Int32,
            0x07 => Self::Uint32,
            0x08 => Self::Int64,
            0x09 => Self::Uint64,
            0x0A => Self::Float32,
            0x0B => Self::Double64,
            0x0C => Self::Bitfield,
            0x0D => Self::CString,
            0x0E => Self::Container,
            0x0F => Self::Timestamp,
            0x10 => Self::ByteArray,
            0xFF => Self::Error,
            _ => return None,
        })
    }

    /// Returns the wire discriminator.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns the payload size for fixed-size types.
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::None => Some(0),
            Self::Bool | Self::Char8 | Self::UChar8 => Some(1),
            Self::Int16 | Self::Uint16 => Some(2),
            Self::Int32 | Self::Uint32 | Self::Float32 | Self::Error => Some(4),
            Self::Int64 | Self::Uint64 | Self::Double64 => Some(8),
            Self::Timestamp => Some(TIMESTAMP_SIZE),
            Self::Bitfield | Self::CString | Self::Container | Self::ByteArray => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================
// ErrorCode
// ============================================

/// Error codes reported by the device in `Error`-typed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Request was not handled.
    NotHandled,
    /// Access denied for the current user level.
    AccessDenied,
    /// Request was badly formatted.
    Format,
    /// Try again later.
    Again,
    /// Value out of bounds.
    OutOfBounds,
    /// Requested data is not available.
    NotAvailable,
    /// Tag unknown to the device.
    UnknownTag,
    /// Resource already in use.
    AlreadyInUse,
    /// Any other code.
    Other(u32),
}

impl ErrorCode {
    /// Maps a raw code.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::NotHandled,
            2 => Self::AccessDenied,
            3 => Self::Format,
            4 => Self::Again,
            5 => Self::OutOfBounds,
            6 => Self::NotAvailable,
            7 => Self::UnknownTag,
            8 => Self::AlreadyInUse,
            other => Self::Other(other),
        }
    }

    /// Returns the raw code.
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::NotHandled => 1,
            Self::AccessDenied => 2,
            Self::Format => 3,
            Self::Again => 4,
            Self::OutOfBounds => 5,
            Self::NotAvailable => 6,
            Self::UnknownTag => 7,
            Self::AlreadyInUse => 8,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(raw) => write!(f, "error code {raw}"),
            known => write!(f, "{known:?}"),
        }
    }
}

// ============================================
// TagPayload
// ============================================

/// Typed payload of a tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagPayload {
    /// No payload.
    None,
    /// Boolean.
    Bool(bool),
    /// Signed 8-bit.
    Char8(i8),
    /// Unsigned 8-bit.
    UChar8(u8),
    /// Signed 16-bit.
    Int16(i16),
    /// Unsigned 16-bit.
    Uint16(u16),
    /// Signed 32-bit.
    Int32(i32),
    /// Unsigned 32-bit.
    Uint32(u32),
    /// Signed 64-bit.
    Int64(i64),
    /// Unsigned 64-bit.
    Uint64(u64),
    /// Single precision float.
    Float32(f32),
    /// Double precision float.
    Double64(f64),
    /// Bit field bytes.
    Bitfield(Vec<u8>),
    /// UTF-8 string.
    CString(String),
    /// Child values.
    Container(Vec<TagValue>),
    /// Timestamp.
    Timestamp(RscpTimestamp),
    /// Raw bytes.
    ByteArray(Vec<u8>),
    /// Device error code.
    Error(u32),
}

impl TagPayload {
    /// Returns the wire type of this payload.
    #[must_use]
    pub const fn type_tag(&self) -> TypeTag {
        match self {
            Self::None => TypeTag::None,
            Self::Bool(_) => TypeTag::Bool,
            Self::Char8(_) => TypeTag::Char8,
            Self::UChar8(_) => TypeTag::UChar8,
            Self::Int16(_) => TypeTag::Int16,
            Self::Uint16(_) => TypeTag::Uint16,
            Self::Int32(_) => TypeTag::Int32,
            Self::Uint32(_) => TypeTag::Uint32,
            Self::Int64(_) => TypeTag::Int64,
            Self::Uint64(_) => TypeTag::Uint64,
            Self::Float32(_) => TypeTag::Float32,
            Self::Double64(_) => TypeTag::Double64,
            Self::Bitfield(_) => TypeTag::Bitfield,
            Self::CString(_) => TypeTag::CString,
            Self::Container(_) => TypeTag::Container,
            Self::Timestamp(_) => TypeTag::Timestamp,
            Self::ByteArray(_) => TypeTag::ByteArray,
            Self::Error(_) => TypeTag::Error,
        }
    }

    /// Returns the encoded payload size (excluding the tag header).
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Bitfield(bytes) | Self::ByteArray(bytes) => bytes.len(),
            Self::CString(text) => text.len(),
            Self::Container(children) => children.iter().map(TagValue::encoded_len).sum(),
            fixed => fixed.type_tag().fixed_size().unwrap_or_default(),
        }
    }
}

// ============================================
// TagValue
// ============================================

/// One node of an RSCP tag tree.
///
/// # Example
/// ```
/// use rscp_common::TagId;
/// use rscp_core::protocol::{TagPayload, TagValue};
///
/// let tree = TagValue::container(
///     TagId(0x0000_0001),
///     vec![TagValue::string(TagId(0x0000_0002), "admin")],
/// );
/// assert_eq!(tree.find(TagId(0x0000_0002)).and_then(TagValue::as_str), Some("admin"));
/// assert_eq!(tree.encoded_len(), 7 + 7 + 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TagValue {
    /// Tag identifier.
    pub tag: TagId,
    /// Typed payload.
    pub payload: TagPayload,
}

impl TagValue {
    /// Creates a value.
    #[must_use]
    pub const fn new(tag: TagId, payload: TagPayload) -> Self {
        Self { tag, payload }
    }

    /// Creates a payload-less value, the usual shape of a request.
    #[must_use]
    pub const fn request(tag: TagId) -> Self {
        Self::new(tag, TagPayload::None)
    }

    /// Creates a container value.
    #[must_use]
    pub const fn container(tag: TagId, children: Vec<TagValue>) -> Self {
        Self::new(tag, TagPayload::Container(children))
    }

    /// Creates a string value.
    pub fn string(tag: TagId, text: impl Into<String>) -> Self {
        Self::new(tag, TagPayload::CString(text.into()))
    }

    /// Returns the wire type.
    #[must_use]
    pub const fn type_tag(&self) -> TypeTag {
        self.payload.type_tag()
    }

    /// Returns the full encoded size including the header.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        TAG_HEADER_SIZE + self.payload.encoded_len()
    }

    /// Returns the children of a container, or an empty slice.
    #[must_use]
    pub fn children(&self) -> &[TagValue] {
        match &self.payload {
            TagPayload::Container(children) => children,
            _ => &[],
        }
    }

    /// Depth-first search for the first value carrying `tag`, starting with
    /// `self`.
    #[must_use]
    pub fn find(&self, tag: TagId) -> Option<&TagValue> {
        if self.tag == tag {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(tag))
    }

    /// Returns `true` if this value carries a device error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.payload, TagPayload::Error(_))
    }

    /// Returns the device error code, if this is an `Error` value.
    #[must_use]
    pub const fn error_code(&self) -> Option<ErrorCode> {
        match self.payload {
            TagPayload::Error(raw) => Some(ErrorCode::from_raw(raw)),
            _ => None,
        }
    }

    /// Returns any integer or boolean payload widened to `i64`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn as_i64(&self) -> Option<i64> {
        Some(match self.payload {
            TagPayload::Bool(v) => i64::from(v),
            TagPayload::Char8(v) => i64::from(v),
            TagPayload::UChar8(v) => i64::from(v),
            TagPayload::Int16(v) => i64::from(v),
            TagPayload::Uint16(v) => i64::from(v),
            TagPayload::Int32(v) => i64::from(v),
            TagPayload::Uint32(v) => i64::from(v),
            TagPayload::Int64(v) => v,
            TagPayload::Uint64(v) => i64::try_from(v).ok()?,
            _ => return None,
        })
    }

    /// Returns any numeric payload as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self.payload {
            TagPayload::Float32(v) => Some(f64::from(v)),
            TagPayload::Double64(v) => Some(v),
            TagPayload::Uint64(v) => Some(v as f64),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Returns a boolean payload.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self.payload {
            TagPayload::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a string payload.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            TagPayload::CString(text) => Some(text),
            _ => None,
        }
    }

    /// Returns a byte array or bit field payload.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            TagPayload::ByteArray(bytes) | TagPayload::Bitfield(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns a timestamp payload.
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<RscpTimestamp> {
        match self.payload {
            TagPayload::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }
}

// ============================================
// Tests
// ============================================
