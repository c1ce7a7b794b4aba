// ============================================
// File: crates/rscp-core/src/protocol/codec.rs
// ============================================
//! # Tag Codec
//!
//! ## Creation Reason
//! Binary encoding and decoding of RSCP tag values, including arbitrarily
//! nested containers.
//!
//! ## Wire Format
//! ```text
//! ┌────────────┬─────────┬─────────────┬──────────────────┐
//! │ tag u32 LE │ type u8 │ len u16 LE  │ payload (len)    │
//! └────────────┴─────────┴─────────────┴──────────────────┘
//! ```
//! A container's payload is the concatenation of its encoded children.
//!
//! ## Parsing Strategy
//! 1. Check the 7-byte header is present
//! 2. Resolve the type discriminator
//! 3. Check the declared length against the remaining buffer and, for
//!    fixed-size types, against the type size
//! 4. Decode the payload; containers recurse until their length is consumed
//!
//! ## ⚠️ Important Note for Next Developer
//! - Decoding depends only on the bytes and the vocabulary
//! - Nesting depth is capped so hostile input cannot exhaust the stack
//! - Strings are decoded lossily: devices occasionally emit Latin-1
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use std::fmt::Write as _;
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use rscp_common::time::NANOS_PER_SEC;
use rscp_common::{RscpTimestamp, TagId};

use crate::error::{CoreError, Result};
use crate::protocol::value::{
    ErrorCode, TagPayload, TagValue, TypeTag, MAX_PAYLOAD_SIZE, TAG_HEADER_SIZE,
};
use crate::protocol::vocabulary::TagVocabulary;

// ============================================
// Constants
// ============================================

/// Maximum container nesting accepted by the decoder.
pub const MAX_NESTING_DEPTH: usize = 32;

// ============================================
// TagCodec
// ============================================

/// Encoder/decoder for tag values.
///
/// # Example
/// ```
/// use rscp_core::protocol::vocabulary::tags;
/// use rscp_core::protocol::{TagCodec, TagPayload, TagValue};
///
/// let codec = TagCodec::builtin();
/// let value = TagValue::new(tags::EMS_POWER_PV, TagPayload::Int32(1250));
///
/// let bytes = codec.encode_to_vec(&value).unwrap();
/// let (decoded, consumed) = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, value);
/// assert_eq!(consumed, bytes.len());
/// ```
#[derive(Debug, Clone)]
pub struct TagCodec {
    vocabulary: Arc<TagVocabulary>,
    strict: bool,
}

impl TagCodec {
    /// Creates a lenient codec over a vocabulary.
    #[must_use]
    pub fn new(vocabulary: Arc<TagVocabulary>) -> Self {
        Self {
            vocabulary,
            strict: false,
        }
    }

    /// Creates a lenient codec over the built-in vocabulary.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(TagVocabulary::shared_builtin())
    }

    /// Enables or disables type checking against the vocabulary on decode.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Returns the vocabulary.
    #[must_use]
    pub fn vocabulary(&self) -> &Arc<TagVocabulary> {
        &self.vocabulary
    }

    // ========================================
    // Encoding
    // ========================================

    /// Encodes one value into `buf`.
    ///
    /// # Errors
    /// Returns `TagTooLarge` if any payload exceeds the 16-bit length field,
    /// `MalformedTag` for a timestamp with a second or more of nanoseconds.
    pub fn encode(&self, value: &TagValue, buf: &mut BytesMut) -> Result<()> {
        let len = value.payload.encoded_len();
        if len > MAX_PAYLOAD_SIZE {
            return Err(CoreError::TagTooLarge {
                tag: value.tag,
                size: len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if let TagPayload::Timestamp(ts) = &value.payload {
            if !ts.is_normalized() {
                return Err(CoreError::malformed(format!(
                    "tag {}: timestamp nanoseconds out of range: {}",
                    value.tag, ts.nanos
                )));
            }
        }

        buf.reserve(TAG_HEADER_SIZE + len);
        buf.put_u32_le(value.tag.raw());
        buf.put_u8(value.type_tag().as_byte());
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u16_le(len as u16);

        match &value.payload {
            TagPayload::None => {}
            TagPayload::Bool(v) => buf.put_u8(u8::from(*v)),
            TagPayload::Char8(v) => buf.put_i8(*v),
            TagPayload::UChar8(v) => buf.put_u8(*v),
            TagPayload::Int16(v) => buf.put_i16_le(*v),
            TagPayload::Uint16(v) => buf.put_u16_le(*v),
            TagPayload::Int32(v) => buf.put_i32_le(*v),
            TagPayload::Uint32(v) | TagPayload::Error(v) => buf.put_u32_le(*v),
            TagPayload::Int64(v) => buf.put_i64_le(*v),
            TagPayload::Uint64(v) => buf.put_u64_le(*v),
            TagPayload::Float32(v) => buf.put_f32_le(*v),
            TagPayload::Double64(v) => buf.put_f64_le(*v),
            TagPayload::Bitfield(bytes) | TagPayload::ByteArray(bytes) => buf.put_slice(bytes),
            TagPayload::CString(text) => buf.put_slice(text.as_bytes()),
            TagPayload::Timestamp(ts) => {
                buf.put_i64_le(ts.seconds);
                // below one second, checked above
                #[allow(clippy::cast_possible_wrap)]
                buf.put_i32_le(ts.nanos as i32);
            }
            TagPayload::Container(children) => {
                for child in children {
                    self.encode(child, buf)?;
                }
            }
        }
        Ok(())
    }

    /// Encodes one value into a fresh vector.
    ///
    /// # Errors
    /// See [`TagCodec::encode`].
    pub fn encode_to_vec(&self, value: &TagValue) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(value.encoded_len());
        self.encode(value, &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Encodes a sequence of top-level values back to back.
    ///
    /// # Errors
    /// See [`TagCodec::encode`].
    pub fn encode_all(&self, values: &[TagValue]) -> Result<Vec<u8>> {
        let size = values.iter().map(TagValue::encoded_len).sum();
        let mut buf = BytesMut::with_capacity(size);
        for value in values {
            self.encode(value, &mut buf)?;
        }
        Ok(buf.to_vec())
    }

    // ========================================
    // Decoding
    // ========================================

    /// Decodes one value from the start of `buf`.
    ///
    /// # Returns
    /// The value and the number of bytes it occupied.
    ///
    /// # Errors
    /// Returns `MalformedTag` on truncated input, an unknown type, a length
    /// that does not fit the type, or (in strict mode) a type that differs
    /// from the vocabulary.
    pub fn decode(&self, buf: &[u8]) -> Result<(TagValue, usize)> {
        self.decode_at(buf, 0)
    }

    /// Decodes top-level values until `buf` is exhausted.
    ///
    /// # Errors
    /// See [`TagCodec::decode`].
    pub fn decode_all(&self, buf: &[u8]) -> Result<Vec<TagValue>> {
        let mut values = Vec::new();
        let mut offset = 0;
        while offset < buf.len() {
            let (value, used) = self.decode_at(&buf[offset..], 0)?;
            values.push(value);
            offset += used;
        }
        Ok(values)
    }

    fn decode_at(&self, buf: &[u8], depth: usize) -> Result<(TagValue, usize)> {
        if depth > MAX_NESTING_DEPTH {
            return Err(CoreError::malformed(format!(
                "containers nested deeper than {MAX_NESTING_DEPTH}"
            )));
        }
        if buf.len() < TAG_HEADER_SIZE {
            return Err(CoreError::malformed(format!(
                "header needs {TAG_HEADER_SIZE} bytes, {} available",
                buf.len()
            )));
        }

        let mut header = &buf[..TAG_HEADER_SIZE];
        let tag = TagId(header.get_u32_le());
        let type_byte = header.get_u8();
        let len = usize::from(header.get_u16_le());

        let data_type = TypeTag::from_byte(type_byte).ok_or_else(|| {
            CoreError::malformed(format!("tag {tag}: unknown type 0x{type_byte:02x}"))
        })?;

        let total = TAG_HEADER_SIZE + len;
        if total > buf.len() {
            return Err(CoreError::malformed(format!(
                "tag {tag}: declared length {len} exceeds remaining {}",
                buf.len() - TAG_HEADER_SIZE
            )));
        }
        if let Some(size) = data_type.fixed_size() {
            if size != len {
                return Err(CoreError::malformed(format!(
                    "tag {tag}: {data_type} needs {size} bytes, declared {len}"
                )));
            }
        }
        self.check_type(tag, data_type)?;

        let mut body = &buf[TAG_HEADER_SIZE..total];
        let payload = match data_type {
            TypeTag::None => TagPayload::None,
            TypeTag::Bool => TagPayload::Bool(body.get_u8() != 0),
            TypeTag::Char8 => TagPayload::Char8(body.get_i8()),
            TypeTag::UChar8 => TagPayload::UChar8(body.get_u8()),
            TypeTag::Int16 => TagPayload::Int16(body.get_i16_le()),
            TypeTag::Uint16 => TagPayload::Uint16(body.get_u16_le()),
            TypeTag::Int32 => TagPayload::Int32(body.get_i32_le()),
            TypeTag::Uint32 => TagPayload::Uint32(body.get_u32_le()),
            TypeTag::Int64 => TagPayload::Int64(body.get_i64_le()),
            TypeTag::Uint64 => TagPayload::Uint64(body.get_u64_le()),
            TypeTag::Float32 => TagPayload::Float32(body.get_f32_le()),
            TypeTag::Double64 => TagPayload::Double64(body.get_f64_le()),
            TypeTag::Error => TagPayload::Error(body.get_u32_le()),
            TypeTag::Bitfield => TagPayload::Bitfield(body.to_vec()),
            TypeTag::ByteArray => TagPayload::ByteArray(body.to_vec()),
            TypeTag::CString => TagPayload::CString(String::from_utf8_lossy(body).into_owned()),
            TypeTag::Timestamp => {
                let seconds = body.get_i64_le();
                let nanos = u32::try_from(body.get_i32_le())
                    .ok()
                    .filter(|n| *n < NANOS_PER_SEC)
                    .ok_or_else(|| {
                        CoreError::malformed(format!("tag {tag}: timestamp nanoseconds out of range"))
                    })?;
                TagPayload::Timestamp(RscpTimestamp::new(seconds, nanos))
            }
            TypeTag::Container => {
                let mut children = Vec::new();
                let mut offset = 0;
                while offset < body.len() {
                    let (child, used) = self.decode_at(&body[offset..], depth + 1)?;
                    children.push(child);
                    offset += used;
                }
                TagPayload::Container(children)
            }
        };

        Ok((TagValue::new(tag, payload), total))
    }

    fn check_type(&self, tag: TagId, actual: TypeTag) -> Result<()> {
        if !self.strict || actual == TypeTag::Error {
            return Ok(());
        }
        match self.vocabulary.expected_type(tag) {
            Some(expected) if expected != actual => Err(CoreError::malformed(format!(
                "tag {}: expected {expected}, got {actual}",
                self.vocabulary.label(tag)
            ))),
            _ => Ok(()),
        }
    }

    // ========================================
    // Diagnostics
    // ========================================

    /// Renders a tag tree with vocabulary names, one value per line.
    #[must_use]
    pub fn describe(&self, value: &TagValue) -> String {
        let mut out = String::new();
        self.describe_into(value, 0, &mut out);
        out
    }

    fn describe_into(&self, value: &TagValue, indent: usize, out: &mut String) {
        let label = self.vocabulary.label(value.tag);
        let _ = write!(out, "{:indent$}{label} ({})", "", value.type_tag(), indent = indent * 2);
        match &value.payload {
            TagPayload::None => {}
            TagPayload::Container(children) => {
                for child in children {
                    out.push('\n');
                    self.describe_into(child, indent + 1, out);
                }
            }
            TagPayload::CString(text) => {
                let _ = write!(out, " = {text:?}");
            }
            TagPayload::Bitfield(bytes) | TagPayload::ByteArray(bytes) => {
                let _ = write!(out, " = [{} bytes]", bytes.len());
            }
            TagPayload::Timestamp(ts) => {
                let _ = write!(out, " = {ts}");
            }
            TagPayload::Error(raw) => {
                let _ = write!(out, " = {}", ErrorCode::from_raw(*raw));
            }
            TagPayload::Float32(v) => {
                let _ = write!(out, " = {v}");
            }
            TagPayload::Double64(v) => {
                let _ = write!(out, " = {v}");
            }
            TagPayload::Uint64(v) => {
                let _ = write!(out, " = {v}");
            }
            _ => {
                if let Some(v) = value.as_i64() {
                    let _ = write!(out, " = {v}");
                }
            }
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::vocabulary::tags;

    fn auth_request() -> TagValue {
        TagValue::container(
            tags::RSCP_REQ_AUTHENTICATION,
            vec![
                TagValue::string(tags::RSCP_AUTHENTICATION_USER, "admin"),
                TagValue::string(tags::RSCP_AUTHENTICATION_PASSWORD, "pw"),
            ],
        )
    }

    #[test]
    fn test_exact_layout_int32() {
        let codec = TagCodec::builtin();
        let value = TagValue::new(tags::EMS_POWER_PV, TagPayload::Int32(1250));
        let bytes = codec.encode_to_vec(&value).unwrap();
        assert_eq!(
            bytes,
            [0x01, 0x00, 0x80, 0x01, 0x06, 0x04, 0x00, 0xE2, 0x04, 0x00, 0x00]
        );
    }

    #[test]
    fn test_container_length_is_sum_of_children() {
        let codec = TagCodec::builtin();
        let bytes = codec.encode_to_vec(&auth_request()).unwrap();
        // children: (7 + 5) + (7 + 2)
        assert_eq!(&bytes[5..7], &21u16.to_le_bytes());
        assert_eq!(bytes.len(), 7 + 21);
    }

    #[test]
    fn test_nested_tree_roundtrip() {
        let codec = TagCodec::builtin();
        let tree = TagValue::container(
            tags::INFO_INFO,
            vec![
                TagValue::string(tags::INFO_SERIAL_NUMBER, "S10-123"),
                TagValue::container(
                    tags::SERVER_REQ_RSCP_CMD,
                    vec![
                        TagValue::new(tags::SERVER_CONNECTION_ID, TagPayload::Int64(-5)),
                        TagValue::new(tags::SERVER_RSCP_DATA, TagPayload::ByteArray(vec![1, 2, 3])),
                        TagValue::container(tags::INFO_INFO, Vec::new()),
                    ],
                ),
                TagValue::new(tags::EMS_AUTARKY, TagPayload::Float32(87.5)),
                TagValue::new(
                    tags::INFO_UTC_TIME,
                    TagPayload::Timestamp(RscpTimestamp::new(1_700_000_000, 500)),
                ),
                TagValue::new(tags::EMS_POWER_PV, TagPayload::Error(6)),
            ],
        );

        let bytes = codec.encode_to_vec(&tree).unwrap();
        assert_eq!(bytes.len(), tree.encoded_len());
        let (decoded, consumed) = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, tree);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_decode_all_sequence() {
        let codec = TagCodec::builtin();
        let values = vec![
            TagValue::request(tags::EMS_REQ_POWER_PV),
            TagValue::request(tags::EMS_REQ_BAT_SOC),
        ];
        let bytes = codec.encode_all(&values).unwrap();
        assert_eq!(codec.decode_all(&bytes).unwrap(), values);
    }

    #[test]
    fn test_truncated_input_rejected() {
        let codec = TagCodec::builtin();
        let bytes = codec.encode_to_vec(&auth_request()).unwrap();
        for cut in 0..bytes.len() {
            assert!(
                matches!(codec.decode(&bytes[..cut]), Err(CoreError::MalformedTag { .. })),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let codec = TagCodec::builtin();
        let bytes = [0x01, 0x00, 0x00, 0x00, 0x42, 0x00, 0x00];
        assert!(matches!(codec.decode(&bytes), Err(CoreError::MalformedTag { .. })));
    }

    #[test]
    fn test_fixed_size_mismatch_rejected() {
        let codec = TagCodec::builtin();
        // Int32 declaring 2 bytes
        let bytes = [0x01, 0x00, 0x80, 0x01, 0x06, 0x02, 0x00, 0xAA, 0xBB];
        assert!(matches!(codec.decode(&bytes), Err(CoreError::MalformedTag { .. })));
    }

    #[test]
    fn test_container_child_overrun_rejected() {
        let codec = TagCodec::builtin();
        let mut bytes = codec.encode_to_vec(&auth_request()).unwrap();
        // shrink the container so its last child overruns it
        bytes[5] -= 1;
        bytes.pop();
        assert!(matches!(codec.decode(&bytes), Err(CoreError::MalformedTag { .. })));
    }

    #[test]
    fn test_nesting_depth_limited() {
        let codec = TagCodec::builtin();
        let mut value = TagValue::request(tags::EMS_REQ_POWER_PV);
        for _ in 0..=MAX_NESTING_DEPTH {
            value = TagValue::container(tags::INFO_INFO, vec![value]);
        }
        let bytes = codec.encode_to_vec(&value).unwrap();
        assert!(matches!(codec.decode(&bytes), Err(CoreError::MalformedTag { .. })));
    }

    #[test]
    fn test_tag_too_large() {
        let codec = TagCodec::builtin();
        let value = TagValue::new(
            tags::SERVER_RSCP_DATA,
            TagPayload::ByteArray(vec![0; MAX_PAYLOAD_SIZE + 1]),
        );
        assert!(matches!(
            codec.encode_to_vec(&value),
            Err(CoreError::TagTooLarge { .. })
        ));
    }

    #[test]
    fn test_timestamp_nanos_must_stay_below_one_second() {
        let codec = TagCodec::builtin();

        let carried = TagValue::new(
            tags::INFO_UTC_TIME,
            TagPayload::Timestamp(RscpTimestamp::new(0, 3_000_000_000)),
        );
        let bytes = codec.encode_to_vec(&carried).unwrap();
        let (decoded, _) = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.as_timestamp(), Some(RscpTimestamp::new(3, 0)));

        let raw = TagValue::new(
            tags::INFO_UTC_TIME,
            TagPayload::Timestamp(RscpTimestamp {
                seconds: 0,
                nanos: 3_000_000_000,
            }),
        );
        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(&raw, &mut buf),
            Err(CoreError::MalformedTag { .. })
        ));
        assert!(buf.is_empty());

        let mut wire = bytes;
        wire[15..19].copy_from_slice(&1_000_000_000i32.to_le_bytes());
        assert!(matches!(codec.decode(&wire), Err(CoreError::MalformedTag { .. })));
    }

    #[test]
    fn test_strict_mode_checks_vocabulary_type() {
        let value = TagValue::new(tags::EMS_POWER_PV, TagPayload::Uint16(3));
        let bytes = TagCodec::builtin().encode_to_vec(&value).unwrap();

        assert!(TagCodec::builtin().decode(&bytes).is_ok());
        assert!(matches!(
            TagCodec::builtin().strict(true).decode(&bytes),
            Err(CoreError::MalformedTag { .. })
        ));

        let error = TagValue::new(tags::EMS_POWER_PV, TagPayload::Error(2));
        let bytes = TagCodec::builtin().encode_to_vec(&error).unwrap();
        assert!(TagCodec::builtin().strict(true).decode(&bytes).is_ok());
    }

    #[test]
    fn test_describe_uses_names() {
        let codec = TagCodec::builtin();
        let text = codec.describe(&auth_request());
        assert!(text.starts_with("RSCP_REQ_AUTHENTICATION (Container)"));
        assert!(text.contains("\n  RSCP_AUTHENTICATION_USER (CString) = \"admin\""));
    }
}
