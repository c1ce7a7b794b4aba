// ============================================
// File: crates/rscp-core/src/protocol/frame.rs
// ============================================
//! # Frame Codec
//!
//! ## Creation Reason
//! Tag values travel inside frames that add a timestamp, a length and an
//! integrity trailer. Frames may be split or coalesced arbitrarily by the
//! socket, so decoding is incremental.
//!
//! ## Wire Format
//! ```text
//! ┌───────┬───────┬─────────────┬───────────┬──────────┬──────┬──────────┬─────────┐
//! │ E3 DC │ 00 11 │ seconds i64 │ nanos u32 │ len u16  │ data │ crc32 LE │ padding │
//! │ magic │ ctrl  │     LE      │    LE     │    LE    │      │          │ zeros   │
//! └───────┴───────┴─────────────┴───────────┴──────────┴──────┴──────────┴─────────┘
//!   ctrl: 0x0010 = trailer present, 0x000F = protocol version (1)
//! ```
//!
//! ## Main Functionality
//! - `Frame`: Decoded frame (timestamp + top-level values)
//! - `FrameChecksum`: Pluggable trailer function, CRC-32 by default
//! - `FrameCodec`: Wraps values into aligned frames
//! - `FrameDecoder`: Accumulates stream bytes and emits complete frames
//!
//! ## ⚠️ Important Note for Next Developer
//! - The trailer is validated BEFORE any tag is decoded
//! - A frame without the trailer flag is rejected, never trusted
//! - The size limit is checked as soon as the header is visible, so a
//!   corrupt length cannot make the decoder buffer without bound
//!
//! ## Last Modified
//! v0.1.0 - Initial frame codec

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use rscp_common::RscpTimestamp;

use crate::error::{CoreError, Result};
use crate::protocol::codec::TagCodec;
use crate::protocol::value::TagValue;

// ============================================
// Constants
// ============================================

/// Frame magic, written big-endian (`E3 DC`).
pub const FRAME_MAGIC: u16 = 0xE3DC;

/// Protocol version carried in the control word.
pub const PROTOCOL_VERSION: u16 = 0x0001;

/// Control word flag: integrity trailer present.
pub const CTRL_TRAILER_FLAG: u16 = 0x0010;

/// Size of the frame header.
pub const FRAME_HEADER_SIZE: usize = 18;

/// Size of the integrity trailer.
pub const TRAILER_SIZE: usize = 4;

/// Default upper bound for a frame including trailer and padding.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 32 * 1024;

const CTRL_VERSION_MASK: u16 = 0x000F;

// ============================================
// Frame
// ============================================

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Sender timestamp from the header.
    pub timestamp: RscpTimestamp,
    /// Top-level values in wire order.
    pub values: Vec<TagValue>,
}

// ============================================
// FrameChecksum
// ============================================

/// Integrity trailer function over header + data.
pub trait FrameChecksum: fmt::Debug + Clone + Send + Sync + 'static {
    /// Computes the trailer for `bytes`.
    fn checksum(&self, bytes: &[u8]) -> u32;
}

/// CRC-32 (IEEE 802.3, as zlib) trailer.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32Checksum;

impl FrameChecksum for Crc32Checksum {
    fn checksum(&self, bytes: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(bytes);
        hasher.finalize()
    }
}

// ============================================
// FrameCodec
// ============================================

/// Frame encoder and single-frame parser.
///
/// # Example
/// ```
/// use rscp_core::protocol::vocabulary::tags;
/// use rscp_core::protocol::{FrameCodec, TagCodec, TagValue};
///
/// let codec = FrameCodec::new(TagCodec::builtin()).with_alignment(32);
/// let bytes = codec.wrap(&[TagValue::request(tags::EMS_REQ_POWER_PV)]).unwrap();
/// assert_eq!(bytes.len() % 32, 0);
///
/// let mut decoder = codec.decoder();
/// let frames = decoder.push(&bytes).unwrap();
/// assert_eq!(frames[0].values[0].tag, tags::EMS_REQ_POWER_PV);
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec<C: FrameChecksum = Crc32Checksum> {
    tags: TagCodec,
    checksum: C,
    alignment: usize,
    max_frame_size: usize,
}

impl FrameCodec<Crc32Checksum> {
    /// Creates an unaligned codec with the CRC-32 trailer.
    #[must_use]
    pub fn new(tags: TagCodec) -> Self {
        Self::with_checksum(tags, Crc32Checksum)
    }
}

impl<C: FrameChecksum> FrameCodec<C> {
    /// Creates an unaligned codec with a custom trailer function.
    #[must_use]
    pub fn with_checksum(tags: TagCodec, checksum: C) -> Self {
        Self {
            tags,
            checksum,
            alignment: 1,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Pads every wrapped frame to a multiple of `alignment` bytes.
    #[must_use]
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment.max(1);
        self
    }

    /// Sets the largest accepted frame (including trailer and padding).
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Returns the tag codec.
    #[must_use]
    pub fn tags(&self) -> &TagCodec {
        &self.tags
    }

    /// Returns the configured alignment.
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Creates an incremental decoder sharing this codec's settings.
    #[must_use]
    pub fn decoder(&self) -> FrameDecoder<C> {
        FrameDecoder::new(self.clone())
    }

    fn padded(&self, len: usize) -> usize {
        len.div_ceil(self.alignment) * self.alignment
    }

    // ========================================
    // Wrap
    // ========================================

    /// Wraps values into a frame stamped with the current time.
    ///
    /// # Errors
    /// Returns `TagTooLarge` or `FrameTooLarge`.
    pub fn wrap(&self, values: &[TagValue]) -> Result<Vec<u8>> {
        self.wrap_at(values, RscpTimestamp::now())
    }

    /// Wraps values into a frame with an explicit timestamp.
    ///
    /// # Errors
    /// Returns `TagTooLarge` or `FrameTooLarge`.
    pub fn wrap_at(&self, values: &[TagValue], timestamp: RscpTimestamp) -> Result<Vec<u8>> {
        let data = self.tags.encode_all(values)?;
        let frame_len = FRAME_HEADER_SIZE + data.len() + TRAILER_SIZE;
        let total = self.padded(frame_len);
        let data_len = u16::try_from(data.len()).map_err(|_| CoreError::FrameTooLarge {
            max: self.max_frame_size,
            actual: total,
        })?;
        if total > self.max_frame_size {
            return Err(CoreError::FrameTooLarge {
                max: self.max_frame_size,
                actual: total,
            });
        }

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u16(FRAME_MAGIC);
        buf.put_u16(CTRL_TRAILER_FLAG | PROTOCOL_VERSION);
        buf.put_i64_le(timestamp.seconds);
        buf.put_u32_le(timestamp.nanos);
        buf.put_u16_le(data_len);
        buf.put_slice(&data);
        let trailer = self.checksum.checksum(&buf);
        buf.put_u32_le(trailer);
        buf.resize(total, 0);

        trace!(values = values.len(), bytes = total, "Frame wrapped");
        Ok(buf.to_vec())
    }

    // ========================================
    // Parse
    // ========================================

    /// Parses one frame from the start of `buf`.
    ///
    /// # Returns
    /// - `Ok(Some((frame, consumed)))` - complete frame incl. padding
    /// - `Ok(None)` - more bytes needed
    ///
    /// # Errors
    /// `BadMagic`, `UnsupportedVersion`, `FrameTooLarge`,
    /// `IntegrityMismatch`, `InvalidPadding` or `MalformedTag`.
    pub fn parse(&self, buf: &[u8]) -> Result<Option<(Frame, usize)>> {
        if buf.len() >= 2 {
            let magic = u16::from_be_bytes([buf[0], buf[1]]);
            if magic != FRAME_MAGIC {
                return Err(CoreError::BadMagic { found: magic });
            }
        }
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let mut header = &buf[2..FRAME_HEADER_SIZE];
        let ctrl = header.get_u16();
        let seconds = header.get_i64_le();
        let nanos = header.get_u32_le();
        let data_len = usize::from(header.get_u16_le());

        #[allow(clippy::cast_possible_truncation)]
        let version = (ctrl & CTRL_VERSION_MASK) as u8;
        if u16::from(version) != PROTOCOL_VERSION {
            return Err(CoreError::UnsupportedVersion { got: version });
        }
        let has_trailer = ctrl & CTRL_TRAILER_FLAG != 0;

        let frame_len = FRAME_HEADER_SIZE + data_len + if has_trailer { TRAILER_SIZE } else { 0 };
        let total = self.padded(frame_len);
        if total > self.max_frame_size {
            return Err(CoreError::FrameTooLarge {
                max: self.max_frame_size,
                actual: total,
            });
        }
        if buf.len() < total {
            return Ok(None);
        }

        let covered = &buf[..FRAME_HEADER_SIZE + data_len];
        let expected = self.checksum.checksum(covered);
        if !has_trailer {
            return Err(CoreError::IntegrityMismatch {
                expected,
                actual: 0,
            });
        }
        let mut trailer = &buf[FRAME_HEADER_SIZE + data_len..frame_len];
        let actual = trailer.get_u32_le();
        if actual != expected {
            return Err(CoreError::IntegrityMismatch { expected, actual });
        }
        if buf[frame_len..total].iter().any(|&b| b != 0) {
            return Err(CoreError::InvalidPadding);
        }

        let values = self.tags.decode_all(&covered[FRAME_HEADER_SIZE..])?;
        Ok(Some((
            Frame {
                timestamp: RscpTimestamp::new(seconds, nanos),
                values,
            },
            total,
        )))
    }
}

// ============================================
// FrameDecoder
// ============================================

/// Incremental frame decoder over a byte stream.
///
/// Bytes are appended with [`push`](Self::push); every complete frame is
/// returned and the remainder stays buffered for the next call.
#[derive(Debug)]
pub struct FrameDecoder<C: FrameChecksum = Crc32Checksum> {
    codec: FrameCodec<C>,
    buffer: BytesMut,
}

impl<C: FrameChecksum> FrameDecoder<C> {
    /// Creates a decoder.
    #[must_use]
    pub fn new(codec: FrameCodec<C>) -> Self {
        Self {
            codec,
            buffer: BytesMut::new(),
        }
    }

    /// Appends bytes and returns every frame completed by them.
    ///
    /// # Errors
    /// Any frame error. The buffer is cleared on error since the stream
    /// position can no longer be trusted.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        loop {
            match self.codec.parse(&self.buffer) {
                Ok(Some((frame, consumed))) => {
                    self.buffer.advance(consumed);
                    frames.push(frame);
                }
                Ok(None) => break,
                Err(e) => {
                    self.buffer.clear();
                    return Err(e);
                }
            }
        }
        if !self.buffer.is_empty() {
            trace!(buffered = self.buffer.len(), "Partial frame buffered");
        }
        Ok(frames)
    }

    /// Number of buffered bytes not yet forming a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::value::TagPayload;
    use crate::protocol::vocabulary::tags;

    fn sample_values() -> Vec<TagValue> {
        vec![
            TagValue::new(tags::EMS_POWER_PV, TagPayload::Int32(4200)),
            TagValue::string(tags::INFO_SERIAL_NUMBER, "S10-0001"),
        ]
    }

    #[test]
    fn test_crc32_reference_value() {
        assert_eq!(Crc32Checksum.checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_header_layout() {
        let codec = FrameCodec::new(TagCodec::builtin());
        let ts = RscpTimestamp::new(0x0102_0304, 0x0506_0708);
        let bytes = codec
            .wrap_at(&[TagValue::request(tags::EMS_REQ_POWER_PV)], ts)
            .unwrap();

        assert_eq!(&bytes[..4], &[0xE3, 0xDC, 0x00, 0x11]);
        assert_eq!(&bytes[4..12], &0x0102_0304i64.to_le_bytes());
        assert_eq!(&bytes[12..16], &0x0506_0708u32.to_le_bytes());
        assert_eq!(&bytes[16..18], &7u16.to_le_bytes());
        assert_eq!(bytes.len(), FRAME_HEADER_SIZE + 7 + TRAILER_SIZE);

        let crc = Crc32Checksum.checksum(&bytes[..FRAME_HEADER_SIZE + 7]);
        assert_eq!(&bytes[FRAME_HEADER_SIZE + 7..], &crc.to_le_bytes());
    }

    #[test]
    fn test_wrap_parse() {
        let codec = FrameCodec::new(TagCodec::builtin()).with_alignment(32);
        let ts = RscpTimestamp::new(1_700_000_000, 42);
        let bytes = codec.wrap_at(&sample_values(), ts).unwrap();
        assert_eq!(bytes.len() % 32, 0);

        let (frame, consumed) = codec.parse(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(frame.timestamp, ts);
        assert_eq!(frame.values, sample_values());
    }

    #[test]
    fn test_any_data_byte_flip_is_integrity_mismatch() {
        let codec = FrameCodec::new(TagCodec::builtin());
        let bytes = codec.wrap(&sample_values()).unwrap();
        let data_end = bytes.len() - TRAILER_SIZE;

        for i in FRAME_HEADER_SIZE..data_end {
            let mut corrupted = bytes.clone();
            corrupted[i] ^= 0x01;
            assert!(
                matches!(
                    codec.parse(&corrupted),
                    Err(CoreError::IntegrityMismatch { .. })
                ),
                "byte {i}"
            );
        }
    }

    #[test]
    fn test_trailer_flip_is_integrity_mismatch() {
        let codec = FrameCodec::new(TagCodec::builtin());
        let mut bytes = codec.wrap(&sample_values()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            codec.parse(&bytes),
            Err(CoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_trailer_flag_rejected() {
        let codec = FrameCodec::new(TagCodec::builtin());
        let mut bytes = codec.wrap(&sample_values()).unwrap();
        bytes[3] = 0x01;
        assert!(matches!(
            codec.parse(&bytes),
            Err(CoreError::IntegrityMismatch { actual: 0, .. })
        ));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let codec = FrameCodec::new(TagCodec::builtin());
        assert!(matches!(
            codec.parse(&[0xE3, 0xDD]),
            Err(CoreError::BadMagic { found: 0xE3DD })
        ));

        let mut bytes = codec.wrap(&sample_values()).unwrap();
        bytes[3] = 0x12;
        assert!(matches!(
            codec.parse(&bytes),
            Err(CoreError::UnsupportedVersion { got: 2 })
        ));
    }

    #[test]
    fn test_oversized_length_rejected_from_header() {
        let codec = FrameCodec::new(TagCodec::builtin()).with_max_frame_size(1024);
        let mut header = codec.wrap(&[]).unwrap();
        header.truncate(FRAME_HEADER_SIZE);
        header[16..18].copy_from_slice(&60_000u16.to_le_bytes());

        assert!(matches!(
            codec.parse(&header),
            Err(CoreError::FrameTooLarge { max: 1024, .. })
        ));
        assert!(matches!(
            codec.wrap(&[TagValue::new(
                tags::SERVER_RSCP_DATA,
                TagPayload::ByteArray(vec![0; 2000])
            )]),
            Err(CoreError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_nonzero_padding_rejected() {
        let codec = FrameCodec::new(TagCodec::builtin()).with_alignment(32);
        let mut bytes = codec.wrap(&sample_values()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 0x01;
        assert!(matches!(codec.parse(&bytes), Err(CoreError::InvalidPadding)));
    }

    #[test]
    fn test_reassembly_at_every_split_point() {
        let codec = FrameCodec::new(TagCodec::builtin()).with_alignment(32);
        let bytes = codec.wrap(&sample_values()).unwrap();

        for split in 0..=bytes.len() {
            let mut decoder = codec.decoder();
            let first = decoder.push(&bytes[..split]).unwrap();
            let second = decoder.push(&bytes[split..]).unwrap();

            let frames: Vec<_> = first.into_iter().chain(second).collect();
            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0].values, sample_values());
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn test_byte_at_a_time_with_coalesced_frames() {
        let codec = FrameCodec::new(TagCodec::builtin());
        let mut stream = codec.wrap(&sample_values()).unwrap();
        stream.extend(codec.wrap(&[TagValue::request(tags::INFO_REQ_UTC_TIME)]).unwrap());

        let mut decoder = codec.decoder();
        let mut frames = Vec::new();
        for byte in &stream {
            frames.extend(decoder.push(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].values[0].tag, tags::INFO_REQ_UTC_TIME);

        let mut decoder = codec.decoder();
        assert_eq!(decoder.push(&stream).unwrap().len(), 2);
    }

    #[test]
    fn test_decoder_clears_after_error() {
        let codec = FrameCodec::new(TagCodec::builtin());
        let mut decoder = codec.decoder();
        assert!(decoder.push(&[0x00, 0x00, 0x00]).is_err());
        assert_eq!(decoder.buffered(), 0);
    }
}
