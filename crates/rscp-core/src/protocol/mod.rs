// ============================================
// File: crates/rscp-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! RSCP wire format: tag values, the vocabulary that names them, and the
//! frames that carry them.
//!
//! ## Main Functionality
//! - [`value`]: `TagValue` trees and `TypeTag`
//! - [`vocabulary`]: Tag id ↔ name ↔ type table
//! - [`codec`]: TLV encoding/decoding
//! - [`frame`]: Frame wrapping, integrity trailer and stream reassembly
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod frame;
pub mod value;
pub mod vocabulary;

pub use codec::TagCodec;
pub use frame::{Crc32Checksum, Frame, FrameChecksum, FrameCodec, FrameDecoder};
pub use value::{ErrorCode, TagPayload, TagValue, TypeTag};
pub use vocabulary::{tags, TagEntry, TagVocabulary};
