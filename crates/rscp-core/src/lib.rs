// ============================================
// File: crates/rscp-core/src/lib.rs
// ============================================
//! # RSCP Core - Codec, Framing & Cipher Library
//!
//! ## Creation Reason
//! Everything needed to turn tag values into the bytes an E3/DC device
//! accepts and back, with no I/O. Transports and the session build on it.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - `TagValue` trees and the 17 wire types
//! - `TagVocabulary` mapping names ↔ ids ↔ expected types
//! - `TagCodec` for the 7-byte-header TLV encoding
//! - `FrameCodec`/`FrameDecoder` with CRC-32 trailer and reassembly
//!
//! ### Crypto Module ([`crypto`])
//! - `RscpKey` derived from the device passphrase
//! - `Rijndael256` block cipher (256-bit block)
//! - `CipherRing` with chained per-direction IVs
//!
//! ### Channel ([`channel`])
//! - `SecureChannel`: seal values into ciphertext, open ciphertext into frames
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 rscp-client                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │     rscp-core  ◄────── rscp-transport               │
//! │   You are here                │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │              rscp-common                            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - No async, no sockets: keep this crate pure so it can be tested
//!   byte-for-byte
//! - Rijndael-256 is implemented here because no maintained crate offers
//!   the 256-bit block variant; AES (128-bit block) is NOT compatible
//! - Key types implement Zeroize
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod crypto;
pub mod error;
pub mod protocol;

// Re-export commonly used items
pub use channel::SecureChannel;
pub use crypto::{CipherRing, CiphertextChain, IvChain, RscpKey};
pub use error::{CoreError, Result};
pub use protocol::{
    tags, Frame, FrameCodec, FrameDecoder, TagCodec, TagPayload, TagValue, TagVocabulary,
    TypeTag,
};
