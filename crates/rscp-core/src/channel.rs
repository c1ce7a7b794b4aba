// ============================================
// File: crates/rscp-core/src/channel.rs
// ============================================
//! # Secure Channel
//!
//! ## Creation Reason
//! Glue between framing and encryption for one connection. Transports move
//! opaque bytes; the session only sees tag values. Everything in between
//! lives here.
//!
//! ## Data Flow
//! ```text
//!  seal:  [TagValue] ──► FrameCodec::wrap (32-aligned) ──► CipherRing::encrypt ──► bytes
//!  open:  bytes ──► CipherRing::decrypt ──► FrameDecoder::push ──► [Frame]
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Frame structure errors after decryption mean the IV chains diverged
//!   (or the key is wrong), so they surface as `CryptoDesync`
//! - The channel is symmetric; the simulated device in tests uses it too
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use tracing::{debug, trace};

use crate::crypto::{CipherRing, CiphertextChain, IvChain, RscpKey, BLOCK_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::{
    Crc32Checksum, Frame, FrameChecksum, FrameCodec, FrameDecoder, TagCodec, TagValue,
};

/// Encrypting frame channel for one connection.
///
/// # Example
/// ```
/// use rscp_core::channel::SecureChannel;
/// use rscp_core::crypto::RscpKey;
/// use rscp_core::protocol::vocabulary::tags;
/// use rscp_core::protocol::{TagCodec, TagValue};
///
/// let key = RscpKey::from_passphrase("rscp-secret").unwrap();
/// let mut client = SecureChannel::new(&key, TagCodec::builtin());
/// let mut device = SecureChannel::new(&key, TagCodec::builtin());
///
/// let wire = client.seal(&[TagValue::request(tags::EMS_REQ_POWER_PV)]).unwrap();
/// let frames = device.open(&wire).unwrap();
/// assert_eq!(frames[0].values[0].tag, tags::EMS_REQ_POWER_PV);
/// ```
#[derive(Debug)]
pub struct SecureChannel<C: FrameChecksum = Crc32Checksum, I: IvChain = CiphertextChain> {
    codec: FrameCodec<C>,
    decoder: FrameDecoder<C>,
    ring: CipherRing<I>,
}

impl SecureChannel<Crc32Checksum, CiphertextChain> {
    /// Creates a channel with the default trailer and IV chain.
    #[must_use]
    pub fn new(key: &RscpKey, tags: TagCodec) -> Self {
        Self::with_parts(FrameCodec::new(tags), CipherRing::new(key))
    }
}

impl<C: FrameChecksum, I: IvChain> SecureChannel<C, I> {
    /// Creates a channel from a frame codec and a cipher ring. The codec is
    /// forced to block alignment.
    #[must_use]
    pub fn with_parts(codec: FrameCodec<C>, ring: CipherRing<I>) -> Self {
        let codec = codec.with_alignment(BLOCK_SIZE);
        let decoder = codec.decoder();
        Self {
            codec,
            decoder,
            ring,
        }
    }

    /// Overrides the frame size limit (default 32 KiB).
    #[must_use]
    pub fn with_max_frame_size(self, max_frame_size: usize) -> Self {
        let codec = self.codec.with_max_frame_size(max_frame_size);
        let decoder = codec.decoder();
        Self {
            codec,
            decoder,
            ring: self.ring,
        }
    }

    /// Tag codec used for this channel.
    #[must_use]
    pub fn tags(&self) -> &TagCodec {
        self.codec.tags()
    }

    /// Frames and encrypts values for transmission.
    ///
    /// # Errors
    /// `TagTooLarge` or `FrameTooLarge`; the cipher state is untouched then.
    pub fn seal(&mut self, values: &[TagValue]) -> Result<Vec<u8>> {
        let plain = self.codec.wrap(values)?;
        let sealed = self.ring.encrypt(&plain);
        trace!(values = values.len(), bytes = sealed.len(), "Sealed frame");
        Ok(sealed)
    }

    /// Decrypts received bytes and returns every frame they complete.
    ///
    /// # Errors
    /// `CryptoDesync` when decrypted bytes are not a valid frame,
    /// `FrameTooLarge` or `MalformedTag` otherwise.
    pub fn open(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        let plain = self.ring.decrypt(bytes);
        if plain.is_empty() {
            return Ok(Vec::new());
        }
        self.decoder.push(&plain).map_err(|e| match e {
            CoreError::BadMagic { .. }
            | CoreError::UnsupportedVersion { .. }
            | CoreError::IntegrityMismatch { .. }
            | CoreError::InvalidPadding => {
                debug!(error = %e, "Decrypted bytes are not a frame");
                CoreError::desync(e.to_string())
            }
            other => other,
        })
    }

    /// Ciphertext or plaintext bytes held back waiting for more input.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.ring.pending() + self.decoder.buffered()
    }
}
