// ============================================
// File: crates/rscp-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Everything the device's symmetric encryption needs: key derivation, the
//! Rijndael-256 block cipher and the per-connection IV chaining.
//!
//! ### Submodules
//! - [`keys`]: `RscpKey` derivation from the passphrase
//! - [`rijndael`]: Rijndael with 256-bit key and block
//! - [`ring`]: `CipherRing` with per-direction chained IVs
//!
//! ## Cryptographic Design
//! ```text
//!  passphrase ──► pad 0xFF to 32 ──► RscpKey ──► Rijndael256
//!                                                    │
//!  plain frame ──► zero pad ──► CBC(send_iv) ──► ciphertext ──► socket
//!                                   ▲                │
//!                                   └── last block ──┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is the vendor's scheme: no authentication tag. Integrity comes
//!   from the frame CRC after decryption
//! - Key types implement Zeroize
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod keys;
pub mod rijndael;
pub mod ring;

pub use keys::RscpKey;
pub use rijndael::{Rijndael256, BLOCK_SIZE, KEY_SIZE};
pub use ring::{CipherRing, CiphertextChain, IvChain, INITIAL_IV};
