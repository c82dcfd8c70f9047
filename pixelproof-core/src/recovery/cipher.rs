//! Sealing of captured tile payloads.
//!
//! Sealed payload format:
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! AAD = detection_id (16 bytes) || block_index (4 bytes, big-endian)
//! ```
//!
//! The AAD binds each payload to its tile and detection, so payloads cannot
//! be swapped between tiles or between detections.

use argon2::Argon2;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{PixelProofError, Result};

/// Sealing key size in bytes.
pub const KEY_SIZE: usize = 32;

/// XChaCha20 nonce size in bytes.
pub const NONCE_SIZE: usize = 24;

const TAG_SIZE: usize = 16;

/// Minimum salt length accepted by [`SealingKey::derive`].
pub const MIN_SALT_SIZE: usize = 8;

/// Symmetric key used to seal tile payloads. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealingKey {
    bytes: [u8; KEY_SIZE],
}

impl SealingKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Derive a key from a passphrase with Argon2id (default parameters).
    ///
    /// The salt is not secret but must be stored alongside the sealed data;
    /// at least [`MIN_SALT_SIZE`] bytes.
    pub fn derive(passphrase: &[u8], salt: &[u8]) -> Result<Self> {
        if salt.len() < MIN_SALT_SIZE {
            return Err(PixelProofError::invalid(format!(
                "salt must be at least {MIN_SALT_SIZE} bytes, got {}",
                salt.len()
            )));
        }
        let mut bytes = [0u8; KEY_SIZE];
        Argon2::default()
            .hash_password_into(passphrase, salt, &mut bytes)
            .map_err(|e| PixelProofError::Crypto(format!("key derivation failed: {e}")))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealingKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Capability that seals and opens tile payloads.
///
/// Key management belongs to the implementation; the recovery store only
/// ever handles opaque sealed bytes.
pub trait TileCipher: Send + Sync {
    fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Fails with [`PixelProofError::Crypto`] when authentication fails.
    fn open(&self, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>>;
}

/// Associated data binding a payload to `(detection_id, block_index)`.
pub fn tile_aad(detection_id: Uuid, block_index: u32) -> [u8; 20] {
    let mut aad = [0u8; 20];
    aad[..16].copy_from_slice(detection_id.as_bytes());
    aad[16..].copy_from_slice(&block_index.to_be_bytes());
    aad
}

/// XChaCha20-Poly1305 with a random nonce per payload.
pub struct XChaChaTileCipher {
    key: SealingKey,
}

impl XChaChaTileCipher {
    pub fn new(key: SealingKey) -> Self {
        Self { key }
    }
}

impl std::fmt::Debug for XChaChaTileCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XChaChaTileCipher")
            .field("key", &self.key)
            .finish()
    }
}

impl TileCipher for XChaChaTileCipher {
    fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(self.key.as_bytes().into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| PixelProofError::Crypto(format!("tile sealing failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(PixelProofError::Crypto(format!(
                "sealed payload too short: {} bytes (minimum {})",
                sealed.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);
        let cipher = XChaCha20Poly1305::new(self.key.as_bytes().into());

        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| {
                PixelProofError::Crypto(
                    "tile authentication failed: wrong key or corrupted payload".into(),
                )
            })
    }
}
