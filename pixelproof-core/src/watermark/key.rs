//! Watermark secret handling.

use sha3::{Digest, Sha3_256};
use zeroize::Zeroizing;

/// Opaque watermark secret.
///
/// An empty key is valid and behaves like any other fixed secret. The raw
/// bytes are wiped on drop and never printed; only [`WatermarkKey::digest_hex`]
/// may be stored or logged.
#[derive(Clone)]
pub struct WatermarkKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl WatermarkKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes.into()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA3-256 digest of the key.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        hasher.update(self.bytes.as_slice());
        let result = hasher.finalize();

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        digest
    }

    /// Hex-encoded digest, the only persisted form of the key.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }

    /// Seed for the watermark grid generator.
    pub fn seed(&self) -> u32 {
        derive_seed(&self.bytes)
    }
}

impl From<&str> for WatermarkKey {
    fn from(key: &str) -> Self {
        Self::new(key.as_bytes())
    }
}

impl From<&[u8]> for WatermarkKey {
    fn from(key: &[u8]) -> Self {
        Self::new(key)
    }
}

impl std::fmt::Debug for WatermarkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkKey")
            .field("bytes", &"[REDACTED]")
            .field("digest", &self.digest_hex())
            .finish()
    }
}

/// Derive the 32-bit grid seed from a key of any length.
///
/// The key is digested with SHA3-256 and the first four digest bytes are read
/// big-endian. No other digest bytes participate.
pub fn derive_seed(key: &[u8]) -> u32 {
    let digest = Sha3_256::digest(key);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_deterministic() {
        assert_eq!(derive_seed(b"secret"), derive_seed(b"secret"));
        assert_ne!(derive_seed(b"secret"), derive_seed(b"secret2"));
    }

    #[test]
    fn test_seed_uses_first_four_digest_bytes() {
        let key = WatermarkKey::from("photographer-key");
        let digest = key.digest();
        let expected = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        assert_eq!(key.seed(), expected);
    }

    #[test]
    fn test_empty_key_is_a_fixed_secret() {
        let empty = WatermarkKey::new(Vec::new());
        // SHA3-256("") = a7ffc6f8bf1ed766...
        assert_eq!(empty.seed(), 0xa7ff_c6f8);
        assert_eq!(empty.seed(), derive_seed(b""));
    }

    #[test]
    fn test_long_key() {
        let long = vec![0x5Au8; 4096];
        let _ = derive_seed(&long);
        assert_eq!(derive_seed(&long), WatermarkKey::new(long.clone()).seed());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key = WatermarkKey::from("hunter2");
        let debug = format!("{:?}", key);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_digest_hex_length() {
        assert_eq!(WatermarkKey::from("k").digest_hex().len(), 64);
    }
}
