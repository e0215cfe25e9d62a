//! Sealed-box encryption of Actions secrets.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crypto_box::PublicKey;
use crypto_box::aead::OsRng;

use crate::source::{Result, SourceError};

/// Encrypts a secret value for a repository public key.
pub trait SecretSealer: Send + Sync {
    /// Seal `plaintext` for the base64 `public_key`; returns base64 ciphertext.
    fn seal(&self, public_key: &str, plaintext: &[u8]) -> Result<String>;
}

/// libsodium-compatible `crypto_box_seal`, as GitHub expects.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoBoxSealer;

impl SecretSealer for CryptoBoxSealer {
    fn seal(&self, public_key: &str, plaintext: &[u8]) -> Result<String> {
        let raw = STANDARD
            .decode(public_key.trim())
            .map_err(|e| SourceError::decode(format!("failed to decode repo public key: {e}")))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|raw: Vec<u8>| {
            SourceError::decode(format!("repo public key must be 32 bytes, got {}", raw.len()))
        })?;

        let sealed = PublicKey::from(bytes)
            .seal(&mut OsRng, plaintext)
            .map_err(|e| SourceError::decode(format!("failed to encrypt secret: {e}")))?;
        Ok(STANDARD.encode(sealed))
    }
}
