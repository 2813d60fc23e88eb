//! Authenticated encryption for journal record payloads.
//!
//! Records are sealed with AES-256-GCM under a 32-byte key. Every seal draws
//! a fresh random 96-bit nonce and prepends it to the ciphertext, so the
//! on-disk payload is self-contained: `nonce || ciphertext || tag`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use thiserror::Error;

/// AES-256 key size in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce size in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag size in bytes.
pub const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeySize(usize),
    #[error("ciphertext too short: {got} bytes, need at least {min}")]
    CiphertextTooShort { got: usize, min: usize },
    #[error("ciphertext authentication failed")]
    AuthFail,
    #[error("encryption failure")]
    Encrypt,
}

/// Seals and opens individual record payloads.
pub struct RecordCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for RecordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCipher").finish_non_exhaustive()
    }
}

impl RecordCipher {
    /// Build a cipher from raw key bytes. The key must be exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeySize(key.len()));
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeySize(key.len()))?;
        Ok(Self { cipher })
    }

    /// Encrypt a plaintext under a fresh random nonce.
    ///
    /// Returns `nonce || ciphertext || tag`. Callers never supply the nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = generate_nonce();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Encrypt)?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a `nonce || ciphertext || tag` payload.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let min = NONCE_LEN + TAG_LEN;
        if sealed.len() < min {
            return Err(CryptoError::CiphertextTooShort {
                got: sealed.len(),
                min,
            });
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthFail)
    }
}

/// Generates a cryptographically secure random nonce.
fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut rng = StdRng::from_entropy();
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);
    nonce
}
