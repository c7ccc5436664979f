//! AES-256-GCM sealing of whole-file payloads
//!
//! Every call to [`ContentCipher::encrypt`] draws a fresh random nonce and
//! prepends it to the sealed payload. No associated data is bound.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::kdf::{derive_key, DerivedKey};
use crate::NONCE_SIZE;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Blob shorter than a nonce: it cannot have come from `encrypt`
    #[error("ciphertext too short: {len} bytes (minimum {min})")]
    MalformedCiphertext { len: usize, min: usize },

    /// Tag did not verify: wrong key, truncated data, or tampering
    #[error("authentication failed: wrong key or corrupted ciphertext")]
    AuthenticationFailure,

    #[error("encryption failed")]
    Encrypt,
}

/// A cipher bound to one passphrase. Immutable after construction, so one
/// instance can be shared across concurrent transfers.
pub struct ContentCipher {
    passphrase: SecretString,
    aead: Aes256Gcm,
}

impl ContentCipher {
    /// Derive the key for `passphrase` and prepare the AEAD state.
    pub fn new(passphrase: &SecretString) -> Self {
        let key = derive_key(passphrase);
        Self::with_key(passphrase, &key)
    }

    fn with_key(passphrase: &SecretString, key: &DerivedKey) -> Self {
        Self {
            passphrase: SecretString::from(passphrase.expose_secret().to_owned()),
            aead: Aes256Gcm::new(key.as_bytes().into()),
        }
    }

    /// True if this cipher was built from exactly `passphrase`.
    pub fn matches(&self, passphrase: &SecretString) -> bool {
        self.passphrase.expose_secret() == passphrase.expose_secret()
    }

    /// Seal `plaintext`.
    ///
    /// Returns: `[12-byte nonce][ciphertext][16-byte tag]`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .aead
            .encrypt(nonce, plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Open a blob produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CipherError> {
        if blob.len() < NONCE_SIZE {
            return Err(CipherError::MalformedCiphertext {
                len: blob.len(),
                min: NONCE_SIZE,
            });
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.aead
            .decrypt(nonce, ciphertext)
            .map_err(|_| CipherError::AuthenticationFailure)
    }
}

impl std::fmt::Debug for ContentCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCipher")
            .field("algorithm", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}
