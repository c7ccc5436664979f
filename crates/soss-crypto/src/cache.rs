//! Single-entry cipher cache keyed by passphrase
//!
//! Deriving the AEAD state once per batch instead of once per file. The entry
//! is reused only when the requested passphrase is exactly the cached one;
//! any other passphrase replaces it.

use secrecy::SecretString;
use std::sync::Arc;

use crate::cipher::ContentCipher;

#[derive(Debug, Default)]
pub struct CipherCache {
    current: Option<Arc<ContentCipher>>,
}

impl CipherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cipher for `passphrase`, deriving it if the cached entry
    /// belongs to a different passphrase (or there is none).
    pub fn get(&mut self, passphrase: &SecretString) -> Arc<ContentCipher> {
        if let Some(cipher) = &self.current {
            if cipher.matches(passphrase) {
                return Arc::clone(cipher);
            }
            tracing::debug!("passphrase changed, rebuilding cipher");
        }

        let cipher = Arc::new(ContentCipher::new(passphrase));
        self.current = Some(Arc::clone(&cipher));
        cipher
    }

    /// Drop the cached cipher and its key material.
    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_passphrase_reuses_instance() {
        let mut cache = CipherCache::new();
        let a = cache.get(&SecretString::from("one"));
        let b = cache.get(&SecretString::from("one"));
        assert!(Arc::ptr_eq(&a, &b), "equal passphrases must share a cipher");
    }

    #[test]
    fn test_new_passphrase_replaces_entry() {
        let mut cache = CipherCache::new();
        let a = cache.get(&SecretString::from("one"));
        let b = cache.get(&SecretString::from("two"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(b.matches(&SecretString::from("two")));

        // "one" is no longer cached
        let c = cache.get(&SecretString::from("one"));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_cached_cipher_interoperates_with_fresh_one() {
        let mut cache = CipherCache::new();
        let passphrase = SecretString::from("shared");
        let blob = cache.get(&passphrase).encrypt(b"payload").unwrap();

        let fresh = ContentCipher::new(&passphrase);
        assert_eq!(fresh.decrypt(&blob).unwrap(), b"payload");
    }

    #[test]
    fn test_clear() {
        let mut cache = CipherCache::new();
        assert!(cache.is_empty());
        cache.get(&SecretString::from("x"));
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
