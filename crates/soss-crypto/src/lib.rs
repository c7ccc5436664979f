//! soss-crypto: passphrase-keyed content encryption
//!
//! Blob format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: AES-256-GCM ciphertext][16 bytes: tag]
//! ```
//!
//! Key derivation is a single SHA-256 pass over the passphrase, with no salt
//! and no work factor. This matches archives written by earlier releases and
//! must stay as-is for them to remain readable. It is NOT a password-hardening
//! KDF: a low-entropy passphrase can be brute-forced offline. Use a generated
//! secret (`soss secret`) rather than a memorable passphrase.

pub mod cache;
pub mod cipher;
pub mod kdf;

pub use cache::CipherCache;
pub use cipher::{CipherError, ContentCipher};
pub use kdf::{derive_key, DerivedKey};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
