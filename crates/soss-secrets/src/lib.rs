//! soss-secrets: the local passphrase store
//!
//! A secret is a generated 64-character alphanumeric passphrase kept in a
//! single file (default `~/.soss/.secret`). It can stand in for the
//! `--encrypt_key` / `--decrypt_key` flags.

pub mod rotate;
pub mod secret;

pub use rotate::{atomic_replace, backup_path};
pub use secret::{default_secret_path, Secret, SecretError, PASSPHRASE_LEN};
