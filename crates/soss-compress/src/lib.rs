//! soss-compress: optional lossless compression applied beneath encryption
//!
//! Content is compressed strictly before it is encrypted on upload and
//! decompressed strictly after it is decrypted on download. Sealed payloads
//! are incompressible, so the order never flips.

pub mod codec;

pub use codec::{compress, decompress, CompressError, DEFAULT_LEVEL};
