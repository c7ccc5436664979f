//! Whole-payload zstd compression
//!
//! A payload compresses to a single zstd frame. The empty payload is special:
//! it maps to the empty byte string in both directions, so an empty file
//! stays empty on the wire beneath its seal.

use thiserror::Error;

/// Default zstd level: fast, with a good ratio on text
pub const DEFAULT_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("invalid zstd level {0}")]
    InvalidLevel(i32),

    #[error("zstd compress failed: {0}")]
    Compress(#[source] std::io::Error),

    #[error("zstd decompress failed: {0}")]
    Decompress(#[source] std::io::Error),
}

/// Compress `data` at `level`.
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>, CompressError> {
    if !zstd::compression_level_range().contains(&level) {
        return Err(CompressError::InvalidLevel(level));
    }
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let out = zstd::encode_all(data, level).map_err(CompressError::Compress)?;
    tracing::trace!(input = data.len(), output = out.len(), level, "compressed");
    Ok(out)
}

/// Exact inverse of [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    zstd::decode_all(data).map_err(CompressError::Decompress)
}
