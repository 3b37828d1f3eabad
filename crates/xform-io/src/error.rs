//! Error types for file I/O.

use std::io;
use thiserror::Error;

/// File I/O error.
#[derive(Debug, Error)]
pub enum IoError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("encode error: {0}")]
    EncodeError(String),

    /// Bit depth or color type with no 8-bit RGB(A) mapping.
    #[error("unsupported pixel layout: {0}")]
    UnsupportedLayout(String),

    /// Compression levels run from 0 (none) to 9 (best).
    #[error("invalid compression level {0}, expected 0-9")]
    InvalidCompression(u8),
}

/// Result type for I/O operations.
pub type IoResult<T> = Result<T, IoError>;
