//! Error types for format parsing

use thiserror::Error;

/// Result type for format parsers
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File has incorrect magic: {0:02x?}")]
    BadMagic(Vec<u8>),

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),

    #[error("File is not valid UTF-8")]
    InvalidUtf8,

    #[error("Integrity verification failed for {object}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        object: String,
        expected: String,
        actual: String,
    },

    #[error("Archive index too small: {0} bytes")]
    TruncatedIndex(usize),

    #[error("Archive index layout not supported: key={key_size} size={size_size} offset={offset_size}")]
    UnsupportedIndexLayout {
        key_size: u8,
        size_size: u8,
        offset_size: u8,
    },

    #[error("Encoding table truncated at {region}")]
    TruncatedEncoding { region: &'static str },

    #[error("Install manifest tag not found: {tag}")]
    TagNotFound { tag: String },

    #[error("Invalid patch entry: {reason}")]
    InvalidPatchEntry { reason: String },
}
