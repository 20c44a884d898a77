//! Error types for BLTE handling

use thiserror::Error;

/// Result type for BLTE operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid BLTE magic: {0:02x?}")]
    InvalidMagic([u8; 4]),

    #[error("Unsupported block table version: {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("Block table does not fit header size {0}")]
    InvalidBlockTable(u32),

    #[error("Integrity verification failed for {object}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        object: String,
        expected: String,
        actual: String,
    },

    #[error("Unknown block type: {0:#04x}")]
    UnknownBlockType(u8),

    /// The decoded-block stream was iterated a second time. The stream owns
    /// its reader and is single-shot; collect it on the first pass.
    #[error("Block stream has already been consumed")]
    StreamConsumed,

    #[error("Trailing bytes after final block")]
    TrailingBytes,

    #[error("espec syntax error at byte {pos}: {reason}")]
    SpecSyntax { pos: usize, reason: String },

    #[error("espec frame cannot drive the encoder: {0}")]
    UnsupportedEncodeFrame(&'static str),

    #[error("Input longer than the block table the espec describes")]
    InputExceedsSpec,
}

impl Error {
    pub(crate) fn checksum(object: &str, expected: &str, actual: &str) -> Self {
        Self::ChecksumMismatch {
            object: object.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Compare the MD5 of `data` against a lowercase hex digest.
pub(crate) fn verify_md5(object: &str, data: &[u8], expected: &str) -> Result<()> {
    let actual = format!("{:x}", md5::compute(data));
    if actual != expected {
        return Err(Error::checksum(object, expected, &actual));
    }
    Ok(())
}
