//! Error types for the Ribbit client

use thiserror::Error;

/// Result type for Ribbit operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timed out after {timeout_secs}s to {host}:{port}")]
    ConnectionTimeout {
        host: String,
        port: u16,
        timeout_secs: u64,
    },

    #[error("No data at {path:?}")]
    NoData { path: String },

    /// The response did not end in CRLF, which means the connection was
    /// cut short.
    #[error("Unterminated data... try again")]
    Unterminated,

    #[error("MIME parsing failed")]
    MimeParse,

    #[error("Response carries no Checksum epilogue")]
    MissingChecksum,

    #[error("Integrity verification failed for {object}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        object: String,
        expected: String,
        actual: String,
    },
}
