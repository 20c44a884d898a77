//! Error types for Armadillo key handling

use thiserror::Error;

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid Armadillo key size: {0} bytes")]
    InvalidKeySize(usize),

    #[error("Armadillo key digest mismatch: expected {expected}, got {actual}")]
    KeyDigestMismatch { expected: String, actual: String },

    #[error("Object key is not valid hex: {0}")]
    InvalidObjectKey(String),
}
