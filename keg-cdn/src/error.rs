//! Error types for the store and CDN client

use thiserror::Error;

/// Result type for CDN operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key to partition: {key:?}")]
    InvalidKey { key: String },

    #[error("Local object not found: {path}")]
    FileNotFound { path: String },

    #[error("Integrity verification failed for {object}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        object: String,
        expected: String,
        actual: String,
    },

    #[error("No Armadillo key named {name:?}")]
    ArmadilloKeyNotFound { name: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Got status code {status} for {url}")]
    Network { status: u16, url: String },

    #[error(transparent)]
    Formats(#[from] keg_formats::Error),

    #[error(transparent)]
    Blte(#[from] keg_blte::Error),

    #[error(transparent)]
    Crypto(#[from] keg_crypto::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
