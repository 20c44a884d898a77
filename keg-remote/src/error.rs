//! Error types for remote clients

use thiserror::Error;

/// Result type for remote operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Got status code {status} for {url}")]
    Network { status: u16, url: String },

    #[error("PSV parse error: {0}")]
    Psv(#[from] keg_psv::Error),

    #[error("Ribbit error: {0}")]
    Ribbit(#[from] keg_ribbit::Error),

    #[error("Invalid remote url: {0}")]
    InvalidRemote(String),

    #[error("Blobs are not available on this remote")]
    BlobsUnsupported,

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
