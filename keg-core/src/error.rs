//! Error types for the repository core

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Psv(#[from] keg_psv::Error),

    #[error(transparent)]
    Blte(#[from] keg_blte::Error),

    #[error(transparent)]
    Formats(#[from] keg_formats::Error),

    #[error(transparent)]
    Crypto(#[from] keg_crypto::Error),

    #[error(transparent)]
    Ribbit(#[from] keg_ribbit::Error),

    #[error(transparent)]
    Remote(#[from] keg_remote::Error),

    #[error(transparent)]
    Cdn(#[from] keg_cdn::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid keg.conf: {reason}")]
    InvalidConfig { reason: String },

    #[error("No PSV table for path {path:?}")]
    UnknownPsvTable { path: String },

    #[error("PSV column {name:?} cannot name a database column")]
    InvalidColumnName { name: String },

    #[error("Version not found: {version}")]
    VersionNotFound { version: String },

    #[error("Version {version:?} is ambiguous; candidates: {hints:?}")]
    AmbiguousVersion {
        version: String,
        hints: Vec<String>,
    },

    #[error("Encoding table has no entry for content key {key}")]
    EncodingEntryNotFound { key: String },

    #[error("No keg repository at {path}")]
    RepositoryNotFound { path: String },
}
