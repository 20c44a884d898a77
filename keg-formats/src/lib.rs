//! # keg-formats
//!
//! Parsers for the metadata formats that describe an NGDP build:
//!
//! - build / CDN / patch configuration files (`key = value`)
//! - archive indexes and the merged archive group
//! - the encoding table (CKey ↔ EKey)
//! - install manifests with tag filtering
//! - patch entries
//!
//! All parsers work over in-memory buffers or [`std::io::Read`] and stay
//! independent of where the bytes came from; the store and network layers
//! live elsewhere.

pub mod archive;
pub mod config;
pub mod encoding;
pub mod error;
mod ioutils;
pub mod install;
pub mod patch;

pub use archive::{ArchiveGroup, ArchiveIndex, GroupEntry, IndexEntry};
pub use config::{BuildConfig, CdnConfig, KeyPair, PatchConfig, parse_config};
pub use encoding::{ContentEntry, EncodingTable};
pub use error::{Error, Result};
pub use install::{InstallEntry, InstallManifest, InstallTag};
pub use patch::{PatchEntry, PatchPair};

/// Compare the MD5 of `data` against a lowercase hex digest.
pub(crate) fn verify_data(object: &str, data: &[u8], expected: &str) -> Result<()> {
    let actual = format!("{:x}", md5::compute(data));
    if actual != expected {
        return Err(Error::ChecksumMismatch {
            object: object.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
