//! Hash partitioning and atomic file writes

use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// Suffix for staged writes; orphans with it are safe to remove.
pub const TEMP_SUFFIX: &str = ".keg_temp";

/// Partition a key into its on-disk shape: `ab/cd/abcd…`.
pub fn partition_hash(key: &str) -> Result<String> {
    if key.len() < 4 {
        return Err(Error::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(format!("{}/{}/{}", &key[0..2], &key[2..4], key))
}

/// Write `data` to `path` via a temp file and rename.
///
/// The rename is the only point at which a reader may observe the file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(TEMP_SUFFIX);
    fs::write(&temp, data)?;
    fs::rename(&temp, path)?;
    Ok(())
}

/// Compare the MD5 of `data` against a lowercase hex digest.
pub fn verify_data(object: &str, data: &[u8], expected: &str) -> Result<()> {
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
