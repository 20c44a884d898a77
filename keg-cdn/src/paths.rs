//! Relative path builders for the object spaces
//!
//! These shapes are shared verbatim by the local store and the remote
//! origins, which is what makes mirroring bit-identical.

use crate::util::partition_hash;
use crate::Result;

/// `config/<part>`: build/cdn/patch configs and other config blobs.
pub fn config_path(key: &str) -> Result<String> {
    Ok(format!("config/{}", partition_hash(key)?))
}

/// `data/<part>`: archives and loose BLTE data.
pub fn data_path(key: &str) -> Result<String> {
    Ok(format!("data/{}", partition_hash(key)?))
}

/// `data/<part>.index`: archive indexes.
pub fn data_index_path(key: &str) -> Result<String> {
    Ok(format!("data/{}.index", partition_hash(key)?))
}

/// `patch/<part>`: patch archives and patch blobs.
pub fn patch_path(key: &str) -> Result<String> {
    Ok(format!("patch/{}", partition_hash(key)?))
}

/// `patch/<part>.index`: patch archive indexes.
pub fn patch_index_path(key: &str) -> Result<String> {
    Ok(format!("patch/{}.index", partition_hash(key)?))
}

/// `configs/data/<part>`: product-config items, a separately-addressed
/// space rooted at the CDN's config path.
pub fn config_item_path(key: &str) -> Result<String> {
    Ok(format!("configs/data/{}", partition_hash(key)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes() {
        let key = "0017a402f556fbea2e14e58a0d4bf8b7";
        assert_eq!(
            config_path(key).unwrap(),
            "config/00/17/0017a402f556fbea2e14e58a0d4bf8b7"
        );
        assert_eq!(
            data_index_path(key).unwrap(),
            "data/00/17/0017a402f556fbea2e14e58a0d4bf8b7.index"
        );
        assert_eq!(
            patch_path(key).unwrap(),
            "patch/00/17/0017a402f556fbea2e14e58a0d4bf8b7"
        );
        assert_eq!(
            config_item_path(key).unwrap(),
            "configs/data/00/17/0017a402f556fbea2e14e58a0d4bf8b7"
        );
    }

    #[test]
    fn test_invalid_key() {
        assert!(config_path("ab").is_err());
    }
}
