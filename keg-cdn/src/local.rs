//! The local content-addressed object store

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use keg_crypto::ArmadilloKey;
use keg_formats::{ArchiveIndex, BuildConfig, CdnConfig, PatchConfig};

use crate::paths;
use crate::util::{TEMP_SUFFIX, atomic_write, verify_data};
use crate::{Error, Result};

/// The object store rooted at `$ngdp/objects/`, plus its side areas:
/// the encrypted quarantine, the Armadillo key directory, and temp staging.
#[derive(Debug, Clone)]
pub struct LocalCdn {
    objects_dir: PathBuf,
    fragments_dir: PathBuf,
    armadillo_dir: PathBuf,
    temp_dir: PathBuf,
}

impl LocalCdn {
    pub fn new(
        objects_dir: impl Into<PathBuf>,
        fragments_dir: impl Into<PathBuf>,
        armadillo_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            objects_dir: objects_dir.into(),
            fragments_dir: fragments_dir.into(),
            armadillo_dir: armadillo_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Absolute path of an object-relative path.
    pub fn full_path(&self, rel: &str) -> PathBuf {
        self.objects_dir.join(rel)
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.full_path(rel).exists()
    }

    pub fn has_config(&self, key: &str) -> Result<bool> {
        Ok(self.exists(&paths::config_path(key)?))
    }

    pub fn has_data(&self, key: &str) -> Result<bool> {
        Ok(self.exists(&paths::data_path(key)?))
    }

    pub fn has_index(&self, key: &str) -> Result<bool> {
        Ok(self.exists(&paths::data_index_path(key)?))
    }

    pub fn has_patch(&self, key: &str) -> Result<bool> {
        Ok(self.exists(&paths::patch_path(key)?))
    }

    pub fn has_patch_index(&self, key: &str) -> Result<bool> {
        Ok(self.exists(&paths::patch_index_path(key)?))
    }

    pub fn has_config_item(&self, key: &str) -> Result<bool> {
        Ok(self.exists(&paths::config_item_path(key)?))
    }

    /// Open an object for reading.
    pub fn get_item(&self, rel: &str) -> Result<File> {
        let path = self.full_path(rel);
        File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                e.into()
            }
        })
    }

    /// Read an object fully into memory.
    pub fn read_item(&self, rel: &str) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.get_item(rel)?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Publish an object atomically.
    pub fn save_item(&self, rel: &str, data: &[u8]) -> Result<()> {
        trace!("saving {} bytes to {rel}", data.len());
        atomic_write(&self.full_path(rel), data)
    }

    // -- temp staging ----------------------------------------------------

    /// Create an empty staging file and return its path.
    pub fn create_temp_file(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.temp_dir)?;
        let (_, path) = tempfile::Builder::new()
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.temp_dir)?
            .keep()
            .map_err(|e| Error::Io(e.error))?;
        Ok(path)
    }

    /// Write `data` to a fresh staging file.
    pub fn write_temp_file(&self, data: &[u8]) -> Result<PathBuf> {
        let path = self.create_temp_file()?;
        let mut f = File::create(&path)?;
        f.write_all(data)?;
        Ok(path)
    }

    /// Move a verified staging file into its final object path.
    pub fn promote_temp_file(&self, temp: &Path, rel: &str) -> Result<()> {
        let target = self.full_path(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("promoting {} -> {rel}", temp.display());
        fs::rename(temp, target)?;
        Ok(())
    }

    /// Discard a staging file after a failed verification.
    pub fn discard_temp_file(&self, temp: &Path) {
        let _ = fs::remove_file(temp);
    }

    // -- encrypted quarantine --------------------------------------------

    /// True if the quarantine holds this object already.
    pub fn has_fragment(&self, rel: &str) -> bool {
        self.fragments_dir.join(rel).exists()
    }

    /// Quarantine an object delivered encrypted, pending its key.
    pub fn write_fragment(&self, rel: &str, data: &[u8]) -> Result<()> {
        debug!("quarantining {rel} ({} bytes)", data.len());
        atomic_write(&self.fragments_dir.join(rel), data)
    }

    pub fn read_fragment(&self, rel: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.fragments_dir.join(rel))?)
    }

    // -- armadillo keys --------------------------------------------------

    /// Load and verify an Armadillo key by name.
    pub fn get_decryption_key(&self, name: &str) -> Result<ArmadilloKey> {
        let path = self.armadillo_dir.join(name);
        let data = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ArmadilloKeyNotFound {
                    name: name.to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        Ok(ArmadilloKey::from_bytes(&data)?)
    }

    // -- typed getters ---------------------------------------------------

    fn read_config(&self, key: &str, verify: bool) -> Result<Vec<u8>> {
        let data = self.read_item(&paths::config_path(key)?)?;
        if verify {
            verify_data("config file", &data, key)?;
        }
        Ok(data)
    }

    pub fn get_build_config(&self, key: &str, verify: bool) -> Result<BuildConfig> {
        Ok(BuildConfig::from_bytes(&self.read_config(key, verify)?)?)
    }

    pub fn get_cdn_config(&self, key: &str, verify: bool) -> Result<CdnConfig> {
        Ok(CdnConfig::from_bytes(&self.read_config(key, verify)?)?)
    }

    pub fn get_patch_config(&self, key: &str, verify: bool) -> Result<PatchConfig> {
        Ok(PatchConfig::from_bytes(&self.read_config(key, verify)?)?)
    }

    /// A product-config item, which is JSON in its own address space.
    pub fn get_product_config(&self, key: &str) -> Result<serde_json::Value> {
        let data = self.read_item(&paths::config_item_path(key)?)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn save_config_item(&self, key: &str, data: &[u8]) -> Result<()> {
        self.save_item(&paths::config_item_path(key)?, data)
    }

    /// Open a loose data object or archive.
    pub fn download_data(&self, key: &str) -> Result<File> {
        self.get_item(&paths::data_path(key)?)
    }

    /// Decode a loose BLTE object fully.
    pub fn download_blte_data(&self, key: &str, verify: bool) -> Result<Vec<u8>> {
        let f = self.download_data(key)?;
        Ok(keg_blte::decode_all(f, key, verify)?)
    }

    /// Parse an archive index from the store.
    pub fn get_data_index(&self, key: &str, verify: bool) -> Result<ArchiveIndex> {
        let data = self.read_item(&paths::data_index_path(key)?)?;
        Ok(ArchiveIndex::parse(data, key, verify)?)
    }

    /// Read `size` bytes at `offset` from an archive.
    pub fn read_archive_range(&self, archive_key: &str, offset: u32, size: u32) -> Result<Vec<u8>> {
        let mut f = self.download_data(archive_key)?;
        f.seek(SeekFrom::Start(u64::from(offset)))?;
        let mut data = vec![0u8; size as usize];
        f.read_exact(&mut data)?;
        Ok(data)
    }
}
