//! Build manager: convenience reads over a mirrored build

use std::io::Cursor;
use tracing::debug;

use keg_cdn::LocalCdn;
use keg_formats::{ArchiveGroup, BuildConfig, CdnConfig, EncodingTable, InstallManifest};

use crate::{Error, Result};

/// Typed access to one `(build config, cdn config)` pair in the local
/// store. Everything is resolved lazily from disk; nothing is fetched.
pub struct BuildManager<'a> {
    local_cdn: &'a LocalCdn,
    build_config_key: String,
    cdn_config_key: String,
    pub build_config: BuildConfig,
    pub cdn_config: CdnConfig,
    verify: bool,
}

impl<'a> BuildManager<'a> {
    pub fn new(
        local_cdn: &'a LocalCdn,
        build_config_key: &str,
        cdn_config_key: &str,
        verify: bool,
    ) -> Result<Self> {
        Ok(Self {
            build_config: local_cdn.get_build_config(build_config_key, verify)?,
            cdn_config: local_cdn.get_cdn_config(cdn_config_key, verify)?,
            local_cdn,
            build_config_key: build_config_key.to_string(),
            cdn_config_key: cdn_config_key.to_string(),
            verify,
        })
    }

    pub fn build_config_key(&self) -> &str {
        &self.build_config_key
    }

    pub fn cdn_config_key(&self) -> &str {
        &self.cdn_config_key
    }

    /// The build's encoding table, if the build declares one.
    pub fn get_encoding(&self) -> Result<Option<EncodingTable>> {
        let pair = &self.build_config.encoding;
        if pair.encoding_key.is_empty() {
            return Ok(None);
        }

        let data = self
            .local_cdn
            .download_blte_data(&pair.encoding_key, self.verify)?;
        Ok(Some(EncodingTable::parse(
            &data,
            &pair.content_key,
            self.verify,
        )?))
    }

    /// The install manifest. The install role is routinely published with
    /// only its content key; the encoding key is then resolved through the
    /// encoding table.
    pub fn get_install(&self) -> Result<Option<InstallManifest>> {
        let pair = &self.build_config.install;
        if pair.content_key.is_empty() {
            return Ok(None);
        }

        let ekey = if pair.encoding_key.is_empty() {
            match self.resolve_encoding_key(&pair.content_key)? {
                Some(ekey) => ekey,
                None => return Ok(None),
            }
        } else {
            pair.encoding_key.clone()
        };

        let data = self.decode_object(&ekey)?;
        Ok(Some(InstallManifest::parse(
            &data,
            &pair.content_key,
            self.verify,
        )?))
    }

    /// The merged archive group over the CDN config's archives.
    pub fn get_archive_group(&self) -> Result<ArchiveGroup> {
        let mut indices = Vec::with_capacity(self.cdn_config.archives.len());
        for archive_key in &self.cdn_config.archives {
            indices.push(self.local_cdn.get_data_index(archive_key, self.verify)?);
        }
        Ok(ArchiveGroup::build(
            self.cdn_config.archives.clone(),
            &self.cdn_config.archive_group,
            &indices,
        ))
    }

    /// Decode the build's root file.
    pub fn get_root(&self) -> Result<Option<Vec<u8>>> {
        let root_ckey = self.build_config.root.clone();
        if root_ckey.is_empty() {
            return Ok(None);
        }
        match self.resolve_encoding_key(&root_ckey)? {
            Some(ekey) => self.decode_object(&ekey).map(Some),
            None => Ok(None),
        }
    }

    /// Map a content key through the encoding table.
    fn resolve_encoding_key(&self, content_key: &str) -> Result<Option<String>> {
        let Some(mut encoding) = self.get_encoding()? else {
            return Ok(None);
        };
        encoding
            .find_by_content_key(content_key)
            .map(str::to_string)
            .ok_or_else(|| Error::EncodingEntryNotFound {
                key: content_key.to_string(),
            })
            .map(Some)
    }

    /// Decode an encoded object: the loose-file space first, then whichever
    /// archive the group says holds it.
    fn decode_object(&self, ekey: &str) -> Result<Vec<u8>> {
        if self.local_cdn.has_data(ekey)? {
            return Ok(self.local_cdn.download_blte_data(ekey, self.verify)?);
        }

        let group = self.get_archive_group()?;
        if let Some(entry) = group.find(ekey) {
            debug!("extracting {ekey} from archive {}", group.archive_key(entry));
            let encoded = self.local_cdn.read_archive_range(
                group.archive_key(entry),
                entry.offset,
                entry.size,
            )?;
            return Ok(keg_blte::decode_all(
                Cursor::new(encoded),
                ekey,
                self.verify,
            )?);
        }

        Err(keg_cdn::Error::FileNotFound {
            path: format!("data object {ekey}"),
        }
        .into())
    }
}
