//! Configuration file parsing
//!
//! Build, CDN and patch configs share one line format:
//!
//! ```text
//! # Build Configuration
//!
//! root = 4d76ee57c0ad91b74fda2286060b4d1f
//! encoding = 16f5c65b940fffcb94d175188b6751d2 0839b3317e50fc5f8da4c6a30a2d1162
//! ```
//!
//! Keys may repeat; repeated values are concatenated with newlines, which is
//! how multi-line fields like `patch-entry` are expressed.

use std::collections::HashMap;

use crate::patch::PatchEntry;
use crate::{Error, Result};

/// Parse a config file into a key → value map.
pub fn parse_config(text: &str) -> HashMap<String, String> {
    let mut items: HashMap<String, String> = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (line, ""),
        };

        items
            .entry(key.to_string())
            .and_modify(|existing| {
                existing.push('\n');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    items
}

/// A `content-key [encoding-key]` pair as it appears in build configs.
///
/// Roles are routinely published with only the content key; the encoding key
/// is then resolved through the encoding table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPair {
    pub content_key: String,
    pub encoding_key: String,
}

impl KeyPair {
    fn from_value(value: &str) -> Self {
        let mut parts = value.split_whitespace();
        Self {
            content_key: parts.next().unwrap_or_default().to_string(),
            encoding_key: parts.next().unwrap_or_default().to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content_key.is_empty()
    }
}

fn decode_utf8(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|_| Error::InvalidUtf8)
}

/// Build configuration: role → key pair plus build identity fields.
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    pub root: String,
    pub install: KeyPair,
    pub download: KeyPair,
    pub encoding: KeyPair,
    pub size: KeyPair,
    pub patch: String,
    pub patch_config: String,
    pub build_name: String,
    pub build_product: String,
    pub build_uid: String,
    pub build_signature_file: String,
    values: HashMap<String, String>,
}

impl BuildConfig {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let values = parse_config(decode_utf8(data)?);
        let get = |k: &str| values.get(k).cloned().unwrap_or_default();

        Ok(Self {
            root: get("root"),
            install: KeyPair::from_value(&get("install")),
            download: KeyPair::from_value(&get("download")),
            encoding: KeyPair::from_value(&get("encoding")),
            size: KeyPair::from_value(&get("size")),
            patch: get("patch"),
            patch_config: get("patch-config"),
            build_name: get("build-name"),
            build_product: get("build-product"),
            build_uid: get("build-uid"),
            build_signature_file: get("build-signature-file"),
            values,
        })
    }

    /// Raw access to any config key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// CDN configuration: the archive lists and their group keys.
#[derive(Debug, Clone, Default)]
pub struct CdnConfig {
    pub archives: Vec<String>,
    pub archive_group: String,
    pub patch_archives: Vec<String>,
    pub patch_archive_group: String,
    pub file_index: String,
    pub patch_file_index: String,
    values: HashMap<String, String>,
}

impl CdnConfig {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let values = parse_config(decode_utf8(data)?);
        let get = |k: &str| values.get(k).cloned().unwrap_or_default();
        let get_list = |k: &str| {
            values
                .get(k)
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default()
        };

        Ok(Self {
            archives: get_list("archives"),
            archive_group: get("archive-group"),
            patch_archives: get_list("patch-archives"),
            patch_archive_group: get("patch-archive-group"),
            file_index: get("file-index"),
            patch_file_index: get("patch-file-index"),
            values,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Patch configuration: the patch manifest key and its delta entries.
#[derive(Debug, Clone, Default)]
pub struct PatchConfig {
    pub patch: String,
    pub patch_size: u64,
    pub patch_entries: Vec<PatchEntry>,
    values: HashMap<String, String>,
}

impl PatchConfig {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let values = parse_config(decode_utf8(data)?);
        let get = |k: &str| values.get(k).cloned().unwrap_or_default();

        let patch_entries = values
            .get("patch-entry")
            .map(|lines| lines.lines().map(PatchEntry::parse).collect())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            patch: get("patch"),
            patch_size: get("patch-size").parse().unwrap_or(0),
            patch_entries,
            values,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}
