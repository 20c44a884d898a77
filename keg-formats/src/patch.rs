//! Patch entries
//!
//! One line per entry in the patch config, whitespace-delimited:
//!
//! ```text
//! type ckey csize ekey esize espec [old_ekey old_size patch_ekey patch_size]...
//! ```

use crate::{Error, Result};

/// One delta step: old encoded file → patch blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPair {
    pub old_key: String,
    pub old_size: u64,
    pub patch_key: String,
    pub patch_size: u64,
}

/// One patch entry from a patch config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEntry {
    pub entry_type: String,
    pub content_key: String,
    pub content_size: u64,
    pub encoding_key: String,
    pub encoded_size: u64,
    pub espec: String,
    pub pairs: Vec<PatchPair>,
}

impl PatchEntry {
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();

        let mut next = |what: &str| {
            tokens.next().ok_or_else(|| Error::InvalidPatchEntry {
                reason: format!("missing {what}"),
            })
        };
        let parse_size = |value: &str, what: &str| {
            value.parse::<u64>().map_err(|_| Error::InvalidPatchEntry {
                reason: format!("bad {what}: {value}"),
            })
        };

        let entry_type = next("type")?.to_string();
        let content_key = next("content key")?.to_string();
        let content_size = parse_size(next("content size")?, "content size")?;
        let encoding_key = next("encoding key")?.to_string();
        let encoded_size = parse_size(next("encoded size")?, "encoded size")?;
        let espec = next("espec")?.to_string();

        let rest: Vec<&str> = tokens.collect();
        if rest.len() % 4 != 0 {
            return Err(Error::InvalidPatchEntry {
                reason: format!("trailing pair tokens: {}", rest.len()),
            });
        }

        let mut pairs = Vec::with_capacity(rest.len() / 4);
        for chunk in rest.chunks_exact(4) {
            pairs.push(PatchPair {
                old_key: chunk[0].to_string(),
                old_size: parse_size(chunk[1], "old size")?,
                patch_key: chunk[2].to_string(),
                patch_size: parse_size(chunk[3], "patch size")?,
            });
        }

        Ok(Self {
            entry_type,
            content_key,
            content_size,
            encoding_key,
            encoded_size,
            espec,
            pairs,
        })
    }
}
