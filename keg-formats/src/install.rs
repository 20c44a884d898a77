//! Install manifest parsing
//!
//! The install manifest lists OS-visible file paths with their content keys,
//! plus tag bitfields (platform, locale, product) addressing entries.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::ioutils::read_cstr;
use crate::{Error, Result, verify_data};

const INSTALL_MAGIC: [u8; 2] = *b"IN";

/// A tag with its entry bitfield. Bit `i` (most significant bit first)
/// addresses entry `i`.
#[derive(Debug, Clone)]
pub struct InstallTag {
    pub name: String,
    pub tag_type: u16,
    bitfield: Vec<u8>,
}

impl InstallTag {
    /// True if this tag covers entry `index`.
    pub fn contains(&self, index: usize) -> bool {
        self.bitfield
            .get(index / 8)
            .is_some_and(|byte| byte & (0x80 >> (index % 8)) != 0)
    }
}

/// One installable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    pub filename: String,
    pub key: String,
    pub size: u32,
}

/// A parsed install manifest.
#[derive(Debug, Clone)]
pub struct InstallManifest {
    pub version: u8,
    pub hash_size: u8,
    tags: Vec<InstallTag>,
    entries: Vec<InstallEntry>,
}

impl InstallManifest {
    /// Parse a decoded install file. With `verify`, MD5 of the decoded
    /// bytes must equal the manifest's content key.
    pub fn parse(data: &[u8], content_key: &str, verify: bool) -> Result<Self> {
        if verify {
            verify_data("install file", data, content_key)?;
        }

        let mut f = Cursor::new(data);

        let mut magic = [0u8; 2];
        f.read_exact(&mut magic)?;
        if magic != INSTALL_MAGIC {
            return Err(Error::BadMagic(magic.to_vec()));
        }

        let version = f.read_u8()?;
        let hash_size = f.read_u8()?;
        let tag_count = f.read_u16::<BigEndian>()?;
        let entry_count = f.read_u32::<BigEndian>()?;
        let bitfield_len = (entry_count as usize).div_ceil(8);

        let mut tags = Vec::with_capacity(usize::from(tag_count));
        for _ in 0..tag_count {
            let name = read_cstr(&mut f)?;
            let tag_type = f.read_u16::<BigEndian>()?;
            let mut bitfield = vec![0u8; bitfield_len];
            f.read_exact(&mut bitfield)?;
            tags.push(InstallTag {
                name,
                tag_type,
                bitfield,
            });
        }

        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let filename = read_cstr(&mut f)?;
            let mut key = vec![0u8; usize::from(hash_size)];
            f.read_exact(&mut key)?;
            let size = f.read_u32::<BigEndian>()?;
            entries.push(InstallEntry {
                filename,
                key: hex::encode(key),
                size,
            });
        }

        Ok(Self {
            version,
            hash_size,
            tags,
            entries,
        })
    }

    pub fn tags(&self) -> &[InstallTag] {
        &self.tags
    }

    pub fn tag(&self, name: &str) -> Option<&InstallTag> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn entries(&self) -> &[InstallEntry] {
        &self.entries
    }

    /// Entries covered by every named tag. An unknown tag name fails.
    pub fn filter_entries(&self, tag_names: &[&str]) -> Result<Vec<&InstallEntry>> {
        let mut mask = vec![0xffu8; self.entries.len().div_ceil(8)];

        for name in tag_names {
            let tag = self.tag(name).ok_or_else(|| Error::TagNotFound {
                tag: (*name).to_string(),
            })?;
            for (m, b) in mask.iter_mut().zip(&tag.bitfield) {
                *m &= b;
            }
        }

        Ok(self
            .entries
            .iter()
            .enumerate()
            .filter(|(i, _)| mask.get(i / 8).is_some_and(|byte| byte & (0x80 >> (i % 8)) != 0))
            .map(|(_, e)| e)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a manifest: 3 tags over 10 entries.
    fn build_manifest() -> Vec<u8> {
        let entry_count = 10u32;
        let mut data = Vec::new();
        data.extend_from_slice(b"IN");
        data.push(1); // version
        data.push(16); // hash size
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&entry_count.to_be_bytes());

        // Windows: entries 0-4; OSX: entries 5-9; enUS: all.
        for (name, bits) in [
            ("Windows", [0b1111_1000u8, 0b0000_0000]),
            ("OSX", [0b0000_0111, 0b1100_0000]),
            ("enUS", [0b1111_1111, 0b1100_0000]),
        ] {
            data.extend_from_slice(name.as_bytes());
            data.push(0);
            data.extend_from_slice(&2u16.to_be_bytes()); // tag type
            data.extend_from_slice(&bits);
        }

        for i in 0..entry_count {
            data.extend_from_slice(format!("file{i}.dll").as_bytes());
            data.push(0);
            data.extend_from_slice(&[i as u8; 16]);
            data.extend_from_slice(&(1000 + i).to_be_bytes());
        }
        data
    }

    #[test]
    fn test_parse() {
        let data = build_manifest();
        let key = format!("{:x}", md5::compute(&data));
        let manifest = InstallManifest::parse(&data, &key, true).unwrap();

        assert_eq!(manifest.tags().len(), 3);
        assert!(manifest.tag("Windows").is_some());
        assert_eq!(manifest.entries().len(), 10);
        assert_eq!(
            manifest.entries()[0],
            InstallEntry {
                filename: "file0.dll".to_string(),
                key: "00".repeat(16),
                size: 1000,
            }
        );
    }

    #[test]
    fn test_verify_failure() {
        let data = build_manifest();
        assert!(matches!(
            InstallManifest::parse(&data, &"0".repeat(32), true),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_filter_entries() {
        let data = build_manifest();
        let manifest = InstallManifest::parse(&data, "", false).unwrap();

        let windows = manifest.filter_entries(&["Windows"]).unwrap();
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[0].filename, "file0.dll");

        let both = manifest.filter_entries(&["Windows", "enUS"]).unwrap();
        assert_eq!(both.len(), 5);

        // Disjoint platforms share no entries.
        let none = manifest.filter_entries(&["Windows", "OSX"]).unwrap();
        assert!(none.is_empty());

        let all = manifest.filter_entries(&[]).unwrap();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_unknown_tag() {
        let data = build_manifest();
        let manifest = InstallManifest::parse(&data, "", false).unwrap();
        assert!(matches!(
            manifest.filter_entries(&["Amazon"]),
            Err(Error::TagNotFound { .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            InstallManifest::parse(b"XXrest", "", false),
            Err(Error::BadMagic(_))
        ));
    }
}
