//! Encoding table parsing
//!
//! The encoding file is the bidirectional CKey ↔ EKey map for a build. It
//! is a two-sided page-table structure: content pages map a content key to
//! its encoding keys and file size, encoding pages map an encoding key to
//! the espec it was produced with.
//!
//! All integers are big-endian.

use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;
use tracing::debug;

use crate::{Error, Result, verify_data};

const HEADER_SIZE: usize = 22;
const ENCODING_MAGIC: [u8; 2] = *b"EN";

/// One row of the content side: a content key and its encoding keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub content_key: String,
    pub encoding_keys: Vec<String>,
    pub file_size: u64,
}

/// A parsed encoding table.
///
/// Page walks are lazy; the lookup methods populate internal maps on first
/// use, so a table that is only iterated never pays for them.
pub struct EncodingTable {
    content_hash_size: usize,
    encoding_hash_size: usize,
    content_page_size: usize,
    encoding_page_size: usize,
    content_page_count: usize,
    encoding_page_count: usize,
    specs: Vec<String>,
    content_pages: Vec<u8>,
    encoding_pages: Vec<u8>,
    content_map: Option<HashMap<String, Vec<String>>>,
    encoding_map: Option<HashMap<String, usize>>,
}

impl EncodingTable {
    /// Parse a decoded encoding file. With `verify`, MD5 of the decoded
    /// bytes must equal the table's content key.
    pub fn parse(data: &[u8], content_key: &str, verify: bool) -> Result<Self> {
        if verify {
            verify_data("encoding file", data, content_key)?;
        }

        if data.len() < HEADER_SIZE {
            return Err(Error::TruncatedEncoding { region: "header" });
        }
        if data[0..2] != ENCODING_MAGIC {
            return Err(Error::BadMagic(data[0..2].to_vec()));
        }
        if data[2] != 1 {
            return Err(Error::UnsupportedVersion(data[2]));
        }

        let content_hash_size = usize::from(data[3]);
        let encoding_hash_size = usize::from(data[4]);
        let content_page_size = usize::from(BigEndian::read_u16(&data[5..7])) * 1024;
        let encoding_page_size = usize::from(BigEndian::read_u16(&data[7..9])) * 1024;
        let content_page_count = BigEndian::read_u32(&data[9..13]) as usize;
        let encoding_page_count = BigEndian::read_u32(&data[13..17]) as usize;
        let espec_block_size = BigEndian::read_u32(&data[18..22]) as usize;

        debug!(
            "encoding table: {content_page_count} content pages, \
             {encoding_page_count} encoding pages, {espec_block_size}B espec block"
        );

        let mut pos = HEADER_SIZE;
        let take = |pos: &mut usize, len: usize, region: &'static str| -> Result<Vec<u8>> {
            let end = *pos + len;
            if end > data.len() {
                return Err(Error::TruncatedEncoding { region });
            }
            let slice = data[*pos..end].to_vec();
            *pos = end;
            Ok(slice)
        };

        let spec_data = take(&mut pos, espec_block_size, "espec block")?;
        let specs = spec_data
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| {
                std::str::from_utf8(s)
                    .map(str::to_string)
                    .map_err(|_| Error::InvalidUtf8)
            })
            .collect::<Result<Vec<String>>>()?;

        // The page table indexes (first key + page checksum per page) are
        // only needed for seeking into a table we never hold in full; skip
        // past them.
        take(
            &mut pos,
            content_page_count * content_hash_size * 2,
            "content page index",
        )?;
        let content_pages = take(
            &mut pos,
            content_page_count * content_page_size,
            "content pages",
        )?;
        take(
            &mut pos,
            encoding_page_count * encoding_hash_size * 2,
            "encoding page index",
        )?;
        let encoding_pages = take(
            &mut pos,
            encoding_page_count * encoding_page_size,
            "encoding pages",
        )?;

        Ok(Self {
            content_hash_size,
            encoding_hash_size,
            content_page_size,
            encoding_page_size,
            content_page_count,
            encoding_page_count,
            specs,
            content_pages,
            encoding_pages,
            content_map: None,
            encoding_map: None,
        })
    }

    /// The espec string table.
    pub fn specs(&self) -> &[String] {
        &self.specs
    }

    /// Iterate the content side: `(content key, encoding keys, size)` rows.
    pub fn content_entries(&self) -> ContentEntries<'_> {
        ContentEntries {
            table: self,
            page: 0,
            offset: 0,
        }
    }

    /// Iterate the encoding side: `(encoding key, espec)` rows.
    pub fn encoding_entries(&self) -> EncodingEntries<'_> {
        EncodingEntries {
            table: self,
            page: 0,
            offset: 0,
        }
    }

    /// Populate the content-key lookup map.
    pub fn preload_content(&mut self) {
        if self.content_map.is_none() {
            let map = self
                .content_entries()
                .map(|e| (e.content_key, e.encoding_keys))
                .collect();
            self.content_map = Some(map);
        }
    }

    /// Populate the encoding-key lookup map.
    pub fn preload_encoding(&mut self) {
        if self.encoding_map.is_none() {
            let mut map = HashMap::new();
            let entries: Vec<(String, usize)> = {
                let mut iter = RawEncodingEntries {
                    table: self,
                    page: 0,
                    offset: 0,
                };
                let mut v = Vec::new();
                while let Some(e) = iter.next_raw() {
                    v.push(e);
                }
                v
            };
            for (key, spec_index) in entries {
                map.insert(key, spec_index);
            }
            self.encoding_map = Some(map);
        }
    }

    /// All encoding keys for a content key.
    pub fn lookup_content_key(&mut self, content_key: &str) -> Option<&[String]> {
        self.preload_content();
        self.content_map
            .as_ref()
            .and_then(|m| m.get(content_key))
            .map(Vec::as_slice)
    }

    /// The first encoding key for a content key.
    pub fn find_by_content_key(&mut self, content_key: &str) -> Option<&str> {
        self.lookup_content_key(content_key)
            .and_then(|keys| keys.first())
            .map(String::as_str)
    }

    /// True if the build contains this encoding key.
    pub fn has_encoding_key(&mut self, encoding_key: &str) -> bool {
        self.preload_encoding();
        self.encoding_map
            .as_ref()
            .is_some_and(|m| m.contains_key(encoding_key))
    }

    /// The espec an encoding key was produced with.
    pub fn spec_for_encoding_key(&mut self, encoding_key: &str) -> Option<&str> {
        self.preload_encoding();
        let index = *self.encoding_map.as_ref()?.get(encoding_key)?;
        self.specs.get(index).map(String::as_str)
    }
}

/// Iterator over content-side rows.
pub struct ContentEntries<'a> {
    table: &'a EncodingTable,
    page: usize,
    offset: usize,
}

impl Iterator for ContentEntries<'_> {
    type Item = ContentEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let t = self.table;
        let record_min = 6 + t.content_hash_size + t.encoding_hash_size;

        while self.page < t.content_page_count {
            let page = &t.content_pages[self.page * t.content_page_size
                ..(self.page + 1) * t.content_page_size];

            if self.offset + record_min <= t.content_page_size {
                let ofs = self.offset;
                let key_count = usize::from(page[ofs]);
                let size_hi = u64::from(page[ofs + 1]);
                let size_lo = u64::from(BigEndian::read_u32(&page[ofs + 2..ofs + 6]));

                // Pages are zero padded; a zero key count ends the page.
                if key_count > 0 {
                    let mut ofs = ofs + 6;
                    let content_key = hex::encode(&page[ofs..ofs + t.content_hash_size]);
                    ofs += t.content_hash_size;

                    if ofs + key_count * t.encoding_hash_size <= t.content_page_size {
                        let mut encoding_keys = Vec::with_capacity(key_count);
                        for _ in 0..key_count {
                            encoding_keys
                                .push(hex::encode(&page[ofs..ofs + t.encoding_hash_size]));
                            ofs += t.encoding_hash_size;
                        }
                        self.offset = ofs;

                        return Some(ContentEntry {
                            content_key,
                            encoding_keys,
                            file_size: (size_hi << 32) | size_lo,
                        });
                    }
                }
            }

            self.page += 1;
            self.offset = 0;
        }

        None
    }
}

/// Iterator over encoding-side rows, espec resolved.
pub struct EncodingEntries<'a> {
    table: &'a EncodingTable,
    page: usize,
    offset: usize,
}

impl<'a> Iterator for EncodingEntries<'a> {
    type Item = (String, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let t = self.table;
        let mut raw = RawEncodingEntries {
            table: t,
            page: self.page,
            offset: self.offset,
        };
        let item = raw.next_raw();
        self.page = raw.page;
        self.offset = raw.offset;

        let (key, spec_index) = item?;
        let spec = t.specs.get(spec_index).map_or("", String::as_str);
        Some((key, spec))
    }
}

/// Page walk shared by the resolved iterator and the preload path.
struct RawEncodingEntries<'a> {
    table: &'a EncodingTable,
    page: usize,
    offset: usize,
}

impl RawEncodingEntries<'_> {
    fn next_raw(&mut self) -> Option<(String, usize)> {
        let t = self.table;
        // Record: key, espec index (i32), 5 bytes of offset/size detail.
        let record_size = t.encoding_hash_size + 9;

        while self.page < t.encoding_page_count {
            let page = &t.encoding_pages[self.page * t.encoding_page_size
                ..(self.page + 1) * t.encoding_page_size];

            if self.offset + record_size < t.encoding_page_size {
                let ofs = self.offset;
                let spec_index = BigEndian::read_i32(
                    &page[ofs + t.encoding_hash_size..ofs + t.encoding_hash_size + 4],
                );

                if spec_index != -1 {
                    let key = hex::encode(&page[ofs..ofs + t.encoding_hash_size]);
                    self.offset = ofs + record_size;
                    return Some((key, spec_index.max(0) as usize));
                }
            }

            self.page += 1;
            self.offset = 0;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a one-page-per-side encoding file.
    fn build_table() -> (Vec<u8>, String) {
        let page_size = 1024usize;
        let specs = b"z\0n\0";

        let ckey1 = "06547b4248ca2559d515b925e0f9b59a";
        let ekey1 = "dca2fc45515fef35a293248f53648774";
        let ckey2 = "16f5c65b940fffcb94d175188b6751d2";
        let ekey2a = "0839b3317e50fc5f8da4c6a30a2d1162";
        let ekey2b = "0b71077b578e2108b42093632a2c5669";

        let mut content_page = Vec::new();
        for (ckey, ekeys, size) in [
            (ckey1, vec![ekey1], 633144u64),
            (ckey2, vec![ekey2a, ekey2b], 436007),
        ] {
            content_page.push(ekeys.len() as u8);
            content_page.push((size >> 32) as u8);
            content_page.extend_from_slice(&(size as u32).to_be_bytes());
            content_page.extend_from_slice(&hex::decode(ckey).unwrap());
            for ekey in ekeys {
                content_page.extend_from_slice(&hex::decode(ekey).unwrap());
            }
        }
        content_page.resize(page_size, 0);

        let mut encoding_page = Vec::new();
        for (ekey, spec_index) in [(ekey2b, 0i32), (ekey1, 1)] {
            encoding_page.extend_from_slice(&hex::decode(ekey).unwrap());
            encoding_page.extend_from_slice(&spec_index.to_be_bytes());
            encoding_page.extend_from_slice(&[0u8; 5]);
        }
        // Terminator record.
        encoding_page.extend_from_slice(&[0u8; 16]);
        encoding_page.extend_from_slice(&(-1i32).to_be_bytes());
        encoding_page.extend_from_slice(&[0u8; 5]);
        encoding_page.resize(page_size, 0);

        let mut data = Vec::new();
        data.extend_from_slice(b"EN");
        data.push(1); // version
        data.push(16); // content hash size
        data.push(16); // encoding hash size
        data.extend_from_slice(&1u16.to_be_bytes()); // content page KB
        data.extend_from_slice(&1u16.to_be_bytes()); // encoding page KB
        data.extend_from_slice(&1u32.to_be_bytes()); // content page count
        data.extend_from_slice(&1u32.to_be_bytes()); // encoding page count
        data.push(0);
        data.extend_from_slice(&(specs.len() as u32).to_be_bytes());
        data.extend_from_slice(specs);

        // Content page index: first key + page checksum.
        data.extend_from_slice(&hex::decode(ckey1).unwrap());
        data.extend_from_slice(&md5::compute(&content_page).0);
        data.extend_from_slice(&content_page);

        data.extend_from_slice(&hex::decode(ekey2b).unwrap());
        data.extend_from_slice(&md5::compute(&encoding_page).0);
        data.extend_from_slice(&encoding_page);

        let content_key = format!("{:x}", md5::compute(&data));
        (data, content_key)
    }

    #[test]
    fn test_parse_and_verify() {
        let (data, ckey) = build_table();
        let table = EncodingTable::parse(&data, &ckey, true).unwrap();
        assert_eq!(table.specs(), &["z".to_string(), "n".to_string()]);
    }

    #[test]
    fn test_verify_failure() {
        let (data, _) = build_table();
        assert!(matches!(
            EncodingTable::parse(&data, &"0".repeat(32), true),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_content_entries() {
        let (data, ckey) = build_table();
        let table = EncodingTable::parse(&data, &ckey, true).unwrap();

        let entries: Vec<ContentEntry> = table.content_entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content_key, "06547b4248ca2559d515b925e0f9b59a");
        assert_eq!(
            entries[0].encoding_keys,
            vec!["dca2fc45515fef35a293248f53648774".to_string()]
        );
        assert_eq!(entries[0].file_size, 633144);
        assert_eq!(entries[1].encoding_keys.len(), 2);
    }

    #[test]
    fn test_encoding_entries() {
        let (data, ckey) = build_table();
        let table = EncodingTable::parse(&data, &ckey, true).unwrap();

        let entries: Vec<(String, &str)> = table.encoding_entries().collect();
        assert_eq!(
            entries[0],
            ("0b71077b578e2108b42093632a2c5669".to_string(), "z")
        );
        assert_eq!(
            entries[1],
            ("dca2fc45515fef35a293248f53648774".to_string(), "n")
        );
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_lookups() {
        let (data, ckey) = build_table();
        let mut table = EncodingTable::parse(&data, &ckey, true).unwrap();

        assert_eq!(
            table.find_by_content_key("06547b4248ca2559d515b925e0f9b59a"),
            Some("dca2fc45515fef35a293248f53648774")
        );
        assert_eq!(
            table
                .lookup_content_key("16f5c65b940fffcb94d175188b6751d2")
                .map(<[String]>::len),
            Some(2)
        );
        assert!(table.has_encoding_key("0b71077b578e2108b42093632a2c5669"));
        assert!(!table.has_encoding_key("ffffffffffffffffffffffffffffffff"));
        assert_eq!(
            table.spec_for_encoding_key("0b71077b578e2108b42093632a2c5669"),
            Some("z")
        );

        // Iteration still works after the maps are built.
        assert_eq!(table.content_entries().count(), 2);
    }

    #[test]
    fn test_truncated() {
        let (data, _) = build_table();
        assert!(matches!(
            EncodingTable::parse(&data[..40], "00", false),
            Err(Error::TruncatedEncoding { .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0] = b'X';
        assert!(matches!(
            EncodingTable::parse(&data, "00", false),
            Err(Error::BadMagic(_))
        ));
    }
}
