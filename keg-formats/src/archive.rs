//! Archive indexes and the merged archive group
//!
//! An archive is a concatenation of BLTE-encoded files addressed by an MD5
//! key. Its `.index` sibling lists every contained key with `(size, offset)`
//! so the archive supports O(1) random reads.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::HashSet;
use tracing::trace;

use crate::{Error, Result, verify_data};

const FOOTER_SIZE: usize = 28;
const ITEM_KEY_SIZE: u8 = 16;

/// One `(key, size, offset)` triple from an archive index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: String,
    pub size: u32,
    pub offset: u32,
}

/// A parsed archive index.
///
/// The body is split into `block_size_kb * 1024`-byte blocks; a triple never
/// straddles a block boundary, so readers skip a block's tail padding when
/// the next triple would not fit.
#[derive(Debug)]
pub struct ArchiveIndex {
    key: String,
    data: Vec<u8>,
    pub block_size_kb: u8,
    pub offset_size: u8,
    pub size_size: u8,
    pub key_size: u8,
    pub checksum_size: u8,
    pub num_items: u32,
}

impl ArchiveIndex {
    /// Parse an index. With `verify`, the MD5 of the 28-byte footer must
    /// equal the index key.
    pub fn parse(data: Vec<u8>, key: &str, verify: bool) -> Result<Self> {
        if data.len() < FOOTER_SIZE {
            return Err(Error::TruncatedIndex(data.len()));
        }

        let footer = &data[data.len() - FOOTER_SIZE..];
        if verify {
            verify_data("archive index footer", footer, key)?;
        }

        // toc_hash[8], version, 2 unknown, block_size_kb, offset_size,
        // size_size, key_size, checksum_size, item count (LE), checksum[8]
        let version = footer[8];
        if version != 1 {
            return Err(Error::UnsupportedVersion(version));
        }
        let block_size_kb = footer[11];
        let offset_size = footer[12];
        let size_size = footer[13];
        let key_size = footer[14];
        let checksum_size = footer[15];
        let num_items = LittleEndian::read_u32(&footer[16..20]);

        if key_size != ITEM_KEY_SIZE || size_size != 4 || offset_size != 4 {
            return Err(Error::UnsupportedIndexLayout {
                key_size,
                size_size,
                offset_size,
            });
        }

        trace!("index {key}: {num_items} items in {}K blocks", block_size_kb);

        Ok(Self {
            key: key.to_string(),
            data,
            block_size_kb,
            offset_size,
            size_size,
            key_size,
            checksum_size,
            num_items,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Iterate the `(key, size, offset)` triples in stored order.
    pub fn items(&self) -> IndexItems<'_> {
        IndexItems {
            index: self,
            pos: 0,
            bytes_left_in_block: usize::from(self.block_size_kb) * 1024,
            remaining: self.num_items,
        }
    }
}

/// Iterator over the triples of one archive index.
pub struct IndexItems<'a> {
    index: &'a ArchiveIndex,
    pos: usize,
    bytes_left_in_block: usize,
    remaining: u32,
}

impl Iterator for IndexItems<'_> {
    type Item = IndexEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let item_size = usize::from(
            self.index.key_size + self.index.size_size + self.index.offset_size,
        );
        let block_size = usize::from(self.index.block_size_kb) * 1024;

        if item_size > self.bytes_left_in_block {
            // Skip the block's zero padding.
            self.pos += self.bytes_left_in_block;
            self.bytes_left_in_block = block_size;
        }

        let end = self.pos + item_size;
        if end > self.index.data.len() {
            return None;
        }

        let data = &self.index.data[self.pos..end];
        self.pos = end;
        self.bytes_left_in_block -= item_size;
        self.remaining -= 1;

        let key_size = usize::from(self.index.key_size);
        Some(IndexEntry {
            key: hex::encode(&data[..key_size]),
            size: BigEndian::read_u32(&data[key_size..key_size + 4]),
            offset: BigEndian::read_u32(&data[key_size + 4..key_size + 8]),
        })
    }
}

/// One entry of a merged archive group: where a key lives across archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub key: String,
    pub size: u32,
    /// Position of the owning archive in the CDN config's archive list.
    pub archive_id: usize,
    pub offset: u32,
}

/// N archive indexes flattened into one globally sorted key map.
///
/// The group is derived in memory; its key is the CDN config's
/// `archive-group` field. The server-side derivation (pack sorted triples
/// into blocks, toc from the last key of each block plus the block MD5s,
/// footer from MD5(toc), name = MD5(toc_hash + footer)) is not re-run here;
/// only the read path is supported.
#[derive(Debug)]
pub struct ArchiveGroup {
    group_key: String,
    archive_keys: Vec<String>,
    entries: Vec<GroupEntry>,
    keys: HashSet<String>,
}

impl ArchiveGroup {
    /// Merge the given indexes. `archive_keys` and `indices` are parallel:
    /// entry `i` of each belongs to the same archive.
    pub fn build(archive_keys: Vec<String>, group_key: &str, indices: &[ArchiveIndex]) -> Self {
        let mut entries: Vec<GroupEntry> = Vec::new();
        for (archive_id, index) in indices.iter().enumerate() {
            for item in index.items() {
                entries.push(GroupEntry {
                    key: item.key,
                    size: item.size,
                    archive_id,
                    offset: item.offset,
                });
            }
        }

        // Stable sort, then same-key duplicates collapse to the first
        // archive that lists them.
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries.dedup_by(|a, b| a.key == b.key);

        let keys = entries.iter().map(|e| e.key.clone()).collect();

        Self {
            group_key: group_key.to_string(),
            archive_keys,
            entries,
            keys,
        }
    }

    pub fn group_key(&self) -> &str {
        &self.group_key
    }

    pub fn archive_keys(&self) -> &[String] {
        &self.archive_keys
    }

    /// True if any merged index contains `key`.
    pub fn has_file(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Locate a key, if present.
    pub fn find(&self, key: &str) -> Option<&GroupEntry> {
        self.entries
            .binary_search_by(|e| e.key.as_str().cmp(key))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// The archive key owning an entry.
    pub fn archive_key(&self, entry: &GroupEntry) -> &str {
        &self.archive_keys[entry.archive_id]
    }

    /// All entries, ascending by key.
    pub fn entries(&self) -> &[GroupEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a well-formed index over `items`, returning (bytes, key).
    pub(crate) fn build_index(items: &[(&str, u32, u32)], block_size_kb: u8) -> (Vec<u8>, String) {
        let block_size = usize::from(block_size_kb) * 1024;
        let mut body = Vec::new();
        let mut left = block_size;

        for (key, size, offset) in items {
            if 24 > left {
                body.resize(body.len() + left, 0);
                left = block_size;
            }
            body.extend_from_slice(&hex::decode(key).unwrap());
            body.extend_from_slice(&size.to_be_bytes());
            body.extend_from_slice(&offset.to_be_bytes());
            left -= 24;
        }
        // Pad the final block.
        body.resize(body.len() + left, 0);

        let mut footer = Vec::new();
        footer.extend_from_slice(&[0u8; 8]); // toc hash
        footer.push(1); // version
        footer.extend_from_slice(&[0, 0]);
        footer.push(block_size_kb);
        footer.push(4); // offset size
        footer.push(4); // size size
        footer.push(16); // key size
        footer.push(8); // checksum size
        footer.extend_from_slice(&(items.len() as u32).to_le_bytes());
        footer.extend_from_slice(&[0u8; 8]); // footer checksum

        let key = format!("{:x}", md5::compute(&footer));
        body.extend_from_slice(&footer);
        (body, key)
    }

    const K1: &str = "000102030405060708090a0b0c0d0e0f";
    const K2: &str = "101112131415161718191a1b1c1d1e1f";
    const K3: &str = "202122232425262728292a2b2c2d2e2f";

    #[test]
    fn test_parse_and_iterate() {
        let (data, key) = build_index(&[(K1, 100, 0), (K2, 200, 100)], 4);
        let index = ArchiveIndex::parse(data, &key, true).unwrap();

        assert_eq!(index.num_items, 2);
        let items: Vec<IndexEntry> = index.items().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, K1);
        assert_eq!(items[0].size, 100);
        assert_eq!(items[1].offset, 100);
    }

    #[test]
    fn test_block_boundary_skip() {
        // 1K blocks hold 42 triples (1024 / 24); spill into a second block.
        let keys: Vec<String> = (0..50)
            .map(|i| format!("{:032x}", 0x1000 + i))
            .collect();
        let items: Vec<(&str, u32, u32)> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.as_str(), i as u32 + 1, i as u32 * 10))
            .collect();

        let (data, key) = build_index(&items, 1);
        let index = ArchiveIndex::parse(data, &key, true).unwrap();
        let parsed: Vec<IndexEntry> = index.items().collect();

        assert_eq!(parsed.len(), 50);
        assert_eq!(parsed[41].key, keys[41]);
        assert_eq!(parsed[42].key, keys[42]);
        assert_eq!(parsed[49].size, 50);
    }

    #[test]
    fn test_footer_verification() {
        let (data, _) = build_index(&[(K1, 1, 0)], 4);
        let result = ArchiveIndex::parse(data, &"0".repeat(32), true);
        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            ArchiveIndex::parse(vec![0u8; 10], "00", false),
            Err(Error::TruncatedIndex(10))
        ));
    }

    #[test]
    fn test_group_merge_and_lookup() {
        let (data_a, key_a) = build_index(&[(K3, 30, 0), (K1, 10, 30)], 4);
        let (data_b, key_b) = build_index(&[(K2, 20, 0), (K1, 99, 20)], 4);
        let indices = vec![
            ArchiveIndex::parse(data_a, &key_a, true).unwrap(),
            ArchiveIndex::parse(data_b, &key_b, true).unwrap(),
        ];

        let group = ArchiveGroup::build(
            vec![key_a.clone(), key_b.clone()],
            "aabbccdd000000000000000000000000",
            &indices,
        );

        assert_eq!(group.len(), 3);
        // Sorted ascending by key.
        let keys: Vec<&str> = group.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec![K1, K2, K3]);

        // K1 appears in both archives; the first one wins.
        let entry = group.find(K1).unwrap();
        assert_eq!(entry.archive_id, 0);
        assert_eq!(entry.size, 10);
        assert_eq!(group.archive_key(entry), key_a);

        assert!(group.has_file(K2));
        assert!(!group.has_file("ffffffffffffffffffffffffffffffff"));
        assert!(group.find("ffffffffffffffffffffffffffffffff").is_none());
    }
}
