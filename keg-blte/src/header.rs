//! BLTE header and block table parsing

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;
use tracing::debug;

use crate::{BLTE_MAGIC, BLTE_VERSION, Error, Result};

/// One entry of the block table: sizes plus the MD5 of the encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Size of the encoded block body, including the type byte.
    pub encoded_size: u32,
    /// Size of the block once decoded.
    pub decoded_size: u32,
    /// MD5 of the encoded block body, lowercase hex.
    pub digest: String,
}

/// Parsed BLTE header.
///
/// `header_size == 0` marks a single-frame container: the remainder of the
/// stream is one typed block and the table is empty.
#[derive(Debug, Clone)]
pub struct BlteHeader {
    header_size: u32,
    /// Every header byte as read, for whole-header verification.
    raw: Vec<u8>,
    blocks: Vec<BlockInfo>,
}

impl BlteHeader {
    /// Parse a BLTE header at the reader's current position.
    pub fn parse<R: Read>(f: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        f.read_exact(&mut magic)?;
        if magic != BLTE_MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let header_size = f.read_u32::<BigEndian>()?;
        let mut raw = Vec::with_capacity(header_size.max(8) as usize);
        raw.extend_from_slice(&magic);
        raw.extend_from_slice(&header_size.to_be_bytes());

        if header_size == 0 {
            return Ok(Self {
                header_size,
                raw,
                blocks: Vec::new(),
            });
        }

        let version = f.read_u8()?;
        if version != BLTE_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        raw.push(version);

        // 3-byte big-endian block count, then 24 bytes per block.
        let block_count = f.read_u24::<BigEndian>()?;
        debug!("block count: {block_count}");
        if header_size != 8 + 4 + block_count * 24 {
            return Err(Error::InvalidBlockTable(header_size));
        }
        raw.extend_from_slice(&block_count.to_be_bytes()[1..]);

        let mut blocks = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            let encoded_size = f.read_u32::<BigEndian>()?;
            let decoded_size = f.read_u32::<BigEndian>()?;
            let mut digest = [0u8; 16];
            f.read_exact(&mut digest)?;

            raw.extend_from_slice(&encoded_size.to_be_bytes());
            raw.extend_from_slice(&decoded_size.to_be_bytes());
            raw.extend_from_slice(&digest);

            blocks.push(BlockInfo {
                encoded_size,
                decoded_size,
                digest: hex::encode(digest),
            });
        }

        Ok(Self {
            header_size,
            raw,
            blocks,
        })
    }

    /// Declared header size; 0 for single-frame containers.
    pub fn header_size(&self) -> u32 {
        self.header_size
    }

    /// True when the container has no block table.
    pub fn is_single_frame(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block table entries (empty for single-frame containers).
    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    /// The header bytes exactly as read.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Sum of decoded block sizes; 0 when unknown (single-frame).
    pub fn total_decoded_size(&self) -> u64 {
        self.blocks.iter().map(|b| u64::from(b.decoded_size)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_single_frame_header() {
        let data = b"BLTE\x00\x00\x00\x00";
        let header = BlteHeader::parse(&mut Cursor::new(&data[..])).unwrap();
        assert!(header.is_single_frame());
        assert_eq!(header.header_size(), 0);
        assert_eq!(header.raw_bytes(), data);
    }

    #[test]
    fn test_multi_frame_header() {
        let mut data = Vec::new();
        data.extend_from_slice(b"BLTE");
        data.extend_from_slice(&60u32.to_be_bytes()); // 8 + 4 + 2 * 24
        data.push(0x0f);
        data.extend_from_slice(&[0x00, 0x00, 0x02]);

        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(&2000u32.to_be_bytes());
        data.extend_from_slice(&[0xaa; 16]);

        data.extend_from_slice(&1500u32.to_be_bytes());
        data.extend_from_slice(&3000u32.to_be_bytes());
        data.extend_from_slice(&[0xbb; 16]);

        let header = BlteHeader::parse(&mut Cursor::new(&data)).unwrap();
        assert_eq!(header.blocks().len(), 2);
        assert_eq!(header.blocks()[0].encoded_size, 1000);
        assert_eq!(header.blocks()[0].decoded_size, 2000);
        assert_eq!(header.blocks()[0].digest, "aa".repeat(16));
        assert_eq!(header.total_decoded_size(), 5000);
        assert_eq!(header.raw_bytes(), &data[..]);
    }

    #[test]
    fn test_invalid_magic() {
        let data = b"BAD!\x00\x00\x00\x00";
        assert!(matches!(
            BlteHeader::parse(&mut Cursor::new(&data[..])),
            Err(Error::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_bad_version() {
        let mut data = Vec::new();
        data.extend_from_slice(b"BLTE");
        data.extend_from_slice(&36u32.to_be_bytes());
        data.push(0x10);
        data.extend_from_slice(&[0u8; 27]);
        assert!(matches!(
            BlteHeader::parse(&mut Cursor::new(&data)),
            Err(Error::UnsupportedVersion(0x10))
        ));
    }

    #[test]
    fn test_block_table_size_mismatch() {
        let mut data = Vec::new();
        data.extend_from_slice(b"BLTE");
        data.extend_from_slice(&61u32.to_be_bytes()); // off by one
        data.push(0x0f);
        data.extend_from_slice(&[0x00, 0x00, 0x02]);
        data.extend_from_slice(&[0u8; 48]);
        assert!(matches!(
            BlteHeader::parse(&mut Cursor::new(&data)),
            Err(Error::InvalidBlockTable(61))
        ));
    }
}
