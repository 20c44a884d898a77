//! Verified streaming BLTE decode

use flate2::read::ZlibDecoder;
use std::io::Read;

use crate::error::verify_md5;
use crate::header::BlteHeader;
use crate::{Error, Result};

/// Decode one encoded block body (type byte + payload).
///
/// `'N'` is a raw payload, `'Z'` a zlib stream.
pub fn decode_block(data: &[u8]) -> Result<Vec<u8>> {
    let (&tag, payload) = data
        .split_first()
        .ok_or(Error::UnknownBlockType(0))?;

    match tag {
        b'N' => Ok(payload.to_vec()),
        b'Z' => {
            let mut out = Vec::new();
            ZlibDecoder::new(payload).read_to_end(&mut out)?;
            Ok(out)
        }
        other => Err(Error::UnknownBlockType(other)),
    }
}

/// Streaming decoder for one BLTE container.
///
/// The block stream is single-shot: it owns the position of the underlying
/// reader, so requesting it a second time fails with
/// [`Error::StreamConsumed`]. Use [`decode_all`] for the common
/// load-whole-file case.
pub struct BlteDecoder<R: Read> {
    reader: R,
    key: String,
    verify: bool,
    header: BlteHeader,
    consumed: bool,
}

impl<R: Read> BlteDecoder<R> {
    /// Parse the header. With `verify`, the header of a multi-frame
    /// container is immediately checked against the EKey.
    pub fn new(mut reader: R, key: &str, verify: bool) -> Result<Self> {
        let header = BlteHeader::parse(&mut reader)?;
        if verify && !header.is_single_frame() {
            verify_md5("BLTE header", header.raw_bytes(), key)?;
        }

        Ok(Self {
            reader,
            key: key.to_string(),
            verify,
            header,
            consumed: false,
        })
    }

    pub fn header(&self) -> &BlteHeader {
        &self.header
    }

    /// Iterate the encoded block bodies without decoding them.
    ///
    /// With `verify`, each body is checked against its table digest (or, for
    /// a single-frame container, the whole file against the EKey), and any
    /// bytes after the final block fail with [`Error::TrailingBytes`].
    pub fn encoded_blocks(&mut self) -> Result<EncodedBlocks<'_, R>> {
        if self.consumed {
            return Err(Error::StreamConsumed);
        }
        self.consumed = true;
        Ok(EncodedBlocks {
            decoder: self,
            index: 0,
            finished: false,
        })
    }

    /// Iterate the decoded blocks.
    pub fn blocks(&mut self) -> Result<Blocks<'_, R>> {
        Ok(Blocks {
            inner: self.encoded_blocks()?,
        })
    }
}

/// Single-shot iterator over encoded block bodies.
pub struct EncodedBlocks<'a, R: Read> {
    decoder: &'a mut BlteDecoder<R>,
    index: usize,
    finished: bool,
}

impl<R: Read> EncodedBlocks<'_, R> {
    fn next_block(&mut self) -> Result<Option<Vec<u8>>> {
        let dec = &mut self.decoder;

        if dec.header.is_single_frame() {
            if self.index > 0 {
                return Ok(None);
            }
            self.index = 1;

            let mut data = Vec::new();
            dec.reader.read_to_end(&mut data)?;
            if dec.verify {
                let mut whole = dec.header.raw_bytes().to_vec();
                whole.extend_from_slice(&data);
                verify_md5("single-frame BLTE", &whole, &dec.key)?;
            }
            return Ok(Some(data));
        }

        if self.index >= dec.header.blocks().len() {
            // Any leftover bytes mean the container lied about its table.
            let mut probe = [0u8; 1];
            if dec.reader.read(&mut probe)? != 0 {
                return Err(Error::TrailingBytes);
            }
            return Ok(None);
        }

        let info = &dec.header.blocks()[self.index];
        self.index += 1;

        let mut data = vec![0u8; info.encoded_size as usize];
        dec.reader.read_exact(&mut data)?;
        if dec.verify {
            verify_md5("BLTE block", &data, &info.digest)?;
        }
        Ok(Some(data))
    }
}

impl<R: Read> Iterator for EncodedBlocks<'_, R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_block() {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Single-shot iterator over decoded blocks.
pub struct Blocks<'a, R: Read> {
    inner: EncodedBlocks<'a, R>,
}

impl<R: Read> Iterator for Blocks<'_, R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next()? {
            Ok(encoded) => Some(decode_block(&encoded)),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Decode a whole container into one buffer.
pub fn decode_all<R: Read>(reader: R, key: &str, verify: bool) -> Result<Vec<u8>> {
    let mut decoder = BlteDecoder::new(reader, key, verify)?;
    let mut out = Vec::with_capacity(decoder.header().total_decoded_size() as usize);
    for block in decoder.blocks()? {
        out.extend_from_slice(&block?);
    }
    Ok(out)
}

/// Walk every encoded block with verification enabled, without decoding.
pub fn verify_stream<R: Read>(reader: R, key: &str) -> Result<()> {
    let mut decoder = BlteDecoder::new(reader, key, true)?;
    for block in decoder.encoded_blocks()? {
        block?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::espec::EncodingSpec;
    use std::io::Cursor;

    fn sample() -> (Vec<u8>, String) {
        let spec = EncodingSpec::parse("b:{4=n,*=z}").unwrap();
        let payload = b"abcdefghijklmnopqrstuvwxyz";
        let (bytes, _, key) = crate::encode(payload, &spec).unwrap();
        (bytes, key)
    }

    #[test]
    fn test_decode_round_trip() {
        let (bytes, key) = sample();
        let decoded = decode_all(Cursor::new(&bytes), &key, true).unwrap();
        assert_eq!(decoded, b"abcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn test_verify_stream_ok() {
        let (bytes, key) = sample();
        verify_stream(Cursor::new(&bytes), &key).unwrap();
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let (mut bytes, key) = sample();
        bytes.push(b'B');
        assert!(matches!(
            verify_stream(Cursor::new(&bytes), &key),
            Err(Error::TrailingBytes)
        ));
    }

    #[test]
    fn test_corrupt_block_rejected() {
        let (mut bytes, key) = sample();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            verify_stream(Cursor::new(&bytes), &key),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_header_mismatch_rejected() {
        let (bytes, _) = sample();
        let wrong = "0".repeat(32);
        assert!(matches!(
            BlteDecoder::new(Cursor::new(&bytes), &wrong, true),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_single_frame() {
        // header_size == 0: one raw block to EOF.
        let mut data = b"BLTE\x00\x00\x00\x00N".to_vec();
        data.extend_from_slice(b"hello");
        let key = format!("{:x}", md5::compute(&data));

        let decoded = decode_all(Cursor::new(&data), &key, true).unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn test_single_frame_bad_key() {
        let mut data = b"BLTE\x00\x00\x00\x00N".to_vec();
        data.extend_from_slice(b"hello");
        let result = decode_all(Cursor::new(&data), &"0".repeat(32), true);
        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_stream_consumed() {
        let (bytes, key) = sample();
        let mut decoder = BlteDecoder::new(Cursor::new(&bytes), &key, false).unwrap();
        for block in decoder.blocks().unwrap() {
            block.unwrap();
        }
        assert!(matches!(decoder.blocks(), Err(Error::StreamConsumed)));
    }

    #[test]
    fn test_unknown_block_type() {
        assert!(matches!(
            decode_block(b"Qxyz"),
            Err(Error::UnknownBlockType(b'Q'))
        ));
    }
}
