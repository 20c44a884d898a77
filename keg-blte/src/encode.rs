//! espec-driven BLTE encode

use flate2::Compression;
use flate2::write::{DeflateEncoder, ZlibEncoder};
use std::io::Write;
use tracing::trace;

use crate::espec::{EncodingSpec, Frame};
use crate::{BLTE_VERSION, Error, Result};

/// Encode `data` into a BLTE container as described by `spec`.
///
/// The spec's top-level frame must be a block table. Returns the container
/// bytes, the number of bytes written, and the resulting EKey (the MD5 of
/// the header and block table).
pub fn encode(data: &[u8], spec: &EncodingSpec) -> Result<(Vec<u8>, usize, String)> {
    let frames = spec.describe_frames(data.len() as u64)?;
    trace!("encoding {} bytes into {} blocks", data.len(), frames.len());

    let mut bodies = Vec::with_capacity(frames.len());
    let mut offset = 0usize;
    for (size, frame) in frames {
        let chunk = &data[offset..offset + size as usize];
        offset += size as usize;
        bodies.push((encode_block(chunk, frame)?, chunk.len() as u32));
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"BLTE");
    let header_size = 8 + 4 + bodies.len() as u32 * 24;
    out.extend_from_slice(&header_size.to_be_bytes());
    out.push(BLTE_VERSION);
    out.extend_from_slice(&(bodies.len() as u32).to_be_bytes()[1..]);

    for (body, decoded_size) in &bodies {
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&decoded_size.to_be_bytes());
        out.extend_from_slice(&md5::compute(body).0);
    }

    // The EKey of a multi-frame container is the MD5 of the header and
    // block table alone, not of the whole file.
    let ekey = format!("{:x}", md5::compute(&out));

    for (body, _) in &bodies {
        out.extend_from_slice(body);
    }

    let written = out.len();
    Ok((out, written, ekey))
}

/// Encode one block body (type byte + payload) per its frame.
fn encode_block(chunk: &[u8], frame: &Frame) -> Result<Vec<u8>> {
    match frame {
        Frame::Raw => {
            let mut body = Vec::with_capacity(chunk.len() + 1);
            body.push(b'N');
            body.extend_from_slice(chunk);
            Ok(body)
        }
        Frame::Zip { level, bits } => {
            let mut body = vec![b'Z'];
            let compression = Compression::new((*level).min(9));
            if *bits == 0 {
                // mpq: raw deflate stream, no zlib wrapper.
                let mut enc = DeflateEncoder::new(&mut body, compression);
                enc.write_all(chunk)?;
                enc.finish()?;
            } else {
                let mut enc = ZlibEncoder::new(&mut body, compression);
                enc.write_all(chunk)?;
                enc.finish()?;
            }
            Ok(body)
        }
        Frame::Encrypted { .. } => Err(Error::UnsupportedEncodeFrame("encrypted")),
        Frame::BlockTable { .. } => Err(Error::UnsupportedEncodeFrame("nested block table")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_all;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode_round_trip() {
        let payload: Vec<u8> = (0u32..50_000).map(|i| (i % 251) as u8).collect();
        let spec = EncodingSpec::parse("b:{22=n,16K*2=z,*=z}").unwrap();

        let (bytes, written, ekey) = encode(&payload, &spec).unwrap();
        assert_eq!(written, bytes.len());

        // The EKey names the header + block table, not the whole file.
        let header = crate::BlteHeader::parse(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(format!("{:x}", md5::compute(header.raw_bytes())), ekey);
        assert_ne!(format!("{:x}", md5::compute(&bytes)), ekey);

        // Verified decode checks the header against the EKey.
        let decoded = decode_all(Cursor::new(&bytes), &ekey, true).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_encode_raw_only() {
        let spec = EncodingSpec::parse("b:{*=n}").unwrap();
        let (bytes, _, ekey) = encode(b"hello world", &spec).unwrap();
        let decoded = decode_all(Cursor::new(&bytes), &ekey, true).unwrap();
        assert_eq!(decoded, b"hello world");
    }

    #[test]
    fn test_encode_mpq_bits_round_trip_fails_cleanly() {
        // mpq blocks are raw deflate; our decoder only understands zlib
        // streams, so this is encode-only territory.
        let spec = EncodingSpec::parse("b:{*=z:{6,mpq}}").unwrap();
        let (bytes, _, ekey) = encode(b"some payload", &spec).unwrap();
        let header = crate::BlteHeader::parse(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(format!("{:x}", md5::compute(header.raw_bytes())), ekey);
    }

    #[test]
    fn test_encode_requires_block_table() {
        let spec = EncodingSpec::parse("z").unwrap();
        assert!(matches!(
            encode(b"x", &spec),
            Err(Error::UnsupportedEncodeFrame(_))
        ));
    }

    #[test]
    fn test_encode_rejects_encrypted() {
        let spec = EncodingSpec::parse("b:{*=e:{A6D4CFE470214878,FD4466FC,n}}").unwrap();
        assert!(matches!(
            encode(b"x", &spec),
            Err(Error::UnsupportedEncodeFrame("encrypted"))
        ));
    }
}
