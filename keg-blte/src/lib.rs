//! # keg-blte
//!
//! Codec for the BLTE encoded-block container used by NGDP content
//! distribution. Provides header parsing, verified streaming decode, and an
//! optional encode path driven by an `espec` block-table specification.
//!
//! A BLTE file is addressed by its encoding key (EKey): the MD5 of the
//! encoded bytes. Each block in the table additionally carries the MD5 of
//! its encoded body, so a file can be verified without decoding it.
//!
//! ## Decoding
//!
//! ```no_run
//! use std::fs::File;
//!
//! # fn main() -> keg_blte::Result<()> {
//! let f = File::open("00/52/0052c1...")?;
//! let data = keg_blte::decode_all(f, "0052c1...", true)?;
//! # Ok(())
//! # }
//! ```

pub mod decode;
pub mod encode;
pub mod error;
pub mod espec;
pub mod header;

pub use decode::{BlteDecoder, decode_all, decode_block, verify_stream};
pub use encode::encode;
pub use error::{Error, Result};
pub use espec::{BlockTableEntry, EncodingSpec, Frame};
pub use header::{BlockInfo, BlteHeader};

/// BLTE magic bytes
pub const BLTE_MAGIC: [u8; 4] = *b"BLTE";

/// The only block-table format revision this client understands.
pub const BLTE_VERSION: u8 = 0x0f;
