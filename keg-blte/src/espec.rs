//! espec (encoding specification) grammar
//!
//! An espec is the short textual grammar the encoding table stores per EKey,
//! describing how a payload is split into blocks and how each block is
//! encoded, e.g. `z`, `b:{22=n,54=z,*=z}` or `e:{237DA26C65073F42,33F13F18,z}`.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// One frame of an espec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `n`: stored as-is
    Raw,
    /// `z[:level|:{level,bits}]`: zlib stream; `mpq` bits parse as 0
    Zip { level: u32, bits: u32 },
    /// `e:{key,nonce,subframe}`: encrypted wrapper around another frame
    Encrypted {
        key: String,
        nonce: String,
        subframe: Box<Frame>,
    },
    /// `b:...`: block table splitting the payload into sized chunks
    BlockTable { entries: Vec<BlockTableEntry> },
}

impl Frame {
    pub const DEFAULT_ZIP_LEVEL: u32 = 9;
    pub const DEFAULT_ZIP_BITS: u32 = 15;
}

/// One entry of a block-table frame.
///
/// `block_size == -1` means "whole remainder"; `repeat == -1` means "until
/// the input is exhausted".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTableEntry {
    pub block_size: i64,
    pub repeat: i64,
    pub frame: Frame,
}

/// A parsed espec, keeping the source string alongside the frame tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingSpec {
    spec: String,
    frame: Frame,
}

impl EncodingSpec {
    /// Parse an espec string.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parser = Parser::new(spec);
        let frame = parser.parse_frame()?;
        parser.expect_eof()?;
        Ok(Self {
            spec: spec.to_string(),
            frame,
        })
    }

    /// The source string.
    pub fn as_str(&self) -> &str {
        &self.spec
    }

    /// The top-level frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Plan the block sequence for a payload of `total_size` bytes.
    ///
    /// Only valid for a top-level block table; this is what drives the
    /// encoder. Each element is the chunk length paired with the frame that
    /// encodes it.
    pub fn describe_frames(&self, total_size: u64) -> Result<Vec<(u64, &Frame)>> {
        let Frame::BlockTable { entries } = &self.frame else {
            return Err(Error::UnsupportedEncodeFrame(
                "top-level frame is not a block table",
            ));
        };

        let mut remaining = total_size;
        let mut out = Vec::new();

        for entry in entries {
            if remaining == 0 {
                break;
            }

            if entry.block_size < 0 {
                out.push((remaining, &entry.frame));
                remaining = 0;
                continue;
            }

            let block_size = entry.block_size as u64;
            let mut repeat = entry.repeat;
            while remaining > 0 && repeat != 0 {
                let take = block_size.min(remaining);
                out.push((take, &entry.frame));
                remaining -= take;
                if repeat > 0 {
                    repeat -= 1;
                }
            }
        }

        if remaining > 0 {
            return Err(Error::InputExceedsSpec);
        }
        Ok(out)
    }
}

impl FromStr for EncodingSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for EncodingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "n"),
            Self::Zip { level, bits } => {
                if *level == Self::DEFAULT_ZIP_LEVEL && *bits == Self::DEFAULT_ZIP_BITS {
                    write!(f, "z")
                } else if *bits == Self::DEFAULT_ZIP_BITS {
                    write!(f, "z:{level}")
                } else if *bits == 0 {
                    write!(f, "z:{{{level},mpq}}")
                } else {
                    write!(f, "z:{{{level},{bits}}}")
                }
            }
            Self::Encrypted {
                key,
                nonce,
                subframe,
            } => write!(f, "e:{{{key},{nonce},{subframe}}}"),
            Self::BlockTable { entries } => {
                write!(f, "b:{{")?;
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if entry.block_size < 0 {
                        write!(f, "*")?;
                    } else {
                        write!(f, "{}", entry.block_size)?;
                        match entry.repeat {
                            1 => {}
                            -1 => write!(f, "*")?,
                            n => write!(f, "*{n}")?,
                        }
                    }
                    write!(f, "={}", entry.frame)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Recursive-descent parser over the espec grammar.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::SpecSyntax {
            pos: self.pos,
            reason: reason.into(),
        }
    }

    fn consume(&mut self, ch: char) -> Result<()> {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            Ok(())
        } else {
            Err(self.error(format!("expected '{ch}'")))
        }
    }

    fn expect_eof(&self) -> Result<()> {
        if self.pos == self.input.len() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }

    fn parse_number(&mut self) -> Result<u64> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected number"));
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| self.error("number out of range"))
    }

    fn parse_hex(&mut self) -> Result<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected hex number"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_frame(&mut self) -> Result<Frame> {
        match self.peek() {
            Some('n') => {
                self.consume('n')?;
                Ok(Frame::Raw)
            }
            Some('z') => self.parse_zip(),
            Some('e') => self.parse_encrypted(),
            Some('b') => self.parse_block_table(),
            _ => Err(self.error("unknown frame type")),
        }
    }

    fn parse_zip(&mut self) -> Result<Frame> {
        self.consume('z')?;

        if self.peek() != Some(':') {
            return Ok(Frame::Zip {
                level: Frame::DEFAULT_ZIP_LEVEL,
                bits: Frame::DEFAULT_ZIP_BITS,
            });
        }
        self.consume(':')?;

        if self.peek() == Some('{') {
            // z:{level,bits}, where bits may be a number or "mpq" (raw
            // deflate, no zlib header).
            self.consume('{')?;
            let level = self.parse_number()? as u32;
            self.consume(',')?;
            let bits = if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.parse_number()? as u32
            } else {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_lowercase()) {
                    self.pos += 1;
                }
                match &self.input[start..self.pos] {
                    "mpq" => 0,
                    other => return Err(self.error(format!("unknown zip bits: {other:?}"))),
                }
            };
            self.consume('}')?;
            Ok(Frame::Zip { level, bits })
        } else {
            let level = self.parse_number()? as u32;
            Ok(Frame::Zip {
                level,
                bits: Frame::DEFAULT_ZIP_BITS,
            })
        }
    }

    fn parse_encrypted(&mut self) -> Result<Frame> {
        self.consume('e')?;
        self.consume(':')?;
        self.consume('{')?;
        let key = self.parse_hex()?;
        self.consume(',')?;
        let nonce = self.parse_hex()?;
        self.consume(',')?;
        let subframe = Box::new(self.parse_frame()?);
        self.consume('}')?;
        Ok(Frame::Encrypted {
            key,
            nonce,
            subframe,
        })
    }

    fn parse_block_table(&mut self) -> Result<Frame> {
        self.consume('b')?;
        self.consume(':')?;

        let mut entries = Vec::new();
        if self.peek() == Some('{') {
            self.consume('{')?;
            loop {
                entries.push(self.parse_block_entry()?);
                if self.peek() == Some(',') {
                    self.consume(',')?;
                } else {
                    break;
                }
            }
            self.consume('}')?;
        } else {
            entries.push(self.parse_block_entry()?);
        }

        Ok(Frame::BlockTable { entries })
    }

    fn parse_block_entry(&mut self) -> Result<BlockTableEntry> {
        let (block_size, repeat) = if self.peek() == Some('*') {
            // Bare star: whole remainder in one block.
            self.consume('*')?;
            (-1, 1)
        } else {
            let mut size = self.parse_number()? as i64;
            match self.peek() {
                Some('K') => {
                    self.consume('K')?;
                    size *= 1024;
                }
                Some('M') => {
                    self.consume('M')?;
                    size *= 1024 * 1024;
                }
                _ => {}
            }

            let repeat = if self.peek() == Some('*') {
                self.consume('*')?;
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.parse_number()? as i64
                } else {
                    // Sized star with no count: repeat until exhausted.
                    -1
                }
            } else {
                1
            };

            (size, repeat)
        };

        self.consume('=')?;
        let frame = self.parse_frame()?;

        Ok(BlockTableEntry {
            block_size,
            repeat,
            frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_defaults() {
        let spec = EncodingSpec::parse("z").unwrap();
        assert_eq!(
            spec.frame(),
            &Frame::Zip {
                level: Frame::DEFAULT_ZIP_LEVEL,
                bits: Frame::DEFAULT_ZIP_BITS,
            }
        );
    }

    #[test]
    fn test_zip_default_bits() {
        let spec = EncodingSpec::parse("z:6").unwrap();
        assert_eq!(spec.frame(), &Frame::Zip { level: 6, bits: 15 });
    }

    #[test]
    fn test_zip_mpq() {
        let spec = EncodingSpec::parse("z:{6,mpq}").unwrap();
        assert_eq!(spec.frame(), &Frame::Zip { level: 6, bits: 0 });
    }

    #[test]
    fn test_encrypted_raw() {
        let spec = EncodingSpec::parse("e:{A6D4CFE470214878,FD4466FC,n}").unwrap();
        assert_eq!(
            spec.frame(),
            &Frame::Encrypted {
                key: "A6D4CFE470214878".to_string(),
                nonce: "FD4466FC".to_string(),
                subframe: Box::new(Frame::Raw),
            }
        );
    }

    #[test]
    fn test_encrypted_zip() {
        let spec = EncodingSpec::parse("e:{237DA26C65073F42,33F13F18,z}").unwrap();
        match spec.frame() {
            Frame::Encrypted {
                key,
                nonce,
                subframe,
            } => {
                assert_eq!(key, "237DA26C65073F42");
                assert_eq!(nonce, "33F13F18");
                assert!(matches!(**subframe, Frame::Zip { .. }));
            }
            other => panic!("expected encrypted frame, got {other:?}"),
        }
    }

    #[test]
    fn test_frame_equality() {
        assert_eq!(Frame::Raw, Frame::Raw);
        assert_eq!(
            Frame::Zip { level: 9, bits: 15 },
            Frame::Zip { level: 9, bits: 15 }
        );
        assert_eq!(
            EncodingSpec::parse("e:{237DA26C65073F42,33F13F18,n}").unwrap(),
            EncodingSpec::parse("e:{237DA26C65073F42,33F13F18,n}").unwrap(),
        );
    }

    #[test]
    fn test_block_table_entries() {
        let spec = EncodingSpec::parse("b:{22=n,54=z,192=n,24576=n,128=n,16384=n,*=z}").unwrap();
        let Frame::BlockTable { entries } = spec.frame() else {
            panic!("expected block table");
        };
        assert_eq!(entries.len(), 7);
        assert_eq!(entries[0].block_size, 22);
        assert_eq!(entries[0].repeat, 1);
        assert_eq!(entries[0].frame, Frame::Raw);
        assert_eq!(entries[6].block_size, -1);
    }

    #[test]
    fn test_block_table_units_and_repeats() {
        let spec = EncodingSpec::parse("b:{1M*3=z:9,16K*=n,*=z}").unwrap();
        let Frame::BlockTable { entries } = spec.frame() else {
            panic!("expected block table");
        };
        assert_eq!(entries[0].block_size, 1024 * 1024);
        assert_eq!(entries[0].repeat, 3);
        assert_eq!(entries[1].block_size, 16 * 1024);
        assert_eq!(entries[1].repeat, -1);
        assert_eq!(entries[2].block_size, -1);
    }

    #[test]
    fn test_grammar_samples() {
        // Representative specs seen in real encoding tables.
        for spec in [
            "n",
            "z",
            "z:9",
            "z:{9,15}",
            "z:{6,mpq}",
            "b:22=n",
            "b:{164=z,16K*565=z,1656=z}",
            "b:{256K*=e:{237DA26C65073F42,33F13F18,z}}",
        ] {
            let result = EncodingSpec::parse(spec);
            assert!(result.is_ok(), "{spec} failed: {result:?}");
        }
    }

    #[test]
    fn test_block_entry_requires_size() {
        // A block entry is always `size=frame`; a bare frame is malformed.
        assert!(matches!(
            EncodingSpec::parse("b:{1768=z,n}"),
            Err(Error::SpecSyntax { .. })
        ));
    }

    #[test]
    fn test_trailing_garbage() {
        assert!(matches!(
            EncodingSpec::parse("zz"),
            Err(Error::SpecSyntax { .. })
        ));
    }

    #[test]
    fn test_describe_frames() {
        let spec = EncodingSpec::parse("b:{4=n,8*2=z,*=n}").unwrap();
        let frames = spec.describe_frames(30).unwrap();
        let sizes: Vec<u64> = frames.iter().map(|(s, _)| *s).collect();
        assert_eq!(sizes, vec![4, 8, 8, 10]);
        assert_eq!(frames[0].1, &Frame::Raw);
        assert!(matches!(frames[1].1, Frame::Zip { .. }));
    }

    #[test]
    fn test_describe_frames_until_exhausted() {
        let spec = EncodingSpec::parse("b:{8*=n}").unwrap();
        let frames = spec.describe_frames(20).unwrap();
        let sizes: Vec<u64> = frames.iter().map(|(s, _)| *s).collect();
        assert_eq!(sizes, vec![8, 8, 4]);
    }

    #[test]
    fn test_describe_frames_overflow() {
        let spec = EncodingSpec::parse("b:{4=n}").unwrap();
        assert!(matches!(
            spec.describe_frames(5),
            Err(Error::InputExceedsSpec)
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for spec in ["n", "z", "z:6", "z:{6,mpq}", "e:{A6D4CFE470214878,FD4466FC,n}"] {
            let parsed = EncodingSpec::parse(spec).unwrap();
            assert_eq!(parsed.frame().to_string(), spec);
        }
    }
}
