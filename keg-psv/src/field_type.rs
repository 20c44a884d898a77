//! Typed column annotations

use crate::error::{Error, Result};
use std::fmt;

/// A column type annotation from the raw header, e.g. `STRING:0`, `HEX:32`,
/// `DEC:4`.
///
/// The width is advisory; version servers routinely serve values that do not
/// match it, so it is carried but never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String(u32),
    Hex(u32),
    Decimal(u32),
}

impl FieldType {
    /// Parse a `TYPE:WIDTH` annotation. Type names are case-insensitive.
    pub fn parse(s: &str) -> Result<Self> {
        let (name, width) = match s.split_once(':') {
            Some((name, width)) => {
                let width = width
                    .parse::<u32>()
                    .map_err(|_| Error::InvalidFieldType {
                        field_type: s.to_string(),
                    })?;
                (name, width)
            }
            None => (s, 0),
        };

        match name.to_ascii_uppercase().as_str() {
            "STRING" => Ok(Self::String(width)),
            "HEX" => Ok(Self::Hex(width)),
            "DEC" => Ok(Self::Decimal(width)),
            _ => Err(Error::InvalidFieldType {
                field_type: s.to_string(),
            }),
        }
    }

    /// True for `HEX` columns, whose values are normalized to lowercase
    /// before they reach the metadata database.
    pub fn is_hex(&self) -> bool {
        matches!(self, Self::Hex(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(w) => write!(f, "STRING:{w}"),
            Self::Hex(w) => write!(f, "HEX:{w}"),
            Self::Decimal(w) => write!(f, "DEC:{w}"),
        }
    }
}
