//! Ribbit response parsing and checksum validation

use mail_parser::{MessageParser, PartType};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::{Error, Result};

const CHECKSUM_PREFIX: &[u8] = b"Checksum: ";

/// A parsed Ribbit response.
///
/// The first MIME payload is the content (a PSV document); the second is a
/// detached signature. Signature verification is an extension point; the
/// bytes are carried but not validated.
#[derive(Debug, Clone)]
pub struct RibbitResponse {
    data: Vec<u8>,
    content: String,
    signature: Vec<u8>,
    checksum: String,
}

impl RibbitResponse {
    /// Parse a raw response body.
    ///
    /// With `verify`, the SHA-256 of everything before the `Checksum:`
    /// epilogue must match the checksum it declares.
    pub fn parse(data: Vec<u8>, verify: bool) -> Result<Self> {
        let (message_bytes, checksum) = extract_checksum(&data);

        let checksum = match checksum {
            Some(checksum) => {
                if verify {
                    validate_checksum(message_bytes, &checksum)?;
                }
                checksum
            }
            None if verify => return Err(Error::MissingChecksum),
            None => String::new(),
        };

        let message = MessageParser::default()
            .parse(&data)
            .ok_or(Error::MimeParse)?;

        let mut content = None;
        let mut signature = Vec::new();
        for part in &message.parts {
            match &part.body {
                PartType::Text(text) if content.is_none() => {
                    content = Some(text.as_ref().to_string());
                }
                PartType::Text(text) if signature.is_empty() => {
                    signature = text.as_bytes().to_vec();
                }
                PartType::Binary(binary) if signature.is_empty() => {
                    signature = binary.as_ref().to_vec();
                }
                _ => {}
            }
        }

        let content = content.ok_or(Error::MimeParse)?;
        trace!(
            "ribbit response: {} content bytes, {} signature bytes",
            content.len(),
            signature.len()
        );

        Ok(Self {
            data,
            content,
            signature,
            checksum,
        })
    }

    /// The raw response bytes as received.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The first payload: the PSV document text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The detached signature payload.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The SHA-256 checksum declared in the epilogue.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

/// Split the raw response into (message bytes, checksum), if the epilogue
/// carries a `Checksum:` header.
fn extract_checksum(raw: &[u8]) -> (&[u8], Option<String>) {
    let Some(pos) = raw
        .windows(CHECKSUM_PREFIX.len())
        .rposition(|w| w == CHECKSUM_PREFIX)
    else {
        return (raw, None);
    };

    let hex_start = pos + CHECKSUM_PREFIX.len();
    let mut hex_end = raw[hex_start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(raw.len(), |p| hex_start + p);
    if hex_end > hex_start && raw[hex_end - 1] == b'\r' {
        hex_end -= 1;
    }

    let checksum = String::from_utf8_lossy(&raw[hex_start..hex_end]).to_string();
    if checksum.len() == 64 && checksum.chars().all(|c| c.is_ascii_hexdigit()) {
        (&raw[..pos], Some(checksum))
    } else {
        debug!("ignoring malformed checksum epilogue: {checksum:?}");
        (raw, None)
    }
}

/// Compare the SHA-256 of `message_bytes` against the declared checksum.
fn validate_checksum(message_bytes: &[u8], expected: &str) -> Result<()> {
    let mut hasher = Sha256::new();
    hasher.update(message_bytes);
    let actual = format!("{:x}", hasher.finalize());

    if actual != expected {
        return Err(Error::ChecksumMismatch {
            object: "ribbit response".to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
