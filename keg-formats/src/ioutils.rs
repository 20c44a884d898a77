//! Internal byte-reading helpers

use crate::{Error, Result};
use std::io::Read;

/// Read a NUL-terminated UTF-8 string. EOF terminates like NUL does.
pub(crate) fn read_cstr<R: Read>(f: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    let mut buf = [0u8; 1];

    loop {
        if f.read(&mut buf)? == 0 || buf[0] == 0 {
            break;
        }
        bytes.push(buf[0]);
    }

    String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
}
