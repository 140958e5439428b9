//! Octal escaping of names inside manifest text
//!
//! Manifest fields are space-separated, so names are written with every
//! byte outside the printable ASCII range `0x21..=0x7E`, plus the backslash
//! and `/`, replaced by a three-digit octal escape (`\040` for a space,
//! `\134` for a backslash). Multi-byte UTF-8 characters are escaped byte by
//! byte and reassembled on decode.

use std::fmt::Write;

/// Escape a single file or directory name
pub fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for &byte in name.as_bytes() {
        if needs_escape(byte) {
            // Writing to a String cannot fail
            let _ = write!(out, "\\{:03o}", byte);
        } else {
            out.push(byte as char);
        }
    }
    out
}

/// Escape a stream (directory) path, keeping `/` as the separator
pub fn escape_stream_name(path: &str) -> String {
    path.split('/')
        .map(escape_name)
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode an escaped token back into a UTF-8 string
///
/// Returns a description of the problem when an escape is truncated, is not
/// octal, overflows a byte, or the decoded bytes are not valid UTF-8.
pub fn unescape(token: &str) -> Result<String, String> {
    let bytes = token.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let digits = bytes
            .get(i + 1..i + 4)
            .ok_or_else(|| format!("truncated escape in {:?}", token))?;
        let mut value: u32 = 0;
        for &digit in digits {
            if !(b'0'..=b'7').contains(&digit) {
                return Err(format!("invalid octal escape in {:?}", token));
            }
            value = value * 8 + u32::from(digit - b'0');
        }
        let byte = u8::try_from(value)
            .map_err(|_| format!("octal escape out of range in {:?}", token))?;
        out.push(byte);
        i += 4;
    }

    String::from_utf8(out).map_err(|_| format!("escaped name is not valid UTF-8: {:?}", token))
}

fn needs_escape(byte: u8) -> bool {
    !(0x21..=0x7E).contains(&byte) || byte == b'\\' || byte == b'/'
}
