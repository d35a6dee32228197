// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Minimal BER-TLV helpers for keycard responses
//!
//! Keycard objects use single byte tags with either a short length
//! (`< 0x80`) or a long form length prefix (`0x81..=0x84`) followed by
//! 1-4 big endian length bytes.

use crate::Error;

/// Keycard template tags
pub mod tags {
    /// Exported key template
    pub const KEY_TEMPLATE: u8 = 0xA1;
    /// Public key in an exported key template
    pub const PUBLIC_KEY: u8 = 0x80;
    /// Private key in an exported key template
    pub const PRIVATE_KEY: u8 = 0x81;
    /// Chain code in an exported key template
    pub const CHAIN_CODE: u8 = 0x82;
}

/// Decode a length field, returning `(length, bytes consumed)`
pub fn read_length(buff: &[u8]) -> Result<(usize, usize), Error> {
    let first = *buff.first().ok_or(Error::Truncated)?;

    match first {
        0x00..=0x7f => Ok((first as usize, 1)),
        0x81..=0x84 => {
            let n = (first & 0x7f) as usize;
            if buff.len() < 1 + n {
                return Err(Error::Truncated);
            }

            let len = buff[1..1 + n]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | *b as usize);

            Ok((len, 1 + n))
        }
        _ => Err(Error::InvalidLength(first)),
    }
}

/// Encode a length field
pub fn write_length(len: usize, buff: &mut Vec<u8>) {
    match len {
        0..=0x7f => buff.push(len as u8),
        0x80..=0xff => buff.extend_from_slice(&[0x81, len as u8]),
        0x100..=0xffff => buff.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]),
        _ => {
            buff.push(0x84);
            buff.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
}

/// Append a TLV object
pub fn encode(tag: u8, value: &[u8], buff: &mut Vec<u8>) {
    buff.push(tag);
    write_length(value.len(), buff);
    buff.extend_from_slice(value);
}

/// Iterator over the TLV objects at one nesting level
pub struct Objects<'a> {
    buff: &'a [u8],
}

impl<'a> Objects<'a> {
    pub fn new(buff: &'a [u8]) -> Self {
        Self { buff }
    }
}

impl<'a> Iterator for Objects<'a> {
    type Item = Result<(u8, &'a [u8]), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buff.is_empty() {
            return None;
        }

        let tag = self.buff[0];
        let (len, n) = match read_length(&self.buff[1..]) {
            Ok(v) => v,
            Err(e) => {
                self.buff = &[];
                return Some(Err(e));
            }
        };

        let start = 1 + n;
        if self.buff.len() < start + len {
            self.buff = &[];
            return Some(Err(Error::Truncated));
        }

        let value = &self.buff[start..start + len];
        self.buff = &self.buff[start + len..];

        Some(Ok((tag, value)))
    }
}

/// Locate a (possibly nested) tag, descending into each template in `path`
///
/// Returns `None` where any element of the path is missing or the
/// enclosing object is malformed.
pub fn find_tag<'a>(buff: &'a [u8], path: &[u8]) -> Option<&'a [u8]> {
    let (first, rest) = path.split_first()?;

    for o in Objects::new(buff) {
        let (tag, value) = o.ok()?;
        if tag != *first {
            continue;
        }

        return match rest.is_empty() {
            true => Some(value),
            false => find_tag(value, rest),
        };
    }

    None
}
