// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Card metadata stored in the public data slot
//!
//! Layout: a header byte holding the version (top 3 bits) and name
//! length (low 5 bits), the UTF-8 name, then wallet indexes packed as
//! LEB128 `(start, count)` pairs where each pair covers the
//! consecutive indexes `start..=start + count`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{path, Error};

/// Current metadata version
pub const VERSION: u8 = 1;

/// Maximum card name length in bytes
pub const MAX_NAME_LEN: usize = 20;

/// Maximum number of wallet indexes held in metadata
pub const MAX_WALLETS: usize = 1024;

/// Card name and wallets in use
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub wallets: BTreeSet<u32>,
}

impl Metadata {
    pub fn new(name: &str, wallets: impl IntoIterator<Item = u32>) -> Result<Self, Error> {
        if name.len() > MAX_NAME_LEN {
            return Err(Error::NameTooLong(name.len()));
        }

        let wallets: BTreeSet<u32> = wallets.into_iter().collect();
        if wallets.len() > MAX_WALLETS {
            return Err(Error::TooManyWallets);
        }

        Ok(Self {
            name: name.to_string(),
            wallets,
        })
    }

    /// Wallet paths, in index order
    pub fn wallet_paths(&self) -> Vec<String> {
        self.wallets.iter().map(|i| path::wallet_path(*i)).collect()
    }

    /// Encode for storage on the card
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let name = self.name.as_bytes();
        if name.len() > MAX_NAME_LEN {
            return Err(Error::NameTooLong(name.len()));
        }

        let mut buff = Vec::with_capacity(1 + name.len() + self.wallets.len());
        buff.push((VERSION << 5) | name.len() as u8);
        buff.extend_from_slice(name);

        for (start, count) in ranges(&self.wallets) {
            write_varint(start, &mut buff);
            write_varint(count, &mut buff);
        }

        Ok(buff)
    }

    /// Decode metadata read from the card
    pub fn decode(buff: &[u8]) -> Result<Self, Error> {
        let header = *buff.first().ok_or(Error::Truncated)?;

        let version = header >> 5;
        if version != VERSION {
            return Err(Error::MetadataVersion(version));
        }

        let name_len = (header & 0x1f) as usize;
        if buff.len() < 1 + name_len {
            return Err(Error::Truncated);
        }

        let name = core::str::from_utf8(&buff[1..1 + name_len])
            .map_err(|_| Error::NameEncoding)?
            .to_string();

        let mut wallets = BTreeSet::new();
        let mut total = 0usize;
        let mut rest = &buff[1 + name_len..];
        while !rest.is_empty() {
            let (start, n) = read_varint(rest)?;
            let (count, m) = read_varint(&rest[n..])?;
            rest = &rest[n + m..];

            // Runs are sized by card data, check before expanding
            total = total.saturating_add(count as usize).saturating_add(1);
            if total > MAX_WALLETS {
                return Err(Error::TooManyWallets);
            }

            let end = start.checked_add(count).ok_or(Error::Varint)?;
            wallets.extend(start..=end);
        }

        Ok(Self { name, wallets })
    }
}

/// Collapse sorted indexes into `(start, count)` runs
fn ranges(indexes: &BTreeSet<u32>) -> Vec<(u32, u32)> {
    let mut r: Vec<(u32, u32)> = vec![];

    for i in indexes {
        match r.last_mut() {
            Some((start, count)) if start.checked_add(*count + 1) == Some(*i) => *count += 1,
            _ => r.push((*i, 0)),
        }
    }

    r
}

fn write_varint(mut v: u32, buff: &mut Vec<u8>) {
    while v >= 0x80 {
        buff.push((v as u8) | 0x80);
        v >>= 7;
    }
    buff.push(v as u8);
}

fn read_varint(buff: &[u8]) -> Result<(u32, usize), Error> {
    let mut v = 0u64;

    for (i, b) in buff.iter().enumerate().take(5) {
        v |= ((b & 0x7f) as u64) << (7 * i);

        if b & 0x80 == 0 {
            return u32::try_from(v).map(|v| (v, i + 1)).map_err(|_| Error::Varint);
        }
    }

    Err(Error::Varint)
}
