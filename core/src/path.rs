// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Well-known derivation paths and path parsing

use crate::Error;

/// Hardened index flag
pub const HARDENED: u32 = 0x8000_0000;

/// Master key
pub const MASTER_PATH: &str = "m";
/// EIP-1581 root
pub const EIP1581_PATH: &str = "m/43'/60'/1581'";
/// Whisper (chat) key
pub const WHISPER_PATH: &str = "m/43'/60'/1581'/0'/0";
/// Database encryption key
pub const ENCRYPTION_PATH: &str = "m/43'/60'/1581'/1'/0";
/// Root of the default wallet account
pub const WALLET_ROOT_PATH: &str = "m/44'/60'/0'/0";
/// Default wallet
pub const WALLET_PATH: &str = "m/44'/60'/0'/0/0";

/// Parse an absolute derivation path (`m/44'/60'/0'/0/0`)
pub fn parse(path: &str) -> Result<Vec<u32>, Error> {
    let invalid = || Error::InvalidPath(path.to_string());

    let mut parts = path.trim().split('/');
    if parts.next() != Some("m") {
        return Err(invalid());
    }

    parts
        .map(|p| {
            let (n, hardened) = match p.strip_suffix('\'').or_else(|| p.strip_suffix('h')) {
                Some(n) => (n, true),
                None => (p, false),
            };

            let i: u32 = n.parse().map_err(|_| invalid())?;
            if i & HARDENED != 0 {
                return Err(invalid());
            }

            Ok(if hardened { i | HARDENED } else { i })
        })
        .collect()
}

/// Wallet index for paths directly below [`WALLET_ROOT_PATH`]
pub fn wallet_index(path: &str) -> Option<u32> {
    let p = parse(path).ok()?;
    let root = parse(WALLET_ROOT_PATH).ok()?;

    match p.split_last() {
        Some((i, prefix)) if prefix == root.as_slice() && i & HARDENED == 0 => Some(*i),
        _ => None,
    }
}

/// Wallet path for the provided index
pub fn wallet_path(index: u32) -> String {
    format!("{WALLET_ROOT_PATH}/{index}")
}
