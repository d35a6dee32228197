// Copyright (c) 2022-2023 The MobileCoin Foundation

//! BIP39 mnemonic helpers

use hmac::Hmac;
use sha2::Sha512;
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::Error;

/// PBKDF2 rounds for BIP39 seed derivation
pub const SEED_ROUNDS: u32 = 2048;

/// BIP39 seed length
pub const SEED_LEN: usize = 64;

/// Mnemonic derived seed, cleared on drop
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    /// Derive the BIP39 seed for a mnemonic and optional passphrase
    pub fn derive(mnemonic: &str, passphrase: &str) -> Result<Self, Error> {
        let words: Vec<&str> = mnemonic.split_whitespace().collect();
        let password = Zeroizing::new(words.join(" ").nfkd().collect::<String>());
        let salt = Zeroizing::new(format!("mnemonic{}", passphrase.nfkd().collect::<String>()));

        let mut s = [0u8; SEED_LEN];
        pbkdf2::pbkdf2::<Hmac<Sha512>>(password.as_bytes(), salt.as_bytes(), SEED_ROUNDS, &mut s)
            .map_err(|_| Error::Seed)?;

        Ok(Self(s))
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for Seed {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for Seed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Seed(<redacted>)")
    }
}

/// Checksum size (in bits) the card expects for a mnemonic of `words` words
pub fn checksum_size(words: usize) -> Result<u8, Error> {
    match words {
        12 | 15 | 18 | 21 | 24 => Ok((words / 3) as u8),
        _ => Err(Error::MnemonicLength(words)),
    }
}
