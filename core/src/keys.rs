// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Exported key decoding and address derivation

use k256::ecdsa::SigningKey;
use serde::{ser::SerializeMap, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::{
    tlv::{self, tags},
    Error,
};

/// Length of an uncompressed secp256k1 public key
pub const PUBLIC_KEY_LEN: usize = 65;

/// Key material returned by an EXPORT KEY command
///
/// Fields are empty where the card did not return them.
#[derive(Clone, Default, PartialEq)]
pub struct ExportedKey {
    pub public_key: Vec<u8>,
    pub private_key: Vec<u8>,
    pub chain_code: Vec<u8>,
    pub address: String,
}

impl ExportedKey {
    /// Parse an exported key template, deriving the public key and
    /// address where possible
    pub fn parse(buff: &[u8]) -> Result<Self, Error> {
        let template = tlv::find_tag(buff, &[tags::KEY_TEMPLATE])
            .ok_or(Error::MissingTag(tags::KEY_TEMPLATE))?;

        let mut k = ExportedKey::default();
        for o in tlv::Objects::new(template) {
            let (tag, value) = o?;
            match tag {
                tags::PUBLIC_KEY => k.public_key = value.to_vec(),
                tags::PRIVATE_KEY => k.private_key = value.to_vec(),
                tags::CHAIN_CODE => k.chain_code = value.to_vec(),
                _ => (),
            }
        }

        if k.public_key.is_empty() && !k.private_key.is_empty() {
            k.public_key = public_from_private(&k.private_key)?;
        }

        if let Some(a) = address(&k.public_key) {
            k.address = a;
        }

        Ok(k)
    }

    /// Lossy form of [`ExportedKey::parse`], malformed input yields an empty key
    pub fn decode(buff: &[u8]) -> Self {
        match Self::parse(buff) {
            Ok(k) => k,
            Err(_e) => {
                #[cfg(feature = "log")]
                log::warn!("Discarding malformed exported key: {_e}");

                Self::default()
            }
        }
    }

    /// Check whether no key material was recovered
    pub fn is_empty(&self) -> bool {
        self.public_key.is_empty() && self.private_key.is_empty()
    }
}

impl core::fmt::Debug for ExportedKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExportedKey")
            .field("public_key", &hex::encode(&self.public_key))
            .field("private_key", &"<redacted>")
            .field("chain_code", &hex::encode(&self.chain_code))
            .field("address", &self.address)
            .finish()
    }
}

/// Hosts expect `0x` prefixed camelCase fields, omitting absent ones
impl Serialize for ExportedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut m = serializer.serialize_map(None)?;

        if !self.address.is_empty() {
            m.serialize_entry("address", &self.address)?;
        }
        if !self.public_key.is_empty() {
            m.serialize_entry("publicKey", &hex_0x(&self.public_key))?;
        }
        if !self.private_key.is_empty() {
            m.serialize_entry("privateKey", &hex_0x(&self.private_key))?;
        }
        if !self.chain_code.is_empty() {
            m.serialize_entry("chainCode", &hex_0x(&self.chain_code))?;
        }

        m.end()
    }
}

/// Derive the uncompressed public key for a secp256k1 private key
pub fn public_from_private(private_key: &[u8]) -> Result<Vec<u8>, Error> {
    let k = SigningKey::from_slice(private_key).map_err(|_| Error::InvalidKey)?;
    let p = k.verifying_key().to_encoded_point(false);
    Ok(p.as_bytes().to_vec())
}

/// Ethereum style address for an uncompressed public key
///
/// Returns `None` unless the key is 65 bytes with the `0x04` prefix.
pub fn address(public_key: &[u8]) -> Option<String> {
    if public_key.len() != PUBLIC_KEY_LEN || public_key[0] != 0x04 {
        return None;
    }

    let h = Keccak256::digest(&public_key[1..]);
    Some(hex_0x(&h[12..]))
}

/// Lower case hex with a `0x` prefix
pub fn hex_0x(b: &[u8]) -> String {
    format!("0x{}", hex::encode(b))
}
