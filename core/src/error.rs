// Copyright (c) 2022-2023 The MobileCoin Foundation

/// Keycard primitive error type
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    /// Object ended before the declared length
    #[error("Truncated TLV object")]
    Truncated,

    /// Unsupported length prefix
    #[error("Invalid TLV length prefix (0x{0:02x})")]
    InvalidLength(u8),

    /// Required tag not present
    #[error("Missing TLV tag 0x{0:02x}")]
    MissingTag(u8),

    /// Private key is not a valid secp256k1 scalar
    #[error("Invalid private key")]
    InvalidKey,

    /// Derivation path could not be parsed
    #[error("Invalid derivation path '{0}'")]
    InvalidPath(String),

    /// Mnemonic word count outside the BIP39 set
    #[error("Unsupported mnemonic length ({0} words)")]
    MnemonicLength(usize),

    /// PBKDF2 rejected the output length
    #[error("Seed derivation failed")]
    Seed,

    /// Card name does not fit the metadata header
    #[error("Card name too long ({0} bytes, max 20)")]
    NameTooLong(usize),

    /// Metadata header carries an unknown version
    #[error("Unsupported metadata version ({0})")]
    MetadataVersion(u8),

    /// Metadata name is not valid UTF-8
    #[error("Invalid metadata name encoding")]
    NameEncoding,

    /// Metadata lists more wallets than supported
    #[error("Too many wallets in metadata")]
    TooManyWallets,

    /// Variable length integer overflowed or was truncated
    #[error("Malformed varint")]
    Varint,
}
