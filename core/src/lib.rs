// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Keycard flow engine primitives
//!
//! Pure building blocks shared by the flow engine and card simulator:
//! TLV parsing, exported key decoding, mnemonic seed derivation,
//! card metadata encoding and well-known derivation paths.
//! Nothing in this crate performs I/O.

mod error;
pub use error::Error;

pub mod keys;
pub mod metadata;
pub mod mnemonic;
pub mod path;
pub mod tlv;

pub use keys::ExportedKey;
pub use metadata::Metadata;
pub use mnemonic::Seed;
