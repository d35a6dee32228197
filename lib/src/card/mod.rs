// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Card collaborator interfaces
//!
//! [CommandSet] is the command channel to a selected keycard applet
//! (APDU framing and secure channel cryptography live behind it),
//! [CardChannel] reports card presence and hands out command sets for
//! the connected card.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::Pairing;

mod session;
pub use session::Session;

/// Data slot holding card metadata
pub const PUBLIC_DATA: u8 = 0x00;

/// Command channel error type
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CardError {
    /// Card removed or connection lost
    #[error("Card disconnected")]
    Disconnected,

    /// Keycard applet missing from the card
    #[error("Keycard applet not installed")]
    NotInstalled,

    /// Card has not been initialised with PIN / PUK / pairing secret
    #[error("Card not initialised")]
    NotInitialized,

    /// All pairing slots in use
    #[error("No pairing slots available")]
    NoAvailableSlots,

    /// Pairing password rejected
    #[error("Invalid pairing password")]
    InvalidPairing,

    /// Secure channel could not be opened or is not open
    #[error("Secure channel error")]
    SecureChannel,

    /// PIN rejected, with the attempts the card reports remaining
    #[error("Wrong PIN ({remaining} attempts remaining)")]
    WrongPin { remaining: u8 },

    /// PUK rejected, with the attempts the card reports remaining
    #[error("Wrong PUK ({remaining} attempts remaining)")]
    WrongPuk { remaining: u8 },

    /// PIN verification refused, no attempts remaining
    #[error("PIN blocked")]
    Blocked,

    /// Command refused with a status word
    #[error("Command failed (status 0x{0:04x})")]
    Status(u16),

    /// Reader or transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// SELECT response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplicationInfo {
    pub instance_uid: Vec<u8>,
    pub key_uid: Vec<u8>,
    pub initialized: bool,
    pub available_slots: u8,
    pub app_version: u8,
    pub app_version_minor: u8,
    pub secure_channel_public_key: Vec<u8>,
}

/// GET STATUS response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplicationStatus {
    pub pin_retry_count: u8,
    pub puk_retry_count: u8,
    pub key_initialized: bool,
}

/// EXPORT KEY variants
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum ExportType {
    PrivateAndPublic,
    PublicOnly,
    ExtendedPublic,
}

/// Recoverable ECDSA signature
#[derive(Clone, Debug, PartialEq)]
pub struct RecoverableSignature {
    pub r: Vec<u8>,
    pub s: Vec<u8>,
    pub v: u8,
}

/// Command channel to a keycard applet
///
/// Implementations are stateful (selected applet, secure channel) and
/// must not be driven concurrently, see [Session].
#[async_trait]
pub trait CommandSet: Send {
    async fn select(&mut self) -> Result<ApplicationInfo, CardError>;

    async fn pair(&mut self, password: &str) -> Result<Pairing, CardError>;

    async fn open_secure_channel(&mut self, pairing: &Pairing) -> Result<(), CardError>;

    async fn verify_pin(&mut self, pin: &str) -> Result<(), CardError>;

    async fn get_status(&mut self) -> Result<ApplicationStatus, CardError>;

    /// Initialise a factory fresh card
    async fn init(&mut self, pin: &str, puk: &str, pairing_password: &str) -> Result<(), CardError>;

    async fn change_pin(&mut self, pin: &str) -> Result<(), CardError>;

    async fn change_puk(&mut self, puk: &str) -> Result<(), CardError>;

    async fn unblock_pin(&mut self, puk: &str, new_pin: &str) -> Result<(), CardError>;

    async fn change_pairing_secret(&mut self, password: &str) -> Result<(), CardError>;

    /// Generate mnemonic word indexes for the provided checksum size
    async fn generate_mnemonic(&mut self, checksum_size: u8) -> Result<Vec<u16>, CardError>;

    /// Load a BIP39 seed, returning the new key UID
    async fn load_seed(&mut self, seed: &[u8]) -> Result<Vec<u8>, CardError>;

    /// Export a key template (see [keycard_flow_core::ExportedKey])
    async fn export_key(
        &mut self,
        derive: bool,
        make_current: bool,
        path: &str,
        export_type: ExportType,
    ) -> Result<Vec<u8>, CardError>;

    /// Sign a 32 byte hash with the key at `path`, or the current key
    async fn sign(
        &mut self,
        hash: &[u8],
        path: Option<&str>,
    ) -> Result<RecoverableSignature, CardError>;

    async fn get_data(&mut self, tag: u8) -> Result<Vec<u8>, CardError>;

    async fn store_data(&mut self, tag: u8, data: &[u8]) -> Result<(), CardError>;

    async fn factory_reset(&mut self) -> Result<(), CardError>;
}

/// Card presence events
#[derive(Clone, Debug, PartialEq)]
pub enum CardEvent {
    /// Card connected, with its reader level UID
    Detected(String),
    /// Card removed
    Lost,
}

/// Card presence channel
pub trait CardChannel: Send + Sync {
    fn start_detection(&self) -> Result<(), CardError>;

    fn stop_detection(&self);

    /// Drop and re-detect the current card
    fn force_scan(&self);

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Subscribe to presence events
    fn subscribe(&self) -> broadcast::Receiver<CardEvent>;

    /// Fresh command set bound to the current connection
    fn command_set(&self) -> Box<dyn CommandSet>;
}
