// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Interactive card flows
//!
//! Each [OperationKind] maps to a [Flow] whose `execute` composes the
//! base protocol helpers on [FlowContext]. Flows pause by awaiting
//! host input, which is delivered through the orchestrator.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use strum::{Display, EnumIter, EnumString};

use crate::OperationKind;

mod card_info;
pub use card_info::CardInfo;

mod context;
pub use context::FlowContext;
pub(crate) use context::Control;

mod error;
pub use error::FlowError;

mod app_info;
mod change;
mod export;
mod load;
mod login;
mod metadata;
mod sign;

/// Flow parameters and results
pub type Params = Map<String, Value>;

/// Parameter and result keys
pub mod params {
    pub const ERROR: &str = "error";
    pub const OK: &str = "ok";

    pub const PIN: &str = "pin";
    pub const NEW_PIN: &str = "new-pin";
    pub const NEW_PUK: &str = "new-puk";
    pub const PAIRING_PASS: &str = "pairing-pass";
    pub const NEW_PAIRING_PASS: &str = "new-pairing-pass";
    pub const MNEMONIC: &str = "mnemonic";
    pub const MNEMONIC_LEN: &str = "mnemonic-length";
    pub const MNEMONIC_INDEXES: &str = "mnemonic-indexes";
    pub const BIP44_PATH: &str = "bip44-path";
    pub const EXPORT_MASTER: &str = "export-master";
    pub const TX_HASH: &str = "tx-hash";
    pub const OVERWRITE: &str = "overwrite";
    pub const CARD_NAME: &str = "card-name";
    pub const WALLET_PATHS: &str = "wallet-paths";
    pub const FACTORY_RESET: &str = "factory reset";
    pub const RESOLVE_ADDR: &str = "resolve-addresses";

    pub const INSTANCE_UID: &str = "instance-uid";
    pub const KEY_UID: &str = "key-uid";
    pub const FREE_SLOTS: &str = "free-pairing-slots";
    pub const PIN_RETRIES: &str = "pin-retries";
    pub const PUK_RETRIES: &str = "puk-retries";
    pub const PAIRED: &str = "paired";
    pub const APP_INFO: &str = "application-info";
    pub const ENC_KEY: &str = "encryption-key";
    pub const WHISPER_KEY: &str = "whisper-key";
    pub const EIP1581_KEY: &str = "eip1581-key";
    pub const WALLET_ROOT_KEY: &str = "wallet-root-key";
    pub const WALLET_KEY: &str = "wallet-key";
    pub const MASTER_KEY: &str = "master-key";
    pub const EXPORTED_KEY: &str = "exported-key";
    pub const TX_SIGNATURE: &str = "tx-signature";
    pub const CARD_META: &str = "card-metadata";
}

/// Host actions requested by a paused flow
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Action {
    InsertCard,
    SwapCard,
    EnterPairing,
    EnterPin,
    EnterNewPin,
    EnterNewPuk,
    EnterNewPairing,
    EnterMnemonic,
    EnterName,
    EnterPath,
    EnterTxHash,
}

/// Notifications delivered to the host
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// Flow paused waiting for host input
    Paused { action: Action, event: Params },
    /// Card presented while the flow was waiting for one
    CardInserted,
    /// Flow finished with a result
    Completed(Params),
    /// Flow finished with an error result
    Errored(Params),
}

impl Notification {
    /// JSON signal form, `{ "type": ..., "event": ... }`
    pub fn to_json(&self) -> Value {
        match self {
            Notification::Paused { action, event } => json!({
                "type": format!("keycard.action.{action}"),
                "event": event,
            }),
            Notification::CardInserted => json!({
                "type": "keycard.action.card-inserted",
                "event": {},
            }),
            Notification::Completed(r) | Notification::Errored(r) => json!({
                "type": "keycard.flow-result",
                "event": r,
            }),
        }
    }

    /// Result object for completion notifications
    pub fn result(&self) -> Option<&Params> {
        match self {
            Notification::Completed(r) | Notification::Errored(r) => Some(r),
            _ => None,
        }
    }
}

/// Interactive flow executed by the orchestrator
#[async_trait]
pub trait Flow: Send {
    fn kind(&self) -> OperationKind;

    /// Run the flow from the top
    ///
    /// Returns [FlowError::Restart] to be re-run after a card swap,
    /// with parameters preserved and card info reset.
    async fn execute(&mut self, ctx: &mut FlowContext) -> Result<Params, FlowError>;
}

/// Construct the flow for an operation kind
pub fn create(kind: OperationKind) -> Box<dyn Flow> {
    use OperationKind::*;

    match kind {
        GetAppInfo => Box::new(app_info::GetAppInfo),
        Login => Box::new(login::Login),
        RecoverAccount => Box::new(login::RecoverAccount),
        LoadAccount => Box::new(load::LoadAccount),
        Sign => Box::new(sign::Sign),
        ChangePIN => Box::new(change::ChangeSecret::Pin),
        ChangePUK => Box::new(change::ChangeSecret::Puk),
        ChangePairing => Box::new(change::ChangeSecret::Pairing),
        ExportPublic => Box::new(export::ExportPublic),
        GetMetadata => Box::new(metadata::GetMetadata),
        StoreMetadata => Box::new(metadata::StoreMetadata),
    }
}
