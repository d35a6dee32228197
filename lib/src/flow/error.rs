// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::CardError;

/// Flow termination reasons
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Host cancelled the flow
    #[error("Flow cancelled")]
    Cancelled,

    /// Flow requested a restart (card swap)
    #[error("Flow restart requested")]
    Restart,

    /// Applet selection failed
    #[error("Failed to select keycard applet")]
    SelectFailed,

    /// Card must be initialised first
    #[error("Card not initialised")]
    NotInitialized,

    /// Card has no free pairing slots
    #[error("No pairing slots available")]
    NoSlots,

    /// Pairing password rejected
    #[error("Pairing failed")]
    PairingFailed,

    /// Secure channel could not be opened with the stored pairing
    #[error("Failed to open secure channel")]
    SecureChannelFailed,

    /// PIN attempts exhausted
    #[error("PIN blocked")]
    PinBlocked,

    /// Parameter present but unusable
    #[error("Invalid parameter '{0}'")]
    InvalidParam(&'static str),

    /// Card refused a PIN / PUK / pairing secret change
    #[error("Secret change rejected")]
    ChangeFailed,

    /// Key export returned no usable key
    #[error("Key export failed")]
    ExportFailed,

    /// Card refused factory reset
    #[error("Factory reset failed")]
    FactoryResetFailed,

    /// No command set available for the card
    #[error("No card session")]
    NoSession,

    /// Card command failure
    #[error("Card error: {0}")]
    Card(#[from] CardError),

    /// Decoding or derivation failure
    #[error("{0}")]
    Core(#[from] keycard_flow_core::Error),

    /// Result encoding failure
    #[error("Result encoding: {0}")]
    Json(#[from] serde_json::Error),

    /// Flow panicked
    #[error("Internal error")]
    Internal,
}

impl FlowError {
    /// Stable code reported in the result `error` field
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::Cancelled => "cancelled",
            FlowError::Restart => "restart",
            FlowError::SelectFailed => "select-failed",
            FlowError::NotInitialized => "not-initialized",
            FlowError::NoSlots => "no-slots",
            FlowError::PairingFailed => "pairing-failed",
            FlowError::SecureChannelFailed => "secure-channel-failed",
            FlowError::PinBlocked => "pin-blocked",
            FlowError::InvalidParam(_) => "invalid-param",
            FlowError::ChangeFailed => "change-failed",
            FlowError::ExportFailed => "export-failed",
            FlowError::FactoryResetFailed => "factory-reset-failed",
            FlowError::NoSession => "no-session",
            FlowError::Card(CardError::Disconnected) => "connection-error",
            FlowError::Card(_) => "card-error",
            FlowError::Core(_) | FlowError::Json(_) | FlowError::Internal => "internal-error",
        }
    }

    /// Map a card failure to `fallback`, keeping disconnects visible
    pub(crate) fn from_card(e: CardError, fallback: FlowError) -> FlowError {
        match e {
            CardError::Disconnected => FlowError::Card(e),
            _ => fallback,
        }
    }

    /// Errors that may stem from the card going away mid command
    pub(crate) fn is_card_failure(&self) -> bool {
        matches!(
            self,
            FlowError::Card(_)
                | FlowError::SelectFailed
                | FlowError::PairingFailed
                | FlowError::SecureChannelFailed
                | FlowError::ChangeFailed
                | FlowError::ExportFailed
                | FlowError::FactoryResetFailed
        )
    }
}
