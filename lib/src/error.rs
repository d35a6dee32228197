// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::CardError;

/// Orchestrator control error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A flow is already in progress
    #[error("Flow already running")]
    AlreadyRunning,

    /// Resume requested while the flow is not paused
    #[error("Flow is not paused")]
    NotPaused,

    /// No flow to resume
    #[error("No flow in progress")]
    NoOperation,

    /// Card channel or pairing storage missing
    #[error("Orchestrator not configured")]
    NotConfigured,

    /// Unknown flow discriminant
    #[error("Invalid flow kind ({0})")]
    InvalidKind(i32),

    /// Card detection could not be started
    #[error("Card detection failed: {0}")]
    Detection(CardError),

    /// Pairing storage could not be read or written
    #[error("Pairing storage I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Pairing storage could not be encoded
    #[error("Pairing storage encoding: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable code reported to hosts
    pub fn code(&self) -> &'static str {
        match self {
            Error::AlreadyRunning => "already-running",
            Error::NotPaused => "not-paused",
            Error::NoOperation => "no-operation",
            Error::NotConfigured => "not-configured",
            Error::InvalidKind(_) => "invalid-kind",
            Error::Detection(_) => "detection-failed",
            Error::Io(_) | Error::Json(_) => "storage-error",
        }
    }
}
