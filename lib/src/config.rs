// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pairing password keycards ship with
pub const DEFAULT_PAIRING_PASSWORD: &str = "KeycardDefaultPairing";

/// Orchestrator configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Grace period before asking the host to insert a card
    pub card_grace_ms: u64,

    /// Pairing password tried before prompting the host
    pub default_pairing_password: String,
}

impl Config {
    pub fn card_grace(&self) -> Duration {
        Duration::from_millis(self.card_grace_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            card_grace_ms: 150,
            default_pairing_password: DEFAULT_PAIRING_PASSWORD.to_string(),
        }
    }
}
