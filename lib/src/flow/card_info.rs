// Copyright (c) 2022-2023 The MobileCoin Foundation

use serde_json::Value;

use keycard_flow_core::keys::hex_0x;

use super::{params, Params};
use crate::card::{ApplicationInfo, ApplicationStatus};

/// Counter value before the card has been queried
pub const UNKNOWN: i32 = -1;

/// Card details cached by a flow
#[derive(Clone, Debug, PartialEq)]
pub struct CardInfo {
    /// Applet instance UID (hex)
    pub instance_uid: String,
    /// Key UID (`0x` hex), empty when no keys are loaded
    pub key_uid: String,
    pub initialized: bool,
    pub key_initialized: bool,
    pub free_slots: i32,
    pub pin_retries: i32,
    pub puk_retries: i32,
    /// Applet version as `major << 8 | minor`
    pub version: i32,
}

impl Default for CardInfo {
    fn default() -> Self {
        Self {
            instance_uid: String::new(),
            key_uid: String::new(),
            initialized: false,
            key_initialized: false,
            free_slots: UNKNOWN,
            pin_retries: UNKNOWN,
            puk_retries: UNKNOWN,
            version: 0,
        }
    }
}

impl CardInfo {
    /// Update from a SELECT response, retry counters become unknown
    pub fn update(&mut self, info: &ApplicationInfo) {
        self.instance_uid = hex::encode(&info.instance_uid);
        self.key_uid = match info.key_uid.is_empty() {
            true => String::new(),
            false => hex_0x(&info.key_uid),
        };
        self.initialized = info.initialized;
        self.key_initialized = !info.key_uid.is_empty();
        self.free_slots = info.available_slots as i32;
        self.version = ((info.app_version as i32) << 8) | info.app_version_minor as i32;
        self.pin_retries = UNKNOWN;
        self.puk_retries = UNKNOWN;
    }

    /// Update retry counters from a GET STATUS response
    pub fn update_status(&mut self, status: &ApplicationStatus) {
        self.pin_retries = status.pin_retry_count as i32;
        self.puk_retries = status.puk_retry_count as i32;
        self.key_initialized = status.key_initialized;
    }

    /// Applet version as `major.minor`
    pub fn version_string(&self) -> String {
        format!("{}.{}", (self.version >> 8) & 0xff, self.version & 0xff)
    }

    /// Known fields in host form
    pub fn to_params(&self) -> Params {
        let mut p = Params::new();

        if !self.instance_uid.is_empty() {
            p.insert(params::INSTANCE_UID.into(), Value::from(self.instance_uid.clone()));
        }
        if !self.key_uid.is_empty() {
            p.insert(params::KEY_UID.into(), Value::from(self.key_uid.clone()));
        }
        if self.free_slots >= 0 {
            p.insert(params::FREE_SLOTS.into(), Value::from(self.free_slots));
        }
        if self.pin_retries >= 0 {
            p.insert(params::PIN_RETRIES.into(), Value::from(self.pin_retries));
            p.insert(params::PUK_RETRIES.into(), Value::from(self.puk_retries));
        }

        p
    }
}
