// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Serialised handle to a [CommandSet]

use std::sync::Arc;

use log::debug;
use tokio::sync::Mutex;

use super::{
    ApplicationInfo, ApplicationStatus, CardError, CommandSet, ExportType, RecoverableSignature,
};
use crate::Pairing;

/// Shared command set for the current card connection
///
/// Each call holds the command set lock for its whole duration, as
/// interleaved commands corrupt secure channel state. Failures are
/// recorded and available through [Session::last_error].
#[derive(Clone)]
pub struct Session {
    cmd: Arc<Mutex<Box<dyn CommandSet>>>,
    last_error: Arc<parking_lot::Mutex<Option<String>>>,
}

impl From<Box<dyn CommandSet>> for Session {
    fn from(cmd: Box<dyn CommandSet>) -> Self {
        Self {
            cmd: Arc::new(Mutex::new(cmd)),
            last_error: Arc::new(parking_lot::Mutex::new(None)),
        }
    }
}

impl Session {
    /// Message for the most recent failed command
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn record<T>(&self, op: &str, r: Result<T, CardError>) -> Result<T, CardError> {
        match &r {
            Ok(_) => *self.last_error.lock() = None,
            Err(e) => {
                debug!("Card {op} failed: {e}");
                *self.last_error.lock() = Some(e.to_string());
            }
        }
        r
    }

    pub async fn select(&self) -> Result<ApplicationInfo, CardError> {
        let r = self.cmd.lock().await.select().await;
        self.record("select", r)
    }

    pub async fn pair(&self, password: &str) -> Result<Pairing, CardError> {
        let r = self.cmd.lock().await.pair(password).await;
        self.record("pair", r)
    }

    pub async fn open_secure_channel(&self, pairing: &Pairing) -> Result<(), CardError> {
        let r = self.cmd.lock().await.open_secure_channel(pairing).await;
        self.record("open secure channel", r)
    }

    pub async fn verify_pin(&self, pin: &str) -> Result<(), CardError> {
        let r = self.cmd.lock().await.verify_pin(pin).await;
        self.record("verify pin", r)
    }

    pub async fn get_status(&self) -> Result<ApplicationStatus, CardError> {
        let r = self.cmd.lock().await.get_status().await;
        self.record("get status", r)
    }

    pub async fn init(&self, pin: &str, puk: &str, pairing_password: &str) -> Result<(), CardError> {
        let r = self.cmd.lock().await.init(pin, puk, pairing_password).await;
        self.record("init", r)
    }

    pub async fn change_pin(&self, pin: &str) -> Result<(), CardError> {
        let r = self.cmd.lock().await.change_pin(pin).await;
        self.record("change pin", r)
    }

    pub async fn change_puk(&self, puk: &str) -> Result<(), CardError> {
        let r = self.cmd.lock().await.change_puk(puk).await;
        self.record("change puk", r)
    }

    pub async fn unblock_pin(&self, puk: &str, new_pin: &str) -> Result<(), CardError> {
        let r = self.cmd.lock().await.unblock_pin(puk, new_pin).await;
        self.record("unblock pin", r)
    }

    pub async fn change_pairing_secret(&self, password: &str) -> Result<(), CardError> {
        let r = self.cmd.lock().await.change_pairing_secret(password).await;
        self.record("change pairing secret", r)
    }

    pub async fn generate_mnemonic(&self, checksum_size: u8) -> Result<Vec<u16>, CardError> {
        let r = self.cmd.lock().await.generate_mnemonic(checksum_size).await;
        self.record("generate mnemonic", r)
    }

    pub async fn load_seed(&self, seed: &[u8]) -> Result<Vec<u8>, CardError> {
        let r = self.cmd.lock().await.load_seed(seed).await;
        self.record("load seed", r)
    }

    pub async fn export_key(
        &self,
        derive: bool,
        make_current: bool,
        path: &str,
        export_type: ExportType,
    ) -> Result<Vec<u8>, CardError> {
        let r = self
            .cmd
            .lock()
            .await
            .export_key(derive, make_current, path, export_type)
            .await;
        self.record("export key", r)
    }

    pub async fn sign(
        &self,
        hash: &[u8],
        path: Option<&str>,
    ) -> Result<RecoverableSignature, CardError> {
        let r = self.cmd.lock().await.sign(hash, path).await;
        self.record("sign", r)
    }

    pub async fn get_data(&self, tag: u8) -> Result<Vec<u8>, CardError> {
        let r = self.cmd.lock().await.get_data(tag).await;
        self.record("get data", r)
    }

    pub async fn store_data(&self, tag: u8, data: &[u8]) -> Result<(), CardError> {
        let r = self.cmd.lock().await.store_data(tag, data).await;
        self.record("store data", r)
    }

    pub async fn factory_reset(&self) -> Result<(), CardError> {
        let r = self.cmd.lock().await.factory_reset().await;
        self.record("factory reset", r)
    }
}
