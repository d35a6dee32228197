// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Simulated reader, presence events and command sets

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use keycard_flow::{
    card::{ApplicationInfo, ApplicationStatus, ExportType, RecoverableSignature},
    CardChannel, CardError, CardEvent, CommandSet, Pairing,
};

use crate::card::{security_not_satisfied, SimCard};

#[derive(Debug, Default)]
struct Reader {
    card: Option<SimCard>,
    detecting: bool,
    fail_detection: bool,
}

/// Simulated card reader
///
/// Presence events are only emitted while detection is running, the
/// card remains reachable through command sets regardless.
#[derive(Clone, Debug)]
pub struct SimChannel {
    reader: Arc<Mutex<Reader>>,
    events: broadcast::Sender<CardEvent>,
}

impl SimChannel {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);

        Self {
            reader: Arc::new(Mutex::new(Reader::default())),
            events,
        }
    }

    /// Make [CardChannel::start_detection] fail
    pub fn fail_detection(&self, fail: bool) {
        self.reader.lock().fail_detection = fail;
    }

    /// Present a card, replacing any current card
    pub fn insert(&self, card: &SimCard) {
        let detecting = {
            let mut r = self.reader.lock();
            r.card = Some(card.clone());
            r.detecting
        };

        debug!("Card {} inserted", card.instance_uid());

        if detecting {
            self.send(CardEvent::Detected(card.instance_uid()));
        }
    }

    /// Remove the current card
    pub fn remove(&self) {
        let (removed, detecting) = {
            let mut r = self.reader.lock();
            (r.card.take().is_some(), r.detecting)
        };

        if removed {
            debug!("Card removed");

            if detecting {
                self.send(CardEvent::Lost);
            }
        }
    }

    /// Re-announce the current card, as a reader would on a glitch
    pub fn redetect(&self) {
        let uid = self.reader.lock().card.as_ref().map(|c| c.instance_uid());
        if let Some(uid) = uid {
            self.send(CardEvent::Detected(uid));
        }
    }

    pub fn card(&self) -> Option<SimCard> {
        self.reader.lock().card.clone()
    }

    pub fn is_detecting(&self) -> bool {
        self.reader.lock().detecting
    }

    fn send(&self, e: CardEvent) {
        if self.events.send(e).is_err() {
            trace!("No presence subscribers");
        }
    }
}

impl Default for SimChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CardChannel for SimChannel {
    fn start_detection(&self) -> Result<(), CardError> {
        let uid = {
            let mut r = self.reader.lock();
            if r.fail_detection {
                return Err(CardError::Transport("no readers available".to_string()));
            }

            r.detecting = true;
            r.card.as_ref().map(|c| c.instance_uid())
        };

        if let Some(uid) = uid {
            self.send(CardEvent::Detected(uid));
        }

        Ok(())
    }

    fn stop_detection(&self) {
        self.reader.lock().detecting = false;
    }

    fn force_scan(&self) {
        let detecting = self.reader.lock().detecting;
        if !detecting {
            return;
        }

        self.send(CardEvent::Lost);
        self.redetect();
    }

    fn disconnect(&self) {
        self.remove();
    }

    fn is_connected(&self) -> bool {
        self.reader.lock().card.is_some()
    }

    fn subscribe(&self) -> broadcast::Receiver<CardEvent> {
        self.events.subscribe()
    }

    fn command_set(&self) -> Box<dyn CommandSet> {
        Box::new(SimSession {
            reader: self.reader.clone(),
            card: None,
            secure_channel: false,
            authenticated: false,
        })
    }
}

/// Command set bound to the first card it reaches
///
/// Commands fail with [CardError::Disconnected] once that card is
/// removed or replaced.
struct SimSession {
    reader: Arc<Mutex<Reader>>,
    card: Option<SimCard>,
    secure_channel: bool,
    authenticated: bool,
}

impl SimSession {
    fn card(&mut self) -> Result<SimCard, CardError> {
        let current = self
            .reader
            .lock()
            .card
            .clone()
            .ok_or(CardError::Disconnected)?;

        match &self.card {
            Some(c) if !c.ptr_eq(&current) => Err(CardError::Disconnected),
            Some(c) => Ok(c.clone()),
            None => {
                self.card = Some(current.clone());
                Ok(current)
            }
        }
    }

    fn secured(&mut self) -> Result<SimCard, CardError> {
        let c = self.card()?;
        match self.secure_channel {
            true => Ok(c),
            false => Err(CardError::SecureChannel),
        }
    }

    fn authenticated(&mut self) -> Result<SimCard, CardError> {
        let c = self.secured()?;
        match self.authenticated {
            true => Ok(c),
            false => Err(security_not_satisfied()),
        }
    }
}

#[async_trait]
impl CommandSet for SimSession {
    async fn select(&mut self) -> Result<ApplicationInfo, CardError> {
        let c = self.card()?;

        self.secure_channel = false;
        self.authenticated = false;

        Ok(c.select())
    }

    async fn pair(&mut self, password: &str) -> Result<Pairing, CardError> {
        self.card()?.pair(password)
    }

    async fn open_secure_channel(&mut self, pairing: &Pairing) -> Result<(), CardError> {
        self.card()?.check_pairing(pairing)?;

        self.secure_channel = true;
        self.authenticated = false;

        Ok(())
    }

    async fn verify_pin(&mut self, pin: &str) -> Result<(), CardError> {
        self.secured()?.verify_pin(pin)?;
        self.authenticated = true;
        Ok(())
    }

    async fn get_status(&mut self) -> Result<ApplicationStatus, CardError> {
        Ok(self.secured()?.status())
    }

    async fn init(&mut self, pin: &str, puk: &str, pairing_password: &str) -> Result<(), CardError> {
        self.card()?.init(pin, puk, pairing_password)
    }

    async fn change_pin(&mut self, pin: &str) -> Result<(), CardError> {
        self.authenticated()?.change_pin(pin)
    }

    async fn change_puk(&mut self, puk: &str) -> Result<(), CardError> {
        self.authenticated()?.change_puk(puk)
    }

    async fn unblock_pin(&mut self, puk: &str, new_pin: &str) -> Result<(), CardError> {
        self.secured()?.unblock_pin(puk, new_pin)
    }

    async fn change_pairing_secret(&mut self, password: &str) -> Result<(), CardError> {
        self.authenticated()?.change_pairing_secret(password)
    }

    async fn generate_mnemonic(&mut self, checksum_size: u8) -> Result<Vec<u16>, CardError> {
        self.secured()?.generate_mnemonic(checksum_size)
    }

    async fn load_seed(&mut self, seed: &[u8]) -> Result<Vec<u8>, CardError> {
        self.authenticated()?.load_seed(seed)
    }

    async fn export_key(
        &mut self,
        _derive: bool,
        make_current: bool,
        path: &str,
        export_type: ExportType,
    ) -> Result<Vec<u8>, CardError> {
        self.authenticated()?
            .export_key(make_current, path, export_type)
    }

    async fn sign(
        &mut self,
        hash: &[u8],
        path: Option<&str>,
    ) -> Result<RecoverableSignature, CardError> {
        self.authenticated()?.sign(hash, path)
    }

    async fn get_data(&mut self, tag: u8) -> Result<Vec<u8>, CardError> {
        self.card()?.get_data(tag)
    }

    async fn store_data(&mut self, tag: u8, data: &[u8]) -> Result<(), CardError> {
        self.authenticated()?.store_data(tag, data)
    }

    async fn factory_reset(&mut self) -> Result<(), CardError> {
        self.card()?.factory_reset();

        self.secure_channel = false;
        self.authenticated = false;

        Ok(())
    }
}
