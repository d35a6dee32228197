// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Flow base protocol
//!
//! [FlowContext] carries a flow's parameters and cached card info, and
//! provides the card interaction and pause / resume / cancel helpers
//! flows are composed from.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, watch};

use keycard_flow_core::ExportedKey;

use super::{params, Action, CardInfo, FlowError, Notification, Params};
use crate::{
    card::{CardError, ExportType},
    OperationState, Orchestrator, Pairing, PairingStore, Session,
};

/// Cancel flag and pending resume slot shared between a flow and the
/// orchestrator
pub(crate) struct Control {
    cancel: watch::Sender<bool>,
    resume: Mutex<Option<oneshot::Sender<Params>>>,
}

impl Control {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);

        Self {
            cancel,
            resume: Mutex::new(None),
        }
    }

    /// Set the cancel flag, waking any paused wait
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
        self.resume.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Install the sender for the next resume
    pub fn arm(&self, tx: oneshot::Sender<Params>) {
        *self.resume.lock() = Some(tx);
    }

    /// Take the pending resume sender, if the flow is waiting
    pub fn take_resume(&self) -> Option<oneshot::Sender<Params>> {
        self.resume.lock().take()
    }
}

/// Resolves once the cancel flag is set
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Execution context for a single flow
pub struct FlowContext {
    engine: Orchestrator,
    control: Arc<Control>,
    params: Params,
    card: CardInfo,
    restart: bool,
}

impl FlowContext {
    pub(crate) fn new(engine: Orchestrator, control: Arc<Control>, params: Params) -> Self {
        Self {
            engine,
            control,
            params,
            card: CardInfo::default(),
            restart: false,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Fetch a non-empty string parameter
    pub fn param_str(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn param_bool(&self, key: &str) -> bool {
        self.params.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn set_param(&mut self, key: &str, value: impl Into<Value>) {
        self.params.insert(key.to_string(), value.into());
    }

    pub fn remove_param(&mut self, key: &str) -> Option<Value> {
        self.params.remove(key)
    }

    pub fn card(&self) -> &CardInfo {
        &self.card
    }

    pub(crate) fn card_mut(&mut self) -> &mut CardInfo {
        &mut self.card
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    fn check_cancelled(&self) -> Result<(), FlowError> {
        match self.is_cancelled() {
            true => Err(FlowError::Cancelled),
            false => Ok(()),
        }
    }

    /// Whether a restart has been requested
    pub fn restart_requested(&self) -> bool {
        self.restart
    }

    /// Prepare to re-run the flow, keeping parameters
    pub(crate) fn restart(&mut self) {
        self.card = CardInfo::default();
        self.restart = false;
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    /// Session for the current card connection
    pub fn session(&self) -> Result<Session, FlowError> {
        self.engine.session().ok_or(FlowError::NoSession)
    }

    pub fn force_scan(&self) {
        if let Some(c) = self.engine.channel() {
            c.force_scan();
        }
    }

    /// Success result carrying known card info
    pub fn ok_result(&self) -> Params {
        let mut p = Params::new();
        p.insert(params::ERROR.into(), params::OK.into());
        p.extend(self.card.to_params());
        p
    }

    /// Error result carrying known card info
    pub fn error_result(&self, e: &FlowError) -> Params {
        let mut p = Params::new();
        p.insert(params::ERROR.into(), e.code().into());
        p.extend(self.card.to_params());
        p
    }

    /// Wait until a card is connected
    ///
    /// Absorbs short reconnects with a grace period before asking the
    /// host to insert a card. Fails only when cancelled.
    pub async fn wait_for_card(&mut self) -> Result<(), FlowError> {
        if self.is_connected() {
            return Ok(());
        }

        tokio::time::sleep(self.engine.config().card_grace()).await;
        self.check_cancelled()?;

        if self.is_connected() {
            return Ok(());
        }

        loop {
            self.pause_and_wait(Action::InsertCard, "connection-error")
                .await?;

            if self.is_connected() {
                info!("Card inserted");
                self.engine.emit(Notification::CardInserted);
                return Ok(());
            }
        }
    }

    /// Wait for a card and select the keycard applet
    pub async fn select_keycard(&mut self) -> Result<(), FlowError> {
        self.wait_for_card().await?;

        let info = self
            .session()?
            .select()
            .await
            .map_err(|e| FlowError::from_card(e, FlowError::SelectFailed))?;

        self.card.update(&info);

        debug!(
            "Selected card {} (version: {}, initialized: {}, keys: {})",
            self.card.instance_uid,
            self.card.version_string(),
            self.card.initialized,
            self.card.key_initialized
        );

        Ok(())
    }

    /// Open a secure channel, pairing first where required, and
    /// optionally verify the PIN
    pub async fn open_secure_channel_and_authenticate(
        &mut self,
        authenticate: bool,
    ) -> Result<(), FlowError> {
        if !self.card.initialized {
            return Err(FlowError::NotInitialized);
        }

        let uid = self.card.instance_uid.clone();

        let stored = self
            .engine
            .pairings()
            .and_then(|p| p.lock().load_pairing(&uid));

        let pairing = match stored {
            Some(p) => {
                debug!("Using stored pairing for {uid} (slot {})", p.index);
                p
            }
            None => self.pair().await?,
        };

        if let Err(e) = self.session()?.open_secure_channel(&pairing).await {
            if e == CardError::Disconnected || !self.is_connected() {
                return Err(e.into());
            }

            warn!("Failed to open secure channel with {uid}: {e}");
            self.forget_pairing(&uid).await;

            return Err(FlowError::SecureChannelFailed);
        }

        self.refresh_status().await;

        if authenticate {
            self.verify_pin().await?;
        }

        Ok(())
    }

    /// Pair with the card, trying the default password before asking
    /// the host
    async fn pair(&mut self) -> Result<Pairing, FlowError> {
        let default_password = self.engine.config().default_pairing_password.clone();

        let pairing = match self.session()?.pair(&default_password).await {
            Ok(p) => p,
            Err(CardError::NoAvailableSlots) => return Err(FlowError::NoSlots),
            Err(CardError::Disconnected) => return Err(CardError::Disconnected.into()),
            Err(e) => {
                debug!("Default pairing password rejected: {e}");

                let password = match self.param_str(params::PAIRING_PASS) {
                    Some(p) => p,
                    None => {
                        self.pause_and_wait(Action::EnterPairing, "enter-pairing")
                            .await?;
                        self.param_str(params::PAIRING_PASS)
                            .ok_or(FlowError::PairingFailed)?
                    }
                };

                self.session()?
                    .pair(&password)
                    .await
                    .map_err(|e| match e {
                        CardError::NoAvailableSlots => FlowError::NoSlots,
                        _ => FlowError::from_card(e, FlowError::PairingFailed),
                    })?
            }
        };

        let uid = self.card.instance_uid.clone();
        info!("Paired with card {uid} (slot {})", pairing.index);

        self.persist_pairing(&uid, pairing.clone()).await;

        Ok(pairing)
    }

    async fn persist_pairing(&self, uid: &str, pairing: Pairing) {
        let store = match self.engine.pairings() {
            Some(s) => s,
            None => {
                warn!("No pairing store, pairing for {uid} will not persist");
                return;
            }
        };

        store.lock().store_pairing(uid, pairing);

        if let Err(e) = PairingStore::save_shared(store).await {
            warn!("Failed to persist pairing for {uid}, usable this session only: {e}");
        }
    }

    async fn forget_pairing(&self, uid: &str) {
        let store = match self.engine.pairings() {
            Some(s) => s,
            None => return,
        };

        if !store.lock().remove_pairing(uid) {
            return;
        }

        info!("Removed stale pairing for {uid}");

        if let Err(e) = PairingStore::save_shared(store).await {
            warn!("Failed to persist pairing removal for {uid}: {e}");
        }
    }

    /// Refresh retry counters, failures leave them unchanged
    async fn refresh_status(&mut self) {
        let session = match self.session() {
            Ok(s) => s,
            Err(_) => return,
        };

        match session.get_status().await {
            Ok(s) => self.card.update_status(&s),
            Err(e) => debug!("Status query failed: {e}"),
        }
    }

    /// Verify the PIN, asking the host until it is accepted or blocked
    ///
    /// The attempt count reported by the card takes precedence over the
    /// cached counter.
    pub async fn verify_pin(&mut self) -> Result<(), FlowError> {
        loop {
            let pin = self
                .require_param(params::PIN, Action::EnterPin, "enter-pin")
                .await?;

            match self.session()?.verify_pin(&pin).await {
                Ok(()) => {
                    debug!("PIN verified");
                    self.refresh_status().await;
                    return Ok(());
                }
                Err(CardError::WrongPin { remaining }) => {
                    warn!("Wrong PIN ({remaining} attempts remaining)");

                    self.params.remove(params::PIN);
                    self.card.pin_retries = remaining as i32;

                    if remaining == 0 {
                        return Err(FlowError::PinBlocked);
                    }

                    self.pause_and_wait(Action::EnterPin, "wrong-pin").await?;
                }
                Err(CardError::Blocked) => {
                    self.card.pin_retries = 0;
                    return Err(FlowError::PinBlocked);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Restart with a card swap request if the card has no keys
    pub async fn require_keys(&mut self) -> Result<(), FlowError> {
        if !self.card.key_uid.is_empty() {
            return Ok(());
        }

        warn!("Card {} has no keys", self.card.instance_uid);
        Err(self.pause_and_restart(Action::SwapCard, "no-keys").await)
    }

    /// Restart with a card swap request if the card already has keys,
    /// unless overwriting is permitted
    pub async fn require_no_keys(&mut self) -> Result<(), FlowError> {
        if self.card.key_uid.is_empty() || self.param_bool(params::OVERWRITE) {
            return Ok(());
        }

        warn!("Card {} already has keys", self.card.instance_uid);
        Err(self.pause_and_restart(Action::SwapCard, "has-keys").await)
    }

    /// Fetch a string parameter, pausing until the host provides one
    pub async fn require_param(
        &mut self,
        key: &str,
        action: Action,
        error: &str,
    ) -> Result<String, FlowError> {
        loop {
            if let Some(v) = self.param_str(key) {
                return Ok(v);
            }

            self.pause_and_wait(action, error).await?;
        }
    }

    /// Export and decode a key, derived from the master key
    pub async fn export_key(
        &mut self,
        path: &str,
        make_current: bool,
        export_type: ExportType,
    ) -> Result<ExportedKey, FlowError> {
        let data = self
            .session()?
            .export_key(true, make_current, path, export_type)
            .await
            .map_err(|e| FlowError::from_card(e, FlowError::ExportFailed))?;

        let k = ExportedKey::decode(&data);
        if k.is_empty() {
            warn!("Card returned no key for {path}");
            return Err(FlowError::ExportFailed);
        }

        Ok(k)
    }

    /// Pause, then signal restart once resumed
    pub async fn pause_and_restart(&mut self, action: Action, error: &str) -> FlowError {
        self.restart = true;

        match self.pause_and_wait(action, error).await {
            Ok(()) => FlowError::Restart,
            Err(e) => e,
        }
    }

    /// Restart immediately, without host interaction
    pub fn request_restart(&mut self) -> FlowError {
        self.restart = true;
        FlowError::Restart
    }

    /// Pause for host input, merging resumed parameters
    ///
    /// Returns [FlowError::Cancelled] if cancelled while paused,
    /// cancellation takes precedence over a concurrent resume.
    pub async fn pause_and_wait(&mut self, action: Action, error: &str) -> Result<(), FlowError> {
        self.pause_with(action, error, Params::new()).await
    }

    /// Pause with additional event fields
    pub async fn pause_with(
        &mut self,
        action: Action,
        error: &str,
        extra: Params,
    ) -> Result<(), FlowError> {
        self.check_cancelled()?;

        let mut event = Params::new();
        event.insert(params::ERROR.into(), error.into());
        event.extend(self.card.to_params());
        event.extend(extra);

        let (tx, rx) = oneshot::channel();
        let mut cancel = self.control.subscribe();
        let for_card = action == Action::InsertCard;

        if self.engine.enter_pause(&self.control, tx, for_card) {
            info!("Flow paused ({action}: {error})");
            self.engine.emit(Notification::Paused { action, event });

            // The card may have arrived before we were marked as waiting
            if for_card && self.is_connected() {
                self.engine.resume_waiting();
            }
        } else if self.engine.state() != OperationState::Cancelling {
            warn!("Unable to pause flow in state {}", self.engine.state());
            return Err(FlowError::Internal);
        }

        let resumed = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => None,
            r = rx => r.ok(),
        };

        self.check_cancelled()?;

        match resumed {
            Some(p) => {
                debug!("Flow resumed with {} params", p.len());
                self.params.extend(p);
                Ok(())
            }
            None => Err(FlowError::Cancelled),
        }
    }
}
