// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Flow orchestrator
//!
//! Owns the card channel, session and pairing store, and runs at most
//! one flow at a time on a background task. Flow progress is reported
//! through the [Notification] receiver returned by [Orchestrator::new].

use std::{
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use futures::FutureExt;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    card::{CardChannel, CardEvent},
    flow::{self, params, Action, Control, Flow, FlowContext, FlowError, Notification, Params},
    Config, Error, OperationKind, OperationState, PairingStore, Session, StateMachine,
};

/// Handle to the flow orchestrator, cheap to clone
///
/// Must be used from within a tokio runtime. Call
/// [Orchestrator::shutdown] before dropping the last handle to cancel
/// and join any running flow.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Shared>,
}

struct Shared {
    config: Config,
    state: StateMachine,
    notifications: mpsc::UnboundedSender<Notification>,
    ctx: Mutex<Inner>,
    next_id: AtomicU64,
}

/// Currently active flow
struct Active {
    id: u64,
    kind: OperationKind,
    control: Arc<Control>,
    done: watch::Receiver<bool>,
}

#[derive(Default)]
struct Inner {
    channel: Option<Arc<dyn CardChannel>>,
    session: Option<Session>,
    pairings: Option<Arc<Mutex<PairingStore>>>,
    active: Option<Active>,
    card_uid: Option<String>,
    waiting_for_card: bool,
    last_error: Option<String>,
    listener: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create an orchestrator and its notification stream
    pub fn new(config: Config) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let s = Self {
            inner: Arc::new(Shared {
                config,
                state: StateMachine::new(),
                notifications: tx,
                ctx: Mutex::new(Inner::default()),
                next_id: AtomicU64::new(0),
            }),
        };

        (s, rx)
    }

    /// Load pairings from `storage` and bind to a card channel
    ///
    /// Without a `channel` the previously configured one is kept.
    /// Rejected while a flow is running.
    pub fn configure(
        &self,
        storage: impl Into<PathBuf>,
        channel: Option<Arc<dyn CardChannel>>,
    ) -> Result<(), Error> {
        let r = self.try_configure(storage.into(), channel);
        self.record(r)
    }

    fn try_configure(
        &self,
        storage: PathBuf,
        channel: Option<Arc<dyn CardChannel>>,
    ) -> Result<(), Error> {
        let mut ctx = self.inner.ctx.lock();

        if ctx.active.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let channel = match channel.or_else(|| ctx.channel.clone()) {
            Some(c) => c,
            None => return Err(Error::NotConfigured),
        };

        let store = PairingStore::open(&storage);
        info!(
            "Configured with {} stored pairings ({})",
            store.len(),
            storage.display()
        );

        if let Some(l) = ctx.listener.take() {
            l.abort();
        }
        ctx.listener = Some(listen(Arc::downgrade(&self.inner), channel.subscribe()));

        ctx.session = Some(Session::from(channel.command_set()));
        ctx.channel = Some(channel);
        ctx.pairings = Some(Arc::new(Mutex::new(store)));
        ctx.card_uid = None;

        Ok(())
    }

    /// Start watching for card presence
    pub fn start_detection(&self) -> Result<(), Error> {
        let r = match self.channel() {
            Some(c) => c.start_detection().map_err(Error::Detection),
            None => Err(Error::NotConfigured),
        };
        self.record(r)
    }

    pub fn stop_detection(&self) {
        if let Some(c) = self.channel() {
            c.stop_detection();
        }
    }

    /// Start a flow, returning once it has been launched
    pub fn start(&self, kind: OperationKind, params: Params) -> Result<(), Error> {
        let r = self.try_start(kind, params);
        self.record(r)
    }

    /// Start a flow by its integer discriminant
    pub fn start_raw(&self, kind: i32, params: Params) -> Result<(), Error> {
        match OperationKind::try_from(kind) {
            Ok(k) => self.start(k, params),
            Err(_) => self.record(Err(Error::InvalidKind(kind))),
        }
    }

    fn try_start(&self, kind: OperationKind, params: Params) -> Result<(), Error> {
        let flow = flow::create(kind);
        let control = Arc::new(Control::new());
        let (done_tx, done_rx) = watch::channel(false);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut ctx = self.inner.ctx.lock();

            if ctx.channel.is_none() || ctx.pairings.is_none() {
                return Err(Error::NotConfigured);
            }
            if ctx.active.is_some() {
                return Err(Error::AlreadyRunning);
            }

            ctx.active = Some(Active {
                id,
                kind,
                control: control.clone(),
                done: done_rx,
            });
            ctx.waiting_for_card = false;
        }

        if !self
            .inner
            .state
            .transition_from(OperationState::Idle, OperationState::Running)
        {
            let mut ctx = self.inner.ctx.lock();
            if ctx.active.as_ref().map(|a| a.id) == Some(id) {
                ctx.active = None;
            }
            return Err(Error::AlreadyRunning);
        }

        info!("Starting {kind} flow");

        let c = FlowContext::new(self.clone(), control, params);
        tokio::spawn(self.clone().run(id, flow, c, done_tx));

        Ok(())
    }

    /// Resume a paused flow, merging `params` into its parameters
    pub fn resume(&self, params: Params) -> Result<(), Error> {
        let r = self.try_resume(params);
        self.record(r)
    }

    fn try_resume(&self, params: Params) -> Result<(), Error> {
        let control = {
            let mut ctx = self.inner.ctx.lock();
            let a = ctx.active.as_ref().ok_or(Error::NoOperation)?;
            let c = a.control.clone();
            ctx.waiting_for_card = false;
            c
        };

        let state = &self.inner.state;
        if !state.transition_from(OperationState::Paused, OperationState::Resuming) {
            return Err(Error::NotPaused);
        }

        let tx = control.take_resume();

        // Running before waking, so the flow may pause again immediately
        state.transition_from(OperationState::Resuming, OperationState::Running);

        match tx {
            Some(tx) => {
                if tx.send(params).is_err() {
                    debug!("Flow exited before resume");
                }
            }
            None => warn!("Resumed flow was not waiting"),
        }

        Ok(())
    }

    /// Cancel the running flow and wait for it to exit
    ///
    /// A no-op if no flow is running.
    pub async fn cancel(&self) -> Result<(), Error> {
        let (id, control, mut done) = {
            let ctx = self.inner.ctx.lock();
            match &ctx.active {
                Some(a) => (a.id, a.control.clone(), a.done.clone()),
                None => {
                    debug!("Cancel requested with no flow running");
                    return Ok(());
                }
            }
        };

        info!("Cancelling flow");

        self.inner.state.transition(OperationState::Cancelling);
        control.cancel();

        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                break;
            }
        }

        self.cleanup(id);

        Ok(())
    }

    /// Handle a card detection event
    pub fn card_detected(&self, uid: &str) {
        let resume = {
            let mut ctx = self.inner.ctx.lock();

            if ctx.card_uid.as_deref() == Some(uid) {
                debug!("Ignoring repeat detection of card {uid}");
                return;
            }

            info!("Card detected: {uid}");

            ctx.card_uid = Some(uid.to_string());

            // Sessions are dropped on card loss, bind a new one to this card
            if ctx.session.is_none() {
                ctx.session = ctx
                    .channel
                    .as_ref()
                    .map(|c| Session::from(c.command_set()));
            }

            let resume = ctx.waiting_for_card && self.state() == OperationState::Paused;
            if resume {
                ctx.waiting_for_card = false;
            }
            resume
        };

        if resume {
            if let Err(e) = self.resume(Params::new()) {
                warn!("Failed to resume flow on card detection: {e}");
            }
        }
    }

    /// Handle a card removal event
    pub fn card_lost(&self) {
        let mut ctx = self.inner.ctx.lock();

        info!("Card removed");

        ctx.card_uid = None;
        ctx.session = None;

        if self.state() == OperationState::Running {
            ctx.waiting_for_card = true;
        }
    }

    pub fn state(&self) -> OperationState {
        self.inner.state.state()
    }

    /// Kind of the running flow
    pub fn current_kind(&self) -> Option<OperationKind> {
        self.inner.ctx.lock().active.as_ref().map(|a| a.kind)
    }

    /// Code of the most recent control error
    pub fn last_error(&self) -> Option<String> {
        self.inner.ctx.lock().last_error.clone()
    }

    /// Register a state change observer
    pub fn on_state_change(
        &self,
        f: impl Fn(OperationState, OperationState) + Send + Sync + 'static,
    ) {
        self.inner.state.subscribe(f);
    }

    /// Shared pairing store, once configured
    pub fn pairings(&self) -> Option<Arc<Mutex<PairingStore>>> {
        self.inner.ctx.lock().pairings.clone()
    }

    /// Stop detection, cancel and join any running flow, then release
    /// the card session and pairing store
    pub async fn shutdown(&self) {
        self.stop_detection();

        if let Err(e) = self.cancel().await {
            warn!("Cancel during shutdown failed: {e}");
        }

        let mut ctx = self.inner.ctx.lock();
        if let Some(l) = ctx.listener.take() {
            l.abort();
        }

        ctx.session = None;
        ctx.pairings = None;
        ctx.channel = None;
        ctx.card_uid = None;

        info!("Orchestrator shut down");
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn channel(&self) -> Option<Arc<dyn CardChannel>> {
        self.inner.ctx.lock().channel.clone()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.channel().map(|c| c.is_connected()).unwrap_or(false)
    }

    /// Session for the current connection, created on demand
    pub(crate) fn session(&self) -> Option<Session> {
        let mut ctx = self.inner.ctx.lock();

        if ctx.session.is_none() {
            ctx.session = ctx
                .channel
                .as_ref()
                .map(|c| Session::from(c.command_set()));
        }

        ctx.session.clone()
    }

    pub(crate) fn emit(&self, n: Notification) {
        if self.inner.notifications.send(n).is_err() {
            debug!("Notification receiver dropped");
        }
    }

    /// Register a pending resume and move to paused
    pub(crate) fn enter_pause(
        &self,
        control: &Control,
        tx: oneshot::Sender<Params>,
        waiting_for_card: bool,
    ) -> bool {
        control.arm(tx);

        // A card loss seen while running only applies to card pauses
        self.inner.ctx.lock().waiting_for_card = waiting_for_card;

        self.inner
            .state
            .transition_from(OperationState::Running, OperationState::Paused)
    }

    /// Resume a flow paused for a card, if still waiting
    pub(crate) fn resume_waiting(&self) {
        let waiting = std::mem::take(&mut self.inner.ctx.lock().waiting_for_card);

        if waiting {
            if let Err(e) = self.resume(Params::new()) {
                debug!("Card present but resume failed: {e}");
            }
        }
    }

    fn record<T>(&self, r: Result<T, Error>) -> Result<T, Error> {
        if let Err(e) = &r {
            warn!("Orchestrator request failed: {e}");
            self.inner.ctx.lock().last_error = Some(e.code().to_string());
        }
        r
    }

    /// Execution loop for a single flow
    async fn run(
        self,
        id: u64,
        mut flow: Box<dyn Flow>,
        mut c: FlowContext,
        done: watch::Sender<bool>,
    ) {
        let kind = flow.kind();

        let result = loop {
            let r = AssertUnwindSafe(flow.execute(&mut c)).catch_unwind().await;

            if c.is_cancelled() {
                info!("{kind} flow cancelled");
                let _ = done.send(true);
                return;
            }

            let e = match r {
                Ok(Ok(v)) => break v,
                Ok(Err(e)) => e,
                Err(_) => {
                    error!("{kind} flow panicked");
                    break c.error_result(&FlowError::Internal);
                }
            };

            match e {
                FlowError::Restart => (),
                e if e.is_card_failure() && !c.is_connected() => {
                    warn!("Card lost during {kind} flow: {e}");

                    match c
                        .pause_and_restart(Action::InsertCard, "connection-error")
                        .await
                    {
                        FlowError::Restart => (),
                        _ if c.is_cancelled() => {
                            info!("{kind} flow cancelled");
                            let _ = done.send(true);
                            return;
                        }
                        e => break c.error_result(&e),
                    }
                }
                e => {
                    warn!("{kind} flow failed: {e}");
                    break c.error_result(&e);
                }
            }

            debug!("Restarting {kind} flow");
            c.restart();
        };

        let ok = result.get(params::ERROR) == Some(&Value::from(params::OK));
        info!("{kind} flow complete (ok: {ok})");

        match ok {
            true => self.emit(Notification::Completed(result)),
            false => self.emit(Notification::Errored(result)),
        }

        self.cleanup(id);
        let _ = done.send(true);
    }

    /// Detach flow `id` and return to idle
    fn cleanup(&self, id: u64) {
        {
            let mut ctx = self.inner.ctx.lock();

            match &ctx.active {
                Some(a) if a.id == id => (),
                _ => return,
            }

            ctx.active = None;
            ctx.card_uid = None;
            ctx.waiting_for_card = false;
        }

        self.inner.state.reset();
    }
}

/// Forward card events to the orchestrator while it is alive
fn listen(shared: Weak<Shared>, mut rx: broadcast::Receiver<CardEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let evt = match rx.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {n} card events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let o = match shared.upgrade() {
                Some(inner) => Orchestrator { inner },
                None => break,
            };

            match evt {
                CardEvent::Detected(uid) => o.card_detected(&uid),
                CardEvent::Lost => o.card_lost(),
            }
        }

        debug!("Card event listener exiting");
    })
}
