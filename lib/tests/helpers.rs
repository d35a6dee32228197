#![allow(dead_code)]

use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use anyhow::{anyhow, bail};
use log::{debug, LevelFilter};
use serde_json::Value;
use simplelog::SimpleLogger;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use keycard_flow::{Action, Config, Notification, OperationState, Orchestrator, Params};
use keycard_sim::*;

pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Bound on waits for notifications and state changes
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Orchestrator bound to a simulated reader with a temporary pairing store
pub struct Harness {
    pub o: Orchestrator,
    pub rx: UnboundedReceiver<Notification>,
    pub channel: SimChannel,
    pub dir: TempDir,
}

pub fn setup_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

// Setup orchestrator and simulated reader, with an optional card inserted
pub async fn setup(card: Option<&SimCard>) -> anyhow::Result<Harness> {
    setup_logging();

    let dir = tempfile::tempdir()?;

    let channel = SimChannel::new();
    if let Some(c) = card {
        channel.insert(c);
    }

    let config = Config {
        card_grace_ms: 20,
        ..Default::default()
    };
    let (o, rx) = Orchestrator::new(config);

    o.configure(dir.path().join("pairings.json"), Some(Arc::new(channel.clone())))?;
    o.start_detection()?;

    // Allow the initial detection event through
    settle().await;

    Ok(Harness {
        o,
        rx,
        channel,
        dir,
    })
}

/// Wait for card events to reach the orchestrator
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Build parameters from a JSON object literal
pub fn params(v: Value) -> Params {
    match v {
        Value::Object(m) => m,
        _ => panic!("parameters must be an object"),
    }
}

impl Harness {
    pub fn pairings_path(&self) -> PathBuf {
        self.dir.path().join("pairings.json")
    }

    /// Next notification
    pub async fn next(&mut self) -> anyhow::Result<Notification> {
        let n = tokio::time::timeout(TIMEOUT, self.rx.recv())
            .await?
            .ok_or_else(|| anyhow!("notification channel closed"))?;

        debug!("Notification: {}", n.to_json());

        Ok(n)
    }

    /// Next pause, skipping card inserted notifications
    pub async fn next_pause(&mut self) -> anyhow::Result<(Action, Params)> {
        loop {
            match self.next().await? {
                Notification::Paused { action, event } => return Ok((action, event)),
                Notification::CardInserted => continue,
                n => bail!("Expected pause, flow completed: {}", n.to_json()),
            }
        }
    }

    /// Expect a pause with the provided action and error
    pub async fn expect_pause(&mut self, action: Action, error: &str) -> anyhow::Result<Params> {
        let (a, event) = self.next_pause().await?;

        assert_eq!(a, action, "unexpected pause: {event:?}");
        assert_eq!(event["error"], error);

        // Resume is rejected until the flow is marked paused
        self.wait_state(OperationState::Paused).await?;

        Ok(event)
    }

    /// Flow result, skipping card inserted notifications
    pub async fn result(&mut self) -> anyhow::Result<Params> {
        loop {
            match self.next().await? {
                Notification::Completed(r) | Notification::Errored(r) => return Ok(r),
                Notification::CardInserted => continue,
                n => bail!("Expected result, flow paused: {}", n.to_json()),
            }
        }
    }

    /// Expect a successful flow result
    pub async fn ok(&mut self) -> anyhow::Result<Params> {
        let r = self.result().await?;
        assert_eq!(r["error"], "ok", "flow failed: {r:?}");

        self.wait_state(OperationState::Idle).await?;

        Ok(r)
    }

    /// Expect a failed flow result with the provided code
    pub async fn failed(&mut self, code: &str) -> anyhow::Result<Params> {
        let r = self.result().await?;
        assert_eq!(r["error"], code, "unexpected result: {r:?}");

        self.wait_state(OperationState::Idle).await?;

        Ok(r)
    }

    /// Poll until the orchestrator reaches `state`
    pub async fn wait_state(&self, state: OperationState) -> anyhow::Result<()> {
        let o = self.o.clone();

        tokio::time::timeout(TIMEOUT, async move {
            while o.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .map_err(|_| anyhow!("Timeout waiting for {state} (current: {})", self.o.state()))
    }

    /// Assert no notifications arrive for a short period
    pub async fn expect_quiet(&mut self) {
        tokio::time::sleep(Duration::from_millis(100)).await;

        if let Ok(n) = self.rx.try_recv() {
            panic!("Unexpected notification: {}", n.to_json());
        }
    }
}

/// Card with keys loaded from [MNEMONIC]
pub fn keyed_card() -> SimCard {
    SimCard::new()
        .load_mnemonic(MNEMONIC)
        .expect("load mnemonic")
}
