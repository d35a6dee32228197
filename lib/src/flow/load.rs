// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value;

use keycard_flow_core::{keys::hex_0x, mnemonic::checksum_size, Seed};

use super::{params, Action, Flow, FlowContext, FlowError, Params};
use crate::OperationKind;

/// Mnemonic length used when the host does not specify one
const DEFAULT_MNEMONIC_WORDS: u64 = 12;

/// Load a mnemonic derived seed onto the card, initialising factory
/// fresh cards first
pub struct LoadAccount;

impl LoadAccount {
    /// Initialise a factory fresh card with host provided secrets
    async fn initialize(&self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let pin = ctx
            .require_param(params::NEW_PIN, Action::EnterNewPin, "enter-new-pin")
            .await?;
        let puk = ctx
            .require_param(params::NEW_PUK, Action::EnterNewPuk, "enter-new-puk")
            .await?;
        let pairing = ctx
            .require_param(
                params::NEW_PAIRING_PASS,
                Action::EnterNewPairing,
                "enter-new-pairing",
            )
            .await?;

        ctx.session()?.init(&pin, &puk, &pairing).await?;

        info!("Initialised card {}", ctx.card().instance_uid);

        // Authenticate with the new secrets after re-selecting
        ctx.set_param(params::PIN, pin);
        ctx.set_param(params::PAIRING_PASS, pairing);

        Ok(())
    }

    /// Mnemonic from parameters, or generated by the card and confirmed
    /// by the host
    async fn mnemonic(&self, ctx: &mut FlowContext) -> Result<String, FlowError> {
        if let Some(m) = ctx.param_str(params::MNEMONIC) {
            return Ok(m);
        }

        let words = ctx
            .params()
            .get(params::MNEMONIC_LEN)
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MNEMONIC_WORDS);

        let cs = checksum_size(words as usize)
            .map_err(|_| FlowError::InvalidParam(params::MNEMONIC_LEN))?;

        let indexes = ctx.session()?.generate_mnemonic(cs).await?;
        debug!("Card generated {} mnemonic indexes", indexes.len());

        loop {
            let mut extra = Params::new();
            extra.insert(params::MNEMONIC_INDEXES.into(), Value::from(indexes.clone()));

            ctx.pause_with(Action::EnterMnemonic, "loading-keys", extra)
                .await?;

            if let Some(m) = ctx.param_str(params::MNEMONIC) {
                return Ok(m);
            }
        }
    }
}

#[async_trait]
impl Flow for LoadAccount {
    fn kind(&self) -> OperationKind {
        OperationKind::LoadAccount
    }

    async fn execute(&mut self, ctx: &mut FlowContext) -> Result<Params, FlowError> {
        ctx.select_keycard().await?;

        if !ctx.card().initialized {
            self.initialize(ctx).await?;
            return Err(ctx.request_restart());
        }

        ctx.require_no_keys().await?;
        ctx.open_secure_channel_and_authenticate(true).await?;

        let mnemonic = self.mnemonic(ctx).await?;
        let seed = Seed::derive(&mnemonic, "")?;

        let key_uid = ctx.session()?.load_seed(seed.as_ref()).await?;

        let c = ctx.card_mut();
        c.key_uid = hex_0x(&key_uid);
        c.key_initialized = true;

        info!("Loaded keys {} onto card {}", c.key_uid, c.instance_uid);

        Ok(ctx.ok_result())
    }
}
