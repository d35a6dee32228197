// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};

use super::{params, Flow, FlowContext, FlowError, Params};
use crate::OperationKind;

/// Report applet info and pairing state, or factory reset the card
pub struct GetAppInfo;

#[async_trait]
impl Flow for GetAppInfo {
    fn kind(&self) -> OperationKind {
        OperationKind::GetAppInfo
    }

    async fn execute(&mut self, ctx: &mut FlowContext) -> Result<Params, FlowError> {
        ctx.select_keycard().await?;

        if ctx.param_bool(params::FACTORY_RESET) {
            info!("Factory resetting card {}", ctx.card().instance_uid);

            ctx.session()?
                .factory_reset()
                .await
                .map_err(|e| FlowError::from_card(e, FlowError::FactoryResetFailed))?;

            ctx.force_scan();

            let mut r = Params::new();
            r.insert(params::ERROR.into(), params::OK.into());
            r.insert("factory-reset".into(), true.into());
            return Ok(r);
        }

        let card = ctx.card().clone();
        let app_info = json!({
            "instance-uid": card.instance_uid,
            "key-uid": card.key_uid,
            "initialized": card.initialized,
            "key-initialized": card.key_initialized,
            "available-slots": card.free_slots,
            "version": card.version_string(),
        });

        // Pairing is best effort, failure only means unpaired
        let paired = match card.initialized {
            false => false,
            true => match ctx.open_secure_channel_and_authenticate(true).await {
                Ok(()) => true,
                Err(e @ (FlowError::Cancelled | FlowError::Restart)) => return Err(e),
                Err(e) => {
                    debug!("Card {} not paired: {e}", card.instance_uid);
                    false
                }
            },
        };

        let mut r = Params::new();
        r.insert(params::ERROR.into(), params::OK.into());
        r.insert(params::APP_INFO.into(), app_info);
        r.insert(params::PAIRED.into(), Value::from(paired));

        let card = ctx.card();
        if paired && card.pin_retries >= 0 {
            r.insert(params::PIN_RETRIES.into(), Value::from(card.pin_retries));
            r.insert(params::PUK_RETRIES.into(), Value::from(card.puk_retries));
        }

        Ok(r)
    }
}
