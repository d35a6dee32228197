// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;
use log::info;

use super::{params, Action, Flow, FlowContext, FlowError, Params};
use crate::OperationKind;

/// Change one of the card secrets
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ChangeSecret {
    Pin,
    Puk,
    Pairing,
}

impl ChangeSecret {
    /// Parameter key, pause action and pause error for the new secret
    fn request(&self) -> (&'static str, Action, &'static str) {
        match self {
            ChangeSecret::Pin => (params::NEW_PIN, Action::EnterNewPin, "enter-new-pin"),
            ChangeSecret::Puk => (params::NEW_PUK, Action::EnterNewPuk, "enter-new-puk"),
            ChangeSecret::Pairing => (
                params::NEW_PAIRING_PASS,
                Action::EnterNewPairing,
                "enter-new-pairing",
            ),
        }
    }
}

#[async_trait]
impl Flow for ChangeSecret {
    fn kind(&self) -> OperationKind {
        match self {
            ChangeSecret::Pin => OperationKind::ChangePIN,
            ChangeSecret::Puk => OperationKind::ChangePUK,
            ChangeSecret::Pairing => OperationKind::ChangePairing,
        }
    }

    async fn execute(&mut self, ctx: &mut FlowContext) -> Result<Params, FlowError> {
        ctx.select_keycard().await?;
        ctx.open_secure_channel_and_authenticate(true).await?;

        let (key, action, error) = self.request();
        let secret = ctx.require_param(key, action, error).await?;

        let session = ctx.session()?;
        let r = match *self {
            ChangeSecret::Pin => session.change_pin(&secret).await,
            ChangeSecret::Puk => session.change_puk(&secret).await,
            ChangeSecret::Pairing => session.change_pairing_secret(&secret).await,
        };
        r.map_err(|e| FlowError::from_card(e, FlowError::ChangeFailed))?;

        info!("Changed {:?} secret on card {}", self, ctx.card().instance_uid);

        if *self == ChangeSecret::Pin {
            ctx.set_param(params::PIN, secret);
        }

        Ok(ctx.ok_result())
    }
}
