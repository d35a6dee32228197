// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;

use keycard_flow_core::path;

use super::{params, Flow, FlowContext, FlowError, Params};
use crate::{card::ExportType, OperationKind};

/// Applet version supporting extended public key export
const EXTENDED_EXPORT_VERSION: i32 = 0x0301;

/// Export the encryption and whisper keys
pub struct Login;

/// Export all keys required to restore an account
pub struct RecoverAccount;

/// Select, require keys, authenticate, then export the login keys
async fn login(ctx: &mut FlowContext) -> Result<Params, FlowError> {
    ctx.select_keycard().await?;
    ctx.require_keys().await?;
    ctx.open_secure_channel_and_authenticate(true).await?;

    let enc = ctx
        .export_key(path::ENCRYPTION_PATH, false, ExportType::PrivateAndPublic)
        .await?;
    let whisper = ctx
        .export_key(path::WHISPER_PATH, false, ExportType::PrivateAndPublic)
        .await?;

    let mut r = ctx.ok_result();
    r.insert(params::ENC_KEY.into(), serde_json::to_value(enc)?);
    r.insert(params::WHISPER_KEY.into(), serde_json::to_value(whisper)?);

    Ok(r)
}

#[async_trait]
impl Flow for Login {
    fn kind(&self) -> OperationKind {
        OperationKind::Login
    }

    async fn execute(&mut self, ctx: &mut FlowContext) -> Result<Params, FlowError> {
        login(ctx).await
    }
}

#[async_trait]
impl Flow for RecoverAccount {
    fn kind(&self) -> OperationKind {
        OperationKind::RecoverAccount
    }

    async fn execute(&mut self, ctx: &mut FlowContext) -> Result<Params, FlowError> {
        let mut r = login(ctx).await?;

        let eip1581 = ctx
            .export_key(path::EIP1581_PATH, false, ExportType::PublicOnly)
            .await?;

        let root_type = match ctx.card().version >= EXTENDED_EXPORT_VERSION {
            true => ExportType::ExtendedPublic,
            false => ExportType::PublicOnly,
        };
        let wallet_root = ctx
            .export_key(path::WALLET_ROOT_PATH, false, root_type)
            .await?;

        let wallet = ctx
            .export_key(path::WALLET_PATH, false, ExportType::PublicOnly)
            .await?;
        let master = ctx
            .export_key(path::MASTER_PATH, true, ExportType::PublicOnly)
            .await?;

        r.insert(params::EIP1581_KEY.into(), serde_json::to_value(eip1581)?);
        r.insert(params::WALLET_ROOT_KEY.into(), serde_json::to_value(wallet_root)?);
        r.insert(params::WALLET_KEY.into(), serde_json::to_value(wallet)?);
        r.insert(params::MASTER_KEY.into(), serde_json::to_value(master)?);

        Ok(r)
    }
}
