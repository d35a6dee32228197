// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};

use keycard_flow_core::{keys::hex_0x, path, Metadata};

use super::{params, Action, Flow, FlowContext, FlowError, Params};
use crate::{
    card::{ExportType, PUBLIC_DATA},
    OperationKind,
};

/// Read the card name and wallet list
pub struct GetMetadata;

/// Write the card name and wallet list
pub struct StoreMetadata;

#[async_trait]
impl Flow for GetMetadata {
    fn kind(&self) -> OperationKind {
        OperationKind::GetMetadata
    }

    async fn execute(&mut self, ctx: &mut FlowContext) -> Result<Params, FlowError> {
        ctx.select_keycard().await?;

        let data = ctx.session()?.get_data(PUBLIC_DATA).await?;
        if data.is_empty() {
            debug!("No metadata on card {}", ctx.card().instance_uid);

            let mut r = ctx.ok_result();
            r.insert(params::ERROR.into(), "no-data".into());
            return Ok(r);
        }

        let m = Metadata::decode(&data)?;

        let resolve = ctx.param_bool(params::RESOLVE_ADDR);
        if resolve {
            ctx.open_secure_channel_and_authenticate(true).await?;
        }

        let mut wallets = Vec::with_capacity(m.wallets.len());
        for p in m.wallet_paths() {
            let mut w = json!({ "path": p });

            if resolve {
                let k = ctx.export_key(&p, false, ExportType::PublicOnly).await?;
                w["address"] = Value::from(k.address.clone());
                w["publicKey"] = Value::from(hex_0x(&k.public_key));
            }

            wallets.push(w);
        }

        let mut r = ctx.ok_result();
        r.insert(
            params::CARD_META.into(),
            json!({ "name": m.name, "wallets": wallets }),
        );

        Ok(r)
    }
}

/// Wallet indexes for the requested wallet paths
fn wallet_indexes(v: Option<&Value>) -> Result<Vec<u32>, FlowError> {
    let invalid = || FlowError::InvalidParam(params::WALLET_PATHS);

    let a = match v {
        None => return Ok(vec![]),
        Some(Value::Array(a)) => a,
        Some(_) => return Err(invalid()),
    };

    a.iter()
        .map(|p| p.as_str().and_then(path::wallet_index).ok_or_else(invalid))
        .collect()
}

#[async_trait]
impl Flow for StoreMetadata {
    fn kind(&self) -> OperationKind {
        OperationKind::StoreMetadata
    }

    async fn execute(&mut self, ctx: &mut FlowContext) -> Result<Params, FlowError> {
        ctx.select_keycard().await?;
        ctx.open_secure_channel_and_authenticate(true).await?;

        let name = ctx
            .require_param(params::CARD_NAME, Action::EnterName, "enter-cardname")
            .await?;

        let wallets = wallet_indexes(ctx.params().get(params::WALLET_PATHS))?;
        let m = Metadata::new(&name, wallets)
            .map_err(|_| FlowError::InvalidParam(params::CARD_NAME))?;

        ctx.session()?.store_data(PUBLIC_DATA, &m.encode()?).await?;

        info!(
            "Stored metadata '{}' ({} wallets) on card {}",
            m.name,
            m.wallets.len(),
            ctx.card().instance_uid
        );

        Ok(ctx.ok_result())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wallet_path_params() {
        let v = json!(["m/44'/60'/0'/0/0", "m/44'/60'/0'/0/5"]);
        assert_eq!(wallet_indexes(Some(&v)).unwrap(), vec![0, 5]);

        assert!(wallet_indexes(None).unwrap().is_empty());
        assert!(wallet_indexes(Some(&json!(["m/44'/60'/0'/1/0"]))).is_err());
        assert!(wallet_indexes(Some(&json!("m/44'/60'/0'/0/0"))).is_err());
    }
}
