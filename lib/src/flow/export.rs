// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;
use serde_json::Value;

use keycard_flow_core::path;

use super::{params, Action, Flow, FlowContext, FlowError, Params};
use crate::{card::ExportType, OperationKind};

/// Export public keys for one or more derivation paths
///
/// `bip44-path` may be a string or an array of strings, the
/// `exported-key` result mirrors its shape. With `export-master` set
/// the exported keys are made current on the card.
pub struct ExportPublic;

/// Requested paths and whether they were provided as a list
fn requested_paths(v: Option<&Value>) -> (Vec<String>, bool) {
    match v {
        Some(Value::Array(a)) => {
            let p = a
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            (p, true)
        }
        Some(Value::String(s)) if !s.is_empty() => (vec![s.clone()], false),
        _ => (vec![], false),
    }
}

#[async_trait]
impl Flow for ExportPublic {
    fn kind(&self) -> OperationKind {
        OperationKind::ExportPublic
    }

    async fn execute(&mut self, ctx: &mut FlowContext) -> Result<Params, FlowError> {
        ctx.select_keycard().await?;
        ctx.require_keys().await?;
        ctx.open_secure_channel_and_authenticate(true).await?;

        let (paths, is_list) = loop {
            let (p, l) = requested_paths(ctx.params().get(params::BIP44_PATH));
            if !p.is_empty() {
                break (p, l);
            }

            ctx.pause_and_wait(Action::EnterPath, "enter-bip44-path")
                .await?;
        };

        if paths.iter().any(|p| path::parse(p).is_err()) {
            return Err(FlowError::InvalidParam(params::BIP44_PATH));
        }

        let make_current = ctx.param_bool(params::EXPORT_MASTER);

        let mut keys = Vec::with_capacity(paths.len());
        for p in &paths {
            let k = ctx.export_key(p, make_current, ExportType::PublicOnly).await?;
            keys.push(serde_json::to_value(k)?);
        }

        let exported = match is_list {
            true => Value::Array(keys),
            false => keys.swap_remove(0),
        };

        let mut r = ctx.ok_result();
        r.insert(params::EXPORTED_KEY.into(), exported);

        Ok(r)
    }
}
