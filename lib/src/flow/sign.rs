// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;
use log::warn;
use serde_json::json;

use super::{params, Action, Flow, FlowContext, FlowError, Params};
use crate::OperationKind;

/// Hash length accepted for signing
const HASH_LEN: usize = 32;

/// Sign a transaction hash
pub struct Sign;

/// Decode a 32 byte hex hash, with or without a `0x` prefix
fn parse_hash(s: &str) -> Option<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);

    match hex::decode(s) {
        Ok(b) if b.len() == HASH_LEN => Some(b),
        _ => None,
    }
}

#[async_trait]
impl Flow for Sign {
    fn kind(&self) -> OperationKind {
        OperationKind::Sign
    }

    async fn execute(&mut self, ctx: &mut FlowContext) -> Result<Params, FlowError> {
        ctx.select_keycard().await?;
        ctx.require_keys().await?;
        ctx.open_secure_channel_and_authenticate(true).await?;

        let hash = loop {
            let h = ctx
                .require_param(params::TX_HASH, Action::EnterTxHash, "enter-tx-hash")
                .await?;

            match parse_hash(&h) {
                Some(b) => break b,
                None => {
                    warn!("Rejecting malformed transaction hash");
                    ctx.remove_param(params::TX_HASH);
                }
            }
        };

        let path = ctx.param_str(params::BIP44_PATH);
        let sig = ctx.session()?.sign(&hash, path.as_deref()).await?;

        let mut r = ctx.ok_result();
        r.insert(
            params::TX_SIGNATURE.into(),
            json!({
                "r": hex::encode(&sig.r),
                "s": hex::encode(&sig.s),
                "v": hex::encode([sig.v]),
            }),
        );

        Ok(r)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_formats() {
        let h = "ab".repeat(32);

        assert_eq!(parse_hash(&h), Some(vec![0xab; 32]));
        assert_eq!(parse_hash(&format!("0x{h}")), Some(vec![0xab; 32]));
        assert_eq!(parse_hash("abcd"), None);
        assert_eq!(parse_hash(&"zz".repeat(32)), None);
    }
}
