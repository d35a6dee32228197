use serde_json::json;

use keycard_flow::{
    core::{keys::address, path},
    Action, OperationKind,
};
use keycard_sim::*;

mod helpers;
use helpers::{keyed_card, params, setup};

#[tokio::test(flavor = "multi_thread")]
async fn export_single() -> anyhow::Result<()> {
    let card = keyed_card();
    let mut h = setup(Some(&card)).await?;

    h.o.start(
        OperationKind::ExportPublic,
        params(json!({ "pin": DEFAULT_PIN, "bip44-path": path::WALLET_PATH })),
    )?;
    let r = h.ok().await?;

    let k = &r["exported-key"];
    let public_key = card.public_key(path::WALLET_PATH).unwrap();

    assert!(k.is_object());
    assert_eq!(k["publicKey"], format!("0x{}", hex::encode(&public_key)));
    assert_eq!(k["address"], address(&public_key).unwrap());
    assert!(k.get("privateKey").is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn export_list() -> anyhow::Result<()> {
    let card = keyed_card();
    let mut h = setup(Some(&card)).await?;

    let paths = [path::wallet_path(0), path::wallet_path(1)];

    h.o.start(
        OperationKind::ExportPublic,
        params(json!({ "pin": DEFAULT_PIN, "bip44-path": paths })),
    )?;
    let r = h.ok().await?;

    let keys = r["exported-key"].as_array().unwrap();
    assert_eq!(keys.len(), 2);

    for (k, p) in keys.iter().zip(&paths) {
        let public_key = card.public_key(p).unwrap();
        assert_eq!(k["address"], address(&public_key).unwrap());
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn export_path_requested() -> anyhow::Result<()> {
    let card = keyed_card();
    let mut h = setup(Some(&card)).await?;

    h.o.start(OperationKind::ExportPublic, params(json!({ "pin": DEFAULT_PIN })))?;
    h.expect_pause(Action::EnterPath, "enter-bip44-path").await?;

    h.o.resume(params(json!({ "bip44-path": path::WHISPER_PATH })))?;
    let r = h.ok().await?;

    assert!(r["exported-key"]["publicKey"].is_string());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn export_invalid_path() -> anyhow::Result<()> {
    let card = keyed_card();
    let mut h = setup(Some(&card)).await?;

    h.o.start(
        OperationKind::ExportPublic,
        params(json!({ "pin": DEFAULT_PIN, "bip44-path": ["m/44'/60'", "44/60"] })),
    )?;
    h.failed("invalid-param").await?;

    Ok(())
}
