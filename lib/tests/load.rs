use serde_json::json;

use keycard_flow::{Action, OperationKind};
use keycard_sim::*;

mod helpers;
use helpers::{keyed_card, params, setup, MNEMONIC};

#[tokio::test(flavor = "multi_thread")]
async fn load_mnemonic() -> anyhow::Result<()> {
    let card = SimCard::new();
    let mut h = setup(Some(&card)).await?;

    h.o.start(
        OperationKind::LoadAccount,
        params(json!({ "pin": DEFAULT_PIN, "mnemonic": MNEMONIC })),
    )?;
    let r = h.ok().await?;

    // Key UID only depends on the derived seed
    assert!(card.has_keys());
    assert_eq!(r["key-uid"], keyed_card().key_uid());
    assert_eq!(r["key-uid"], card.key_uid());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn load_generated_mnemonic() -> anyhow::Result<()> {
    let card = SimCard::new();
    let mut h = setup(Some(&card)).await?;

    h.o.start(
        OperationKind::LoadAccount,
        params(json!({ "pin": DEFAULT_PIN, "mnemonic-length": 24 })),
    )?;

    let event = h.expect_pause(Action::EnterMnemonic, "loading-keys").await?;
    let indexes = event["mnemonic-indexes"].as_array().unwrap();
    assert_eq!(indexes.len(), 24);
    assert!(indexes.iter().all(|i| i.as_u64().unwrap() < 2048));

    h.o.resume(params(json!({ "mnemonic": MNEMONIC })))?;
    let r = h.ok().await?;

    assert_eq!(r["key-uid"], card.key_uid());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_mnemonic_length() -> anyhow::Result<()> {
    let card = SimCard::new();
    let mut h = setup(Some(&card)).await?;

    h.o.start(
        OperationKind::LoadAccount,
        params(json!({ "pin": DEFAULT_PIN, "mnemonic-length": 13 })),
    )?;
    h.failed("invalid-param").await?;

    assert!(!card.has_keys());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn existing_keys() -> anyhow::Result<()> {
    let card = keyed_card();
    let mut h = setup(Some(&card)).await?;

    h.o.start(
        OperationKind::LoadAccount,
        params(json!({ "pin": DEFAULT_PIN, "mnemonic": MNEMONIC })),
    )?;
    h.expect_pause(Action::SwapCard, "has-keys").await?;
    h.o.cancel().await?;

    // Overwrite permitted
    h.o.start(
        OperationKind::LoadAccount,
        params(json!({ "pin": DEFAULT_PIN, "mnemonic": MNEMONIC, "overwrite": true })),
    )?;
    h.ok().await?;

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialize_then_load() -> anyhow::Result<()> {
    let card = SimCard::uninitialized();
    let mut h = setup(Some(&card)).await?;

    h.o.start(
        OperationKind::LoadAccount,
        params(json!({ "mnemonic": MNEMONIC })),
    )?;

    h.expect_pause(Action::EnterNewPin, "enter-new-pin").await?;
    h.o.resume(params(json!({ "new-pin": "123456" })))?;

    h.expect_pause(Action::EnterNewPuk, "enter-new-puk").await?;
    h.o.resume(params(json!({ "new-puk": "210987654321" })))?;

    h.expect_pause(Action::EnterNewPairing, "enter-new-pairing")
        .await?;
    h.o.resume(params(json!({ "new-pairing-pass": "pairing-secret" })))?;

    // Restarted against the initialised card, authenticating with the new secrets
    let r = h.ok().await?;

    assert!(card.is_initialized());
    assert_eq!(card.pin(), "123456");
    assert_eq!(card.puk(), "210987654321");
    assert_eq!(card.pairing_password(), "pairing-secret");

    assert_eq!(r["instance-uid"], card.instance_uid());
    assert_eq!(r["key-uid"], card.key_uid());

    Ok(())
}
