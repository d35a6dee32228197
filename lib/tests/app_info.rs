use serde_json::json;

use keycard_flow::{OperationKind, Params};
use keycard_sim::*;

mod helpers;
use helpers::{keyed_card, params, settle, setup};

#[tokio::test(flavor = "multi_thread")]
async fn app_info_paired() -> anyhow::Result<()> {
    let card = keyed_card();
    let mut h = setup(Some(&card)).await?;

    h.o.start(OperationKind::GetAppInfo, params(json!({ "pin": DEFAULT_PIN })))?;
    let r = h.ok().await?;

    let info = &r["application-info"];
    assert_eq!(info["instance-uid"], card.instance_uid());
    assert_eq!(info["key-uid"], card.key_uid());
    assert_eq!(info["initialized"], true);
    assert_eq!(info["key-initialized"], true);
    assert_eq!(info["available-slots"], 5);
    assert_eq!(info["version"], "3.1");

    assert_eq!(r["paired"], true);
    assert_eq!(r["pin-retries"], 3);
    assert_eq!(r["puk-retries"], 5);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn app_info_unpaired() -> anyhow::Result<()> {
    let card = keyed_card().with_full_slots();
    let mut h = setup(Some(&card)).await?;

    h.o.start(OperationKind::GetAppInfo, Params::new())?;
    let r = h.ok().await?;

    assert_eq!(r["paired"], false);
    assert_eq!(r["application-info"]["available-slots"], 0);
    assert!(r.get("pin-retries").is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn app_info_uninitialized() -> anyhow::Result<()> {
    let card = SimCard::uninitialized();
    let mut h = setup(Some(&card)).await?;

    h.o.start(OperationKind::GetAppInfo, Params::new())?;
    let r = h.ok().await?;

    assert_eq!(r["application-info"]["initialized"], false);
    assert_eq!(r["application-info"]["key-uid"], "");
    assert_eq!(r["paired"], false);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn factory_reset() -> anyhow::Result<()> {
    let card = keyed_card();
    let mut h = setup(Some(&card)).await?;
    let uid = card.instance_uid();

    h.o.start(
        OperationKind::GetAppInfo,
        params(json!({ "factory reset": true })),
    )?;
    let r = h.ok().await?;

    assert_eq!(r["factory-reset"], true);
    assert!(!card.is_initialized());
    assert!(!card.has_keys());
    assert_ne!(card.instance_uid(), uid);

    // Rescanned card reports as uninitialised
    settle().await;

    h.o.start(OperationKind::GetAppInfo, Params::new())?;
    let r = h.ok().await?;
    assert_eq!(r["application-info"]["initialized"], false);

    Ok(())
}
