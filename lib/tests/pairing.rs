use std::{fs, sync::Arc};

use parking_lot::Mutex;
use serde_json::json;

use keycard_flow::{Pairing, PairingStore};

mod helpers;

fn pairing(index: u8) -> Pairing {
    Pairing {
        key: test_key(index),
        index,
    }
}

fn test_key(seed: u8) -> Vec<u8> {
    (0..32u8).map(|i| i.wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn round_trip() -> anyhow::Result<()> {
    helpers::setup_logging();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("keycard/pairings.json");

    let mut s = PairingStore::new(&path);
    for i in 0..4 {
        s.store_pairing(&format!("uid-{i}"), pairing(i));
    }
    s.save()?;

    let r = PairingStore::open(&path);
    assert_eq!(r.len(), 4);

    for i in 0..4 {
        assert_eq!(r.load_pairing(&format!("uid-{i}")), Some(pairing(i)));
    }

    assert_eq!(
        r.list_instance_uids(),
        vec!["uid-0", "uid-1", "uid-2", "uid-3"]
    );

    Ok(())
}

#[test]
fn missing_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut s = PairingStore::new(dir.path().join("missing.json"));
    s.load()?;
    assert!(s.is_empty());

    Ok(())
}

#[test]
fn malformed_records_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pairings.json");

    let contents = json!({
        "good": { "index": 2, "key": hex::encode(test_key(2)) },
        "bad-key": { "index": 1, "key": "not hex" },
        "bad-index": { "index": "one", "key": hex::encode(test_key(1)) },
        "empty-key": { "index": 3, "key": "" },
        "not-an-object": 7,
    });
    fs::write(&path, contents.to_string())?;

    let mut s = PairingStore::new(&path);
    s.load()?;

    assert_eq!(s.list_instance_uids(), vec!["good"]);
    assert_eq!(s.load_pairing("good"), Some(pairing(2)));

    Ok(())
}

#[test]
fn corrupt_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pairings.json");

    fs::write(&path, "{ not json")?;

    let mut s = PairingStore::new(&path);
    assert!(s.load().is_err());

    // Opening tolerates the corrupt file
    assert!(PairingStore::open(&path).is_empty());

    Ok(())
}

#[test]
fn remove_and_clear() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pairings.json");

    let mut s = PairingStore::new(&path);
    s.store_pairing("a", pairing(0));
    s.store_pairing("b", pairing(1));

    assert!(s.has_pairing("a"));
    assert!(s.remove_pairing("a"));
    assert!(!s.remove_pairing("a"));
    assert!(!s.has_pairing("a"));

    // In-memory changes only persist on save
    assert!(PairingStore::open(&path).is_empty());
    s.save()?;
    assert_eq!(PairingStore::open(&path).list_instance_uids(), vec!["b"]);

    s.clear();
    assert!(s.is_empty());
    s.save()?;
    assert!(PairingStore::open(&path).is_empty());

    // No temporary file left behind
    assert!(!dir.path().join("pairings.json.tmp").exists());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shared_save() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pairings.json");

    let store = Arc::new(Mutex::new(PairingStore::new(&path)));
    store.lock().store_pairing("a", pairing(3));

    PairingStore::save_shared(store.clone()).await?;
    assert_eq!(PairingStore::open(&path).load_pairing("a"), Some(pairing(3)));

    // The shared handle stays usable after the write
    assert!(store.lock().remove_pairing("a"));
    PairingStore::save_shared(store).await?;
    assert!(PairingStore::open(&path).is_empty());

    Ok(())
}
