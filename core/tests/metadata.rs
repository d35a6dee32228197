use std::time::{Duration, Instant};

use keycard_flow_core::{
    metadata::{MAX_NAME_LEN, MAX_WALLETS},
    Error, Metadata,
};

#[test]
fn encode_known_layout() -> anyhow::Result<()> {
    let m = Metadata::new("Card", [0, 1, 2, 200])?;

    let b = m.encode()?;
    assert_eq!(
        b,
        vec![0x24, b'C', b'a', b'r', b'd', 0x00, 0x02, 0xc8, 0x01, 0x00]
    );

    assert_eq!(Metadata::decode(&b)?, m);

    Ok(())
}

#[test]
fn wallet_paths_listed_in_order() -> anyhow::Result<()> {
    let m = Metadata::new("", [3, 1])?;
    assert_eq!(
        m.wallet_paths(),
        vec!["m/44'/60'/0'/0/1", "m/44'/60'/0'/0/3"]
    );

    let d = Metadata::decode(&m.encode()?)?;
    assert_eq!(d.name, "");
    assert_eq!(d.wallets, m.wallets);

    Ok(())
}

#[test]
fn reject_bad_metadata() {
    let long = "x".repeat(MAX_NAME_LEN + 1);
    assert_eq!(Metadata::new(&long, []), Err(Error::NameTooLong(21)));

    assert_eq!(Metadata::decode(&[]), Err(Error::Truncated));
    assert_eq!(Metadata::decode(&[0x44, b'a']), Err(Error::MetadataVersion(2)));
    assert_eq!(Metadata::decode(&[0x23, b'a']), Err(Error::Truncated));
    assert_eq!(Metadata::decode(&[0x20, 0x80]), Err(Error::Varint));
}

#[test]
fn reject_oversized_wallet_runs() -> anyhow::Result<()> {
    let start = Instant::now();

    // Single run covering the whole index space
    let huge = [0x20, 0x00, 0xff, 0xff, 0xff, 0xff, 0x0f];
    assert_eq!(Metadata::decode(&huge), Err(Error::TooManyWallets));

    // Runs that are small alone but too many together
    let mut b = vec![0x20];
    for i in 0..3u32 {
        b.extend_from_slice(&[(i * 2) as u8, 0x00]);
    }
    b.extend_from_slice(&[0x10, 0xff, 0x07]);
    assert_eq!(Metadata::decode(&b), Err(Error::TooManyWallets));

    assert!(start.elapsed() < Duration::from_secs(1));

    // The limit itself is accepted
    let m = Metadata::new("max", 0..MAX_WALLETS as u32)?;
    assert_eq!(Metadata::decode(&m.encode()?)?.wallets.len(), MAX_WALLETS);

    assert_eq!(
        Metadata::new("over", 0..=MAX_WALLETS as u32),
        Err(Error::TooManyWallets)
    );

    Ok(())
}
