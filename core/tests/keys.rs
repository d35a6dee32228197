use keycard_flow_core::{
    keys::{address, public_from_private},
    tlv::{self, tags},
    ExportedKey,
};

lazy_static::lazy_static! {
    static ref PRIVATE_KEY: Vec<u8> = hex::decode("4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318").unwrap();
}

const ADDRESS: &str = "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23";

fn template(fields: &[(u8, &[u8])]) -> Vec<u8> {
    let mut inner = vec![];
    for (t, v) in fields {
        tlv::encode(*t, v, &mut inner);
    }

    let mut outer = vec![];
    tlv::encode(tags::KEY_TEMPLATE, &inner, &mut outer);
    outer
}

#[test]
fn private_only_derives_public() -> anyhow::Result<()> {
    let buff = template(&[(tags::PRIVATE_KEY, &PRIVATE_KEY)]);

    let k = ExportedKey::parse(&buff)?;
    assert_eq!(k.public_key.len(), 65);
    assert_eq!(k.public_key[0], 0x04);
    assert_eq!(k.address, ADDRESS);
    assert_eq!(k.private_key, *PRIVATE_KEY);

    Ok(())
}

#[test]
fn public_and_chain_code() -> anyhow::Result<()> {
    let public_key = public_from_private(&PRIVATE_KEY)?;
    let chain_code = [0x5au8; 32];

    let buff = template(&[
        (tags::PUBLIC_KEY, &public_key),
        (tags::CHAIN_CODE, &chain_code),
    ]);

    let k = ExportedKey::parse(&buff)?;
    assert_eq!(k.public_key, public_key);
    assert!(k.private_key.is_empty());
    assert_eq!(k.chain_code, chain_code);
    assert_eq!(k.address, ADDRESS);

    let v = serde_json::to_value(&k)?;
    assert_eq!(v["address"], ADDRESS);
    assert_eq!(v["publicKey"], format!("0x{}", hex::encode(&public_key)));
    assert_eq!(v["chainCode"], format!("0x{}", hex::encode(chain_code)));
    assert!(v.get("privateKey").is_none());

    Ok(())
}

#[test]
fn missing_keys_yield_empty() {
    // Template without key fields
    let k = ExportedKey::decode(&template(&[]));
    assert!(k.is_empty());
    assert!(k.address.is_empty());

    // Truncated and garbage responses
    let mut truncated = template(&[(tags::PRIVATE_KEY, &PRIVATE_KEY)]);
    truncated.truncate(10);

    for b in [&truncated[..], &[][..], &[0xA1, 0x80][..], &[0x90, 0x00][..]] {
        assert!(ExportedKey::decode(b).is_empty(), "expected empty key for {b:02x?}");
    }

    // Private key out of range
    assert!(ExportedKey::decode(&template(&[(tags::PRIVATE_KEY, &[0u8; 32])])).is_empty());
}

#[test]
fn address_requires_uncompressed_key() {
    assert_eq!(address(&[0x04; 64]), None);
    assert_eq!(address(&[0x02; 65]), None);
    assert!(address(&public_from_private(&PRIVATE_KEY).unwrap()).is_some());
}

#[test]
fn random_private_keys() {
    for _ in 0..16 {
        let private_key: [u8; 32] = rand::random();

        // Skip the (unlikely) out of range scalars
        let public_key = match public_from_private(&private_key) {
            Ok(p) => p,
            Err(_) => continue,
        };

        let k = ExportedKey::decode(&template(&[(tags::PRIVATE_KEY, &private_key)]));
        assert_eq!(k.public_key, public_key);
        assert_eq!(k.address, address(&public_key).unwrap());
    }
}
