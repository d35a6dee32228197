// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Simulated keycard applet state

use std::{collections::HashMap, sync::Arc};

use k256::ecdsa::SigningKey;
use log::{debug, info};
use parking_lot::Mutex;
use rand::Rng;
use sha2::{Digest, Sha256};

use keycard_flow::{
    card::{ApplicationInfo, ApplicationStatus, ExportType, RecoverableSignature},
    core::{
        path,
        tlv::{self, tags},
        Seed,
    },
    CardError, Pairing,
};

/// Factory PIN used by [SimCard::new]
pub const DEFAULT_PIN: &str = "000000";
/// Factory PUK used by [SimCard::new]
pub const DEFAULT_PUK: &str = "123456789012";
/// Factory pairing password used by [SimCard::new]
pub const DEFAULT_PAIRING_PASSWORD: &str = "KeycardDefaultPairing";

/// Pairing slots per card
pub const PAIRING_SLOTS: usize = 5;

const PIN_ATTEMPTS: u8 = 3;
const PUK_ATTEMPTS: u8 = 5;

const SW_SECURITY_NOT_SATISFIED: u16 = 0x6982;
const SW_CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
const SW_WRONG_DATA: u16 = 0x6a80;
const SW_INCORRECT_P1P2: u16 = 0x6a86;
const SW_REFERENCED_DATA_NOT_FOUND: u16 = 0x6a88;

#[derive(Debug)]
struct CardState {
    instance_uid: [u8; 16],
    initialized: bool,

    pin: String,
    puk: String,
    pairing_password: String,
    pin_retries: u8,
    puk_retries: u8,

    pairings: [Option<Vec<u8>>; PAIRING_SLOTS],

    seed: Option<Vec<u8>>,
    current_path: String,

    data: HashMap<u8, Vec<u8>>,
    version: (u8, u8),

    panic_on_select: bool,
}

impl CardState {
    fn fresh() -> Self {
        Self {
            instance_uid: rand::random(),
            initialized: false,
            pin: String::new(),
            puk: String::new(),
            pairing_password: String::new(),
            pin_retries: PIN_ATTEMPTS,
            puk_retries: PUK_ATTEMPTS,
            pairings: Default::default(),
            seed: None,
            current_path: path::MASTER_PATH.to_string(),
            data: HashMap::new(),
            version: (3, 1),
            panic_on_select: false,
        }
    }

    /// Signing key for a derivation path
    ///
    /// Keys are `sha256(seed || path)`, which is enough for exercising
    /// flows but is not BIP32 compatible.
    fn key_for(&self, p: &str) -> Result<SigningKey, CardError> {
        let seed = self
            .seed
            .as_ref()
            .ok_or(CardError::Status(SW_CONDITIONS_NOT_SATISFIED))?;

        path::parse(p).map_err(|_| CardError::Status(SW_WRONG_DATA))?;

        let mut h = Sha256::new();
        h.update(seed);
        h.update(p.as_bytes());

        SigningKey::from_slice(&h.finalize()).map_err(|_| CardError::Status(SW_WRONG_DATA))
    }

    fn key_uid(&self) -> Vec<u8> {
        match self.key_for(path::MASTER_PATH) {
            Ok(k) => Sha256::digest(public_key(&k)).to_vec(),
            Err(_) => vec![],
        }
    }
}

fn public_key(k: &SigningKey) -> Vec<u8> {
    k.verifying_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec()
}

/// Simulated keycard, shared between the test harness and sessions
#[derive(Clone, Debug)]
pub struct SimCard {
    state: Arc<Mutex<CardState>>,
}

impl SimCard {
    /// Initialised card with factory secrets and no keys
    pub fn new() -> Self {
        let mut s = CardState::fresh();

        s.initialized = true;
        s.pin = DEFAULT_PIN.to_string();
        s.puk = DEFAULT_PUK.to_string();
        s.pairing_password = DEFAULT_PAIRING_PASSWORD.to_string();

        Self {
            state: Arc::new(Mutex::new(s)),
        }
    }

    /// Factory fresh card, requiring INIT
    pub fn uninitialized() -> Self {
        Self {
            state: Arc::new(Mutex::new(CardState::fresh())),
        }
    }

    /// Load keys derived from a mnemonic with an empty passphrase
    pub fn load_mnemonic(self, mnemonic: &str) -> Result<Self, keycard_flow::core::Error> {
        let seed = Seed::derive(mnemonic, "")?;
        self.state.lock().seed = Some(seed.as_bytes().to_vec());
        Ok(self)
    }

    /// Replace the pairing password
    pub fn with_pairing_password(self, password: &str) -> Self {
        self.state.lock().pairing_password = password.to_string();
        self
    }

    /// Replace the PIN
    pub fn with_pin(self, pin: &str) -> Self {
        self.state.lock().pin = pin.to_string();
        self
    }

    /// Occupy all pairing slots
    pub fn with_full_slots(self) -> Self {
        for p in self.state.lock().pairings.iter_mut() {
            *p = Some(rand::random::<[u8; 32]>().to_vec());
        }
        self
    }

    /// Write the public data slot directly
    pub fn with_data(self, tag: u8, data: &[u8]) -> Self {
        self.state.lock().data.insert(tag, data.to_vec());
        self
    }

    /// Panic inside SELECT, for exercising host fault handling
    pub fn with_select_panic(self) -> Self {
        self.state.lock().panic_on_select = true;
        self
    }

    pub fn instance_uid(&self) -> String {
        hex::encode(self.state.lock().instance_uid)
    }

    /// Key UID as hex with `0x` prefix, empty without keys
    pub fn key_uid(&self) -> String {
        let uid = self.state.lock().key_uid();
        match uid.is_empty() {
            true => String::new(),
            false => format!("0x{}", hex::encode(uid)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn has_keys(&self) -> bool {
        self.state.lock().seed.is_some()
    }

    pub fn pin(&self) -> String {
        self.state.lock().pin.clone()
    }

    pub fn puk(&self) -> String {
        self.state.lock().puk.clone()
    }

    pub fn pairing_password(&self) -> String {
        self.state.lock().pairing_password.clone()
    }

    pub fn pin_retries(&self) -> u8 {
        self.state.lock().pin_retries
    }

    /// Number of occupied pairing slots
    pub fn paired_slots(&self) -> usize {
        self.state.lock().pairings.iter().filter(|p| p.is_some()).count()
    }

    /// Drop the pairing in `index`, as if removed by another host
    pub fn unpair(&self, index: u8) {
        if let Some(p) = self.state.lock().pairings.get_mut(index as usize) {
            *p = None;
        }
    }

    pub fn data(&self, tag: u8) -> Option<Vec<u8>> {
        self.state.lock().data.get(&tag).cloned()
    }

    /// Uncompressed public key for a derivation path
    pub fn public_key(&self, p: &str) -> Option<Vec<u8>> {
        self.state.lock().key_for(p).ok().map(|k| public_key(&k))
    }

    pub(crate) fn ptr_eq(&self, other: &SimCard) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn select(&self) -> ApplicationInfo {
        let s = self.state.lock();

        if s.panic_on_select {
            drop(s);
            panic!("Simulated card fault on SELECT");
        }

        // Uninitialised cards only expose their secure channel key
        if !s.initialized {
            return ApplicationInfo {
                initialized: false,
                secure_channel_public_key: vec![0x04; 65],
                ..Default::default()
            };
        }

        ApplicationInfo {
            instance_uid: s.instance_uid.to_vec(),
            key_uid: s.key_uid(),
            initialized: true,
            available_slots: s.pairings.iter().filter(|p| p.is_none()).count() as u8,
            app_version: s.version.0,
            app_version_minor: s.version.1,
            secure_channel_public_key: vec![0x04; 65],
        }
    }

    pub(crate) fn init(&self, pin: &str, puk: &str, password: &str) -> Result<(), CardError> {
        let mut s = self.state.lock();

        if s.initialized {
            return Err(CardError::Status(SW_CONDITIONS_NOT_SATISFIED));
        }

        s.initialized = true;
        s.pin = pin.to_string();
        s.puk = puk.to_string();
        s.pairing_password = password.to_string();
        s.pin_retries = PIN_ATTEMPTS;
        s.puk_retries = PUK_ATTEMPTS;

        info!("Initialised card {}", hex::encode(s.instance_uid));

        Ok(())
    }

    pub(crate) fn pair(&self, password: &str) -> Result<Pairing, CardError> {
        let mut s = self.state.lock();

        if !s.initialized {
            return Err(CardError::NotInitialized);
        }

        let index = s
            .pairings
            .iter()
            .position(|p| p.is_none())
            .ok_or(CardError::NoAvailableSlots)?;

        if password != s.pairing_password {
            return Err(CardError::InvalidPairing);
        }

        let key = rand::random::<[u8; 32]>().to_vec();
        s.pairings[index] = Some(key.clone());

        debug!("Paired slot {index}");

        Ok(Pairing {
            key,
            index: index as u8,
        })
    }

    pub(crate) fn check_pairing(&self, pairing: &Pairing) -> Result<(), CardError> {
        let s = self.state.lock();

        match s.pairings.get(pairing.index as usize) {
            Some(Some(k)) if k == &pairing.key => Ok(()),
            _ => Err(CardError::SecureChannel),
        }
    }

    pub(crate) fn verify_pin(&self, pin: &str) -> Result<(), CardError> {
        let mut s = self.state.lock();

        if s.pin_retries == 0 {
            return Err(CardError::Blocked);
        }

        if pin != s.pin {
            s.pin_retries -= 1;
            return Err(CardError::WrongPin {
                remaining: s.pin_retries,
            });
        }

        s.pin_retries = PIN_ATTEMPTS;
        Ok(())
    }

    pub(crate) fn status(&self) -> ApplicationStatus {
        let s = self.state.lock();

        ApplicationStatus {
            pin_retry_count: s.pin_retries,
            puk_retry_count: s.puk_retries,
            key_initialized: s.seed.is_some(),
        }
    }

    pub(crate) fn change_pin(&self, pin: &str) -> Result<(), CardError> {
        if pin.len() != 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(CardError::Status(SW_WRONG_DATA));
        }

        let mut s = self.state.lock();
        s.pin = pin.to_string();
        s.pin_retries = PIN_ATTEMPTS;

        Ok(())
    }

    pub(crate) fn change_puk(&self, puk: &str) -> Result<(), CardError> {
        if puk.len() != 12 || !puk.chars().all(|c| c.is_ascii_digit()) {
            return Err(CardError::Status(SW_WRONG_DATA));
        }

        let mut s = self.state.lock();
        s.puk = puk.to_string();
        s.puk_retries = PUK_ATTEMPTS;

        Ok(())
    }

    pub(crate) fn unblock_pin(&self, puk: &str, new_pin: &str) -> Result<(), CardError> {
        let mut s = self.state.lock();

        if s.puk_retries == 0 {
            return Err(CardError::Blocked);
        }

        if puk != s.puk {
            s.puk_retries -= 1;
            return Err(CardError::WrongPuk {
                remaining: s.puk_retries,
            });
        }

        s.puk_retries = PUK_ATTEMPTS;
        s.pin = new_pin.to_string();
        s.pin_retries = PIN_ATTEMPTS;

        Ok(())
    }

    pub(crate) fn change_pairing_secret(&self, password: &str) -> Result<(), CardError> {
        if password.is_empty() {
            return Err(CardError::Status(SW_WRONG_DATA));
        }

        self.state.lock().pairing_password = password.to_string();
        Ok(())
    }

    pub(crate) fn generate_mnemonic(&self, checksum_size: u8) -> Result<Vec<u16>, CardError> {
        if !(4..=8).contains(&checksum_size) {
            return Err(CardError::Status(SW_INCORRECT_P1P2));
        }

        let mut rng = rand::thread_rng();
        let words = checksum_size as usize * 3;

        Ok((0..words).map(|_| rng.gen_range(0..2048)).collect())
    }

    pub(crate) fn load_seed(&self, seed: &[u8]) -> Result<Vec<u8>, CardError> {
        if seed.len() != 64 {
            return Err(CardError::Status(SW_WRONG_DATA));
        }

        let mut s = self.state.lock();
        s.seed = Some(seed.to_vec());
        s.current_path = path::MASTER_PATH.to_string();

        let uid = s.key_uid();
        info!("Loaded keys, key uid: {}", hex::encode(&uid));

        Ok(uid)
    }

    pub(crate) fn export_key(
        &self,
        make_current: bool,
        p: &str,
        export_type: ExportType,
    ) -> Result<Vec<u8>, CardError> {
        let mut s = self.state.lock();
        let k = s.key_for(p)?;

        // Private keys are only exportable below the EIP-1581 root
        if export_type == ExportType::PrivateAndPublic
            && !p.starts_with(&format!("{}/", path::EIP1581_PATH))
        {
            return Err(CardError::Status(SW_CONDITIONS_NOT_SATISFIED));
        }

        if make_current {
            s.current_path = p.to_string();
        }

        let mut template = vec![];
        tlv::encode(tags::PUBLIC_KEY, &public_key(&k), &mut template);

        match export_type {
            ExportType::PrivateAndPublic => {
                tlv::encode(tags::PRIVATE_KEY, &k.to_bytes(), &mut template)
            }
            ExportType::ExtendedPublic => {
                let mut h = Sha256::new();
                h.update(k.to_bytes());
                h.update(b"chain");
                tlv::encode(tags::CHAIN_CODE, &h.finalize(), &mut template);
            }
            ExportType::PublicOnly => (),
        }

        let mut buff = vec![];
        tlv::encode(tags::KEY_TEMPLATE, &template, &mut buff);

        Ok(buff)
    }

    pub(crate) fn sign(
        &self,
        hash: &[u8],
        p: Option<&str>,
    ) -> Result<RecoverableSignature, CardError> {
        if hash.len() != 32 {
            return Err(CardError::Status(SW_WRONG_DATA));
        }

        let s = self.state.lock();
        let p = p.unwrap_or(s.current_path.as_str());
        let k = s.key_for(p)?;

        let (sig, recid) = k
            .sign_prehash_recoverable(hash)
            .map_err(|_| CardError::Status(SW_WRONG_DATA))?;

        let b = sig.to_bytes();

        Ok(RecoverableSignature {
            r: b[..32].to_vec(),
            s: b[32..].to_vec(),
            v: recid.to_byte(),
        })
    }

    pub(crate) fn get_data(&self, tag: u8) -> Result<Vec<u8>, CardError> {
        match tag {
            0..=2 => Ok(self.state.lock().data.get(&tag).cloned().unwrap_or_default()),
            _ => Err(CardError::Status(SW_REFERENCED_DATA_NOT_FOUND)),
        }
    }

    pub(crate) fn store_data(&self, tag: u8, data: &[u8]) -> Result<(), CardError> {
        if tag > 2 {
            return Err(CardError::Status(SW_REFERENCED_DATA_NOT_FOUND));
        }

        self.state.lock().data.insert(tag, data.to_vec());
        Ok(())
    }

    /// Wipe the card back to factory state with a new instance UID
    pub fn factory_reset(&self) {
        let mut s = self.state.lock();
        *s = CardState::fresh();

        info!("Card reset, new instance uid {}", hex::encode(s.instance_uid));
    }
}

impl Default for SimCard {
    fn default() -> Self {
        Self::new()
    }
}

/// Security gate failures
pub(crate) fn security_not_satisfied() -> CardError {
    CardError::Status(SW_SECURITY_NOT_SATISFIED)
}

#[cfg(test)]
mod test {
    use super::*;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn pairing_slots() {
        let c = SimCard::new();

        assert_eq!(c.pair("nope"), Err(CardError::InvalidPairing));

        for i in 0..PAIRING_SLOTS {
            let p = c.pair(DEFAULT_PAIRING_PASSWORD).unwrap();
            assert_eq!(p.index as usize, i);
            c.check_pairing(&p).unwrap();
        }

        assert_eq!(
            c.pair(DEFAULT_PAIRING_PASSWORD),
            Err(CardError::NoAvailableSlots)
        );

        c.unpair(2);
        assert_eq!(c.paired_slots(), PAIRING_SLOTS - 1);
    }

    #[test]
    fn pin_attempts() {
        let c = SimCard::new();

        assert_eq!(c.verify_pin("1"), Err(CardError::WrongPin { remaining: 2 }));
        c.verify_pin(DEFAULT_PIN).unwrap();
        assert_eq!(c.pin_retries(), PIN_ATTEMPTS);

        for r in (0..PIN_ATTEMPTS).rev() {
            assert_eq!(c.verify_pin("1"), Err(CardError::WrongPin { remaining: r }));
        }
        assert_eq!(c.verify_pin(DEFAULT_PIN), Err(CardError::Blocked));
    }

    #[test]
    fn private_export_restricted() {
        let c = SimCard::new().load_mnemonic(MNEMONIC).unwrap();

        assert!(c
            .export_key(false, path::WHISPER_PATH, ExportType::PrivateAndPublic)
            .is_ok());
        assert_eq!(
            c.export_key(false, path::WALLET_PATH, ExportType::PrivateAndPublic),
            Err(CardError::Status(SW_CONDITIONS_NOT_SATISFIED))
        );
    }

    #[test]
    fn factory_reset() {
        let c = SimCard::new().load_mnemonic(MNEMONIC).unwrap();
        let uid = c.instance_uid();

        c.factory_reset();

        assert!(!c.is_initialized());
        assert!(!c.has_keys());
        assert_ne!(c.instance_uid(), uid);
    }
}
