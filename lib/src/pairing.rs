// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Persistent pairing storage
//!
//! Pairings are stored as a JSON object keyed by card instance UID:
//!
//! ```json
//! { "9a3f...": { "index": 1, "key": "5c8e..." } }
//! ```
//!
//! All mutation happens in memory, [PairingStore::save] persists the
//! whole map. Concurrent writers to the same path must be serialised by
//! the caller, two stores sharing a file will overwrite each other.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Error;

/// Pairing secret and slot for a card
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Pairing {
    pub key: Vec<u8>,
    pub index: u8,
}

impl std::fmt::Debug for Pairing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pairing")
            .field("index", &self.index)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// On-disk pairing record
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    index: u8,
    key: String,
}

/// Pairing store bound to a JSON file
#[derive(Debug)]
pub struct PairingStore {
    path: PathBuf,
    pairings: BTreeMap<String, Pairing>,
}

impl PairingStore {
    /// Create an empty store for `path` without reading it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pairings: BTreeMap::new(),
        }
    }

    /// Create a store and load any existing pairings
    ///
    /// Unreadable or corrupt files yield an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut s = Self::new(path);

        if let Err(e) = s.load() {
            warn!("Failed to load pairings from {}: {e}", s.path.display());
        }

        s
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory map with the file contents
    ///
    /// A missing file leaves the store empty. Malformed records are
    /// skipped with a warning.
    pub fn load(&mut self) -> Result<(), Error> {
        self.pairings.clear();

        let s = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No pairing file at {}", self.path.display());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let entries: Map<String, Value> = serde_json::from_str(&s)?;

        for (uid, v) in entries {
            match Self::parse_record(v) {
                Some(p) => {
                    self.pairings.insert(uid, p);
                }
                None => warn!("Skipping malformed pairing for {uid}"),
            }
        }

        debug!(
            "Loaded {} pairings from {}",
            self.pairings.len(),
            self.path.display()
        );

        Ok(())
    }

    fn parse_record(v: Value) -> Option<Pairing> {
        let r: Record = serde_json::from_value(v).ok()?;
        let key = hex::decode(&r.key).ok()?;

        if key.is_empty() {
            return None;
        }

        Some(Pairing {
            key,
            index: r.index,
        })
    }

    /// Write the full map, replacing the file via a temporary sibling
    pub fn save(&self) -> Result<(), Error> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let records: BTreeMap<&str, Record> = self
            .pairings
            .iter()
            .map(|(uid, p)| {
                let r = Record {
                    index: p.index,
                    key: hex::encode(&p.key),
                };
                (uid.as_str(), r)
            })
            .collect();

        let s = serde_json::to_string_pretty(&records)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");

        fs::write(&tmp, s)?;
        fs::rename(&tmp, &self.path)?;

        debug!(
            "Saved {} pairings to {}",
            self.pairings.len(),
            self.path.display()
        );

        Ok(())
    }

    /// Persist a shared store on the blocking pool
    pub async fn save_shared(store: Arc<Mutex<PairingStore>>) -> Result<(), Error> {
        tokio::task::spawn_blocking(move || store.lock().save())
            .await
            .map_err(|e| Error::Io(io::Error::new(ErrorKind::Other, e)))?
    }

    /// Store (or replace) the pairing for an instance UID
    pub fn store_pairing(&mut self, instance_uid: &str, pairing: Pairing) {
        self.pairings.insert(instance_uid.to_string(), pairing);
    }

    /// Fetch the pairing for an instance UID
    pub fn load_pairing(&self, instance_uid: &str) -> Option<Pairing> {
        self.pairings.get(instance_uid).cloned()
    }

    pub fn has_pairing(&self, instance_uid: &str) -> bool {
        self.pairings.contains_key(instance_uid)
    }

    /// Remove the pairing for an instance UID, returning whether one existed
    pub fn remove_pairing(&mut self, instance_uid: &str) -> bool {
        self.pairings.remove(instance_uid).is_some()
    }

    /// Instance UIDs with a stored pairing
    pub fn list_instance_uids(&self) -> Vec<String> {
        self.pairings.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.pairings.clear();
    }

    pub fn len(&self) -> usize {
        self.pairings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairings.is_empty()
    }
}
