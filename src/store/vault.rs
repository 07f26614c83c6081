//! The credential store aggregate.
//!
//! A [`Vault`] is the decrypted, in-memory form of one store file: the
//! serial counter and every certificate record ever issued. All mutating
//! operations work on the in-memory state; [`Vault::persist`] writes the
//! whole store back atomically.

use crate::crypto::password::KdfParams;
use crate::error::{Result, VaultError};
use crate::store::envelope;
use crate::store::record::{CertKind, CertRecord, Subject};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Serialized store state, the plaintext inside the envelope.
///
/// `BTreeMap` keeps certificate iteration in ascending serial order, which
/// makes listings and CRL entries deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultState {
    pub version: u32,
    pub next_serial: u64,
    pub certs: BTreeMap<u64, CertRecord>,
}

/// An open credential store.
pub struct Vault {
    path: PathBuf,
    password: String,
    kdf: KdfParams,
    state: VaultState,
}

impl Vault {
    /// Create a new store at `path` with a freshly generated root CA.
    ///
    /// Fails with [`VaultError::AlreadyExists`] if `path` already holds a
    /// valid store. The root CA gets serial 1; the counter continues at 2.
    pub fn create(
        path: &Path,
        password: &str,
        root_subject: Subject,
        validity: Duration,
    ) -> Result<Self> {
        Self::create_with_params(path, password, root_subject, validity, KdfParams::default())
    }

    /// [`Vault::create`] with explicit Argon2 work factors.
    pub fn create_with_params(
        path: &Path,
        password: &str,
        root_subject: Subject,
        validity: Duration,
        kdf: KdfParams,
    ) -> Result<Self> {
        Self::guard_against_overwrite(path)?;

        let mut vault = Self {
            path: path.to_path_buf(),
            password: password.to_string(),
            kdf,
            state: VaultState {
                version: envelope::FORMAT_VERSION,
                next_serial: 1,
                certs: BTreeMap::new(),
            },
        };

        let root_serial = crate::ca::hierarchy::create_root(&mut vault, root_subject, validity)?;
        vault.persist()?;

        info!(store = %path.display(), root_serial, "created new credential store");
        Ok(vault)
    }

    /// Open an existing store.
    ///
    /// Fails with [`VaultError::NotFound`] if `path` does not exist and
    /// [`VaultError::Auth`] on a wrong password or a corrupted file.
    pub fn open(path: &Path, password: &str) -> Result<Self> {
        if !path.exists() {
            return Err(VaultError::NotFound(format!(
                "no store at {}",
                path.display()
            )));
        }

        let data = std::fs::read(path)?;
        let kdf = envelope::kdf_params(&data)?;
        let plaintext = envelope::open(&data, password)?;
        let state: VaultState = serde_json::from_slice(&plaintext)?;

        debug!(store = %path.display(), certs = state.certs.len(), "opened credential store");

        Ok(Self {
            path: path.to_path_buf(),
            password: password.to_string(),
            kdf,
            state,
        })
    }

    /// Serialize, encrypt, and atomically replace the store file.
    pub fn persist(&self) -> Result<()> {
        let plaintext = serde_json::to_vec(&self.state)?;
        let sealed = envelope::seal(&plaintext, &self.password, &self.kdf)?;
        envelope::write_atomic(&self.path, &sealed)?;

        debug!(store = %self.path.display(), "persisted credential store");
        Ok(())
    }

    /// Replace the store password.
    ///
    /// The state is re-encrypted under a fresh salt and atomically swapped
    /// in; the old password stops working the moment this returns.
    pub fn rekey(&mut self, new_password: &str) -> Result<()> {
        self.password = new_password.to_string();
        self.persist()?;

        info!(store = %self.path.display(), "store password changed");
        Ok(())
    }

    /// Rebuild a store from a JSON dump produced by [`Vault::export_json`].
    pub fn import_json(path: &Path, password: &str, json: &str) -> Result<Self> {
        Self::guard_against_overwrite(path)?;

        let mut state: VaultState = serde_json::from_str(json)?;

        // A dump may predate some issuance; never re-use a serial.
        let max_serial = state.certs.keys().next_back().copied().unwrap_or(0);
        state.next_serial = state.next_serial.max(max_serial + 1);

        let vault = Self {
            path: path.to_path_buf(),
            password: password.to_string(),
            kdf: KdfParams::default(),
            state,
        };
        vault.persist()?;

        info!(store = %path.display(), "imported credential store from JSON");
        Ok(vault)
    }

    /// Dump the full decrypted state as pretty JSON (migration/backup).
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.state)?)
    }

    /// Allocate the next serial number.
    pub fn allocate_serial(&mut self) -> u64 {
        let serial = self.state.next_serial;
        self.state.next_serial += 1;
        serial
    }

    pub fn insert(&mut self, record: CertRecord) {
        self.state.certs.insert(record.serial, record);
    }

    pub fn get(&self, serial: u64) -> Option<&CertRecord> {
        self.state.certs.get(&serial)
    }

    pub fn get_mut(&mut self, serial: u64) -> Option<&mut CertRecord> {
        self.state.certs.get_mut(&serial)
    }

    /// All records in ascending serial order.
    pub fn certs(&self) -> impl Iterator<Item = &CertRecord> {
        self.state.certs.values()
    }

    /// The root CA record.
    pub fn root(&self) -> Result<&CertRecord> {
        self.certs()
            .find(|c| c.kind == CertKind::RootCa)
            .ok_or_else(|| VaultError::Certificate("store has no root CA".to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard_against_overwrite(path: &Path) -> Result<()> {
        if path.exists() {
            let existing = std::fs::read(path)?;
            if envelope::is_store(&existing) {
                return Err(VaultError::AlreadyExists(format!(
                    "{} already holds a credential store",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
