//! The revocation ledger.
//!
//! Revocation never deletes: a revoked certificate keeps its record and
//! serial forever, gains a timestamp, and shows up in CRLs until its own
//! validity lapses.

use crate::ca::lookup;
use crate::error::{Result, VaultError};
use crate::store::record::CertRecord;
use crate::store::vault::Vault;
use chrono::Utc;
use tracing::info;

/// Revoke the certificate matching `needle` (common name or serial).
///
/// Expired certificates are still revocable. Fails with
/// [`VaultError::NotFound`] when nothing matches and
/// [`VaultError::AlreadyRevoked`] when every match is already revoked;
/// existing revocation timestamps are never overwritten.
///
/// Revoking an intermediate CA does not touch the certificates it issued;
/// each must be revoked on its own.
pub fn revoke(vault: &mut Vault, needle: &str) -> Result<u64> {
    let candidates = lookup::matching_serials(vault, needle);
    if candidates.is_empty() {
        return Err(VaultError::NotFound(needle.to_string()));
    }

    // A revoked-and-reissued CN matches twice; the live record is the one
    // to revoke.
    let serial = candidates
        .iter()
        .copied()
        .find(|s| vault.get(*s).is_some_and(|record| !record.is_revoked()))
        .ok_or_else(|| VaultError::AlreadyRevoked(format!("{} (serial {})", needle, candidates[0])))?;

    let record = vault
        .get_mut(serial)
        .ok_or_else(|| VaultError::NotFound(format!("serial {}", serial)))?;

    record.revoked_at = Some(Utc::now().timestamp());
    info!(serial, common_name = %record.common_name(), "revoked certificate");

    Ok(serial)
}

/// Whether the certificate with `serial` is revoked.
pub fn is_revoked(vault: &Vault, serial: u64) -> Result<bool> {
    vault
        .get(serial)
        .map(CertRecord::is_revoked)
        .ok_or_else(|| VaultError::NotFound(format!("serial {}", serial)))
}

/// The revocation timestamp of `serial`, if it has one.
pub fn revoked_since(vault: &Vault, serial: u64) -> Result<Option<i64>> {
    vault
        .get(serial)
        .map(|record| record.revoked_at)
        .ok_or_else(|| VaultError::NotFound(format!("serial {}", serial)))
}

/// All revoked certificates, ordered by revocation timestamp.
///
/// The sequence is finite and restartable; nothing is mutated.
pub fn revoked_certs(vault: &Vault) -> impl Iterator<Item = (i64, &CertRecord)> {
    let mut revoked: Vec<(i64, &CertRecord)> = vault
        .certs()
        .filter_map(|record| record.revoked_at.map(|at| (at, record)))
        .collect();
    revoked.sort_by_key(|(at, record)| (*at, record.serial));
    revoked.into_iter()
}
