//! The CA key hierarchy: root creation, intermediate chaining, and signer
//! resolution.

use crate::ca::lookup;
use crate::ca::x509::{build_certificate, CertSpec};
use crate::crypto::keys::Keypair;
use crate::error::{Result, VaultError};
use crate::store::record::{CertKind, CertRecord, KeyMaterial, Subject};
use crate::store::vault::Vault;
use chrono::{Duration, Utc};
use tracing::info;

/// Path-length budget of a fresh root CA. Each intermediate level below it
/// gets one less.
pub const DEFAULT_ROOT_PATH_LEN: u8 = 4;

/// Create the self-signed root CA. Called once, from store initialization.
pub(crate) fn create_root(
    vault: &mut Vault,
    subject: Subject,
    validity: Duration,
) -> Result<u64> {
    let (not_before, not_after) = window(validity)?;

    let keypair = Keypair::generate();
    let serial = vault.allocate_serial();

    let cert_der = build_certificate(
        &CertSpec {
            serial,
            subject: &subject,
            issuer: &subject,
            not_before,
            not_after,
            kind: CertKind::RootCa,
            path_len: Some(DEFAULT_ROOT_PATH_LEN),
            dns_names: &[],
            ip_addresses: &[],
            email_addresses: &[],
        },
        &keypair,
        &keypair,
    )?;

    info!(serial, common_name = %subject.common_name, "created root CA");

    vault.insert(CertRecord {
        serial,
        subject,
        kind: CertKind::RootCa,
        dns_names: vec![],
        ip_addresses: vec![],
        email_addresses: vec![],
        not_before,
        not_after,
        issuer_serial: None,
        path_len: Some(DEFAULT_ROOT_PATH_LEN),
        cert_der,
        key: KeyMaterial::Plain(keypair.seed_bytes().to_vec()),
        revoked_at: None,
    });

    Ok(serial)
}

/// Create an intermediate CA signed by `signer_serial`.
///
/// The new CA's path-length budget is the signer's minus one; a signer with
/// no budget left fails with [`VaultError::Constraint`]. The subject
/// inherits the signer's org-level fields.
pub fn new_intermediate(
    vault: &mut Vault,
    signer_serial: u64,
    common_name: &str,
    validity: Duration,
) -> Result<u64> {
    let (not_before, not_after) = window(validity)?;

    let signer = vault
        .get(signer_serial)
        .ok_or_else(|| VaultError::NotFound(format!("signer serial {}", signer_serial)))?;
    if !signer.kind.is_ca() {
        return Err(VaultError::NotCa(signer.common_name().to_string()));
    }

    let budget = signer.path_len.unwrap_or(0);
    if budget == 0 {
        return Err(VaultError::Constraint(format!(
            "CA '{}' cannot sign further intermediates",
            signer.common_name()
        )));
    }

    let subject = signer.subject.with_common_name(common_name);
    let signing_key = signer.signing_keypair()?;
    let signer_subject = signer.subject.clone();
    let signer_serial = signer.serial;

    let keypair = Keypair::generate();
    let serial = vault.allocate_serial();

    let cert_der = build_certificate(
        &CertSpec {
            serial,
            subject: &subject,
            issuer: &signer_subject,
            not_before,
            not_after,
            kind: CertKind::IntermediateCa,
            path_len: Some(budget - 1),
            dns_names: &[],
            ip_addresses: &[],
            email_addresses: &[],
        },
        &keypair,
        &signing_key,
    )?;

    info!(
        serial,
        common_name,
        signer = signer_serial,
        budget = budget - 1,
        "created intermediate CA"
    );

    vault.insert(CertRecord {
        serial,
        subject,
        kind: CertKind::IntermediateCa,
        dns_names: vec![],
        ip_addresses: vec![],
        email_addresses: vec![],
        not_before,
        not_after,
        issuer_serial: Some(signer_serial),
        path_len: Some(budget - 1),
        cert_der,
        key: KeyMaterial::Plain(keypair.seed_bytes().to_vec()),
        revoked_at: None,
    });

    Ok(serial)
}

/// Resolve the signing CA for an operation.
///
/// With no name the root signs. An explicit name is looked up by common
/// name or serial and must be a CA entry, else [`VaultError::NotCa`]. An
/// expired signer still resolves; issuance-time window checks live in the
/// issuer.
pub fn resolve_signer(vault: &Vault, name: Option<&str>) -> Result<u64> {
    let serial = match name {
        None => vault.root()?.serial,
        Some(needle) => lookup::find(vault, needle)?.serial(),
    };

    let record = vault
        .get(serial)
        .ok_or_else(|| VaultError::NotFound(format!("serial {}", serial)))?;
    if !record.kind.is_ca() {
        return Err(VaultError::NotCa(record.common_name().to_string()));
    }

    Ok(serial)
}

/// Turn a requested validity duration into a concrete window starting now.
pub(crate) fn window(validity: Duration) -> Result<(i64, i64)> {
    if validity <= Duration::zero() {
        return Err(VaultError::Validity(format!(
            "validity of {} seconds is not positive",
            validity.num_seconds()
        )));
    }

    let not_before = Utc::now().timestamp();
    let not_after = not_before + validity.num_seconds();
    Ok((not_before, not_after))
}
