//! Certificate revocation list generation.

use crate::ca::x509::{der_time, ed25519_algorithm, rdn_from_subject, serial_number, sign_der};
use crate::error::{Result, VaultError};
use crate::store::vault::Vault;
use chrono::Utc;
use der::Encode;
use std::collections::BTreeSet;
use tracing::debug;
use x509_cert::certificate::Version;
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};

const SECONDS_PER_DAY: i64 = 86_400;

/// Build a signed X.509 v2 CRL for everything revoked under `signer_serial`.
///
/// Covers certificates signed directly by the signer or by any CA below it.
/// Revoked certificates whose own NotAfter has already passed are dropped:
/// a verifier rejects them regardless, and leaving them out keeps the CRL
/// compact. Entries are in strictly ascending serial order;
/// `nextUpdate = now + validity_days`. Returns the PEM encoding.
pub fn build_crl(vault: &Vault, signer_serial: u64, validity_days: u32) -> Result<String> {
    let signer = vault
        .get(signer_serial)
        .ok_or_else(|| VaultError::NotFound(format!("signer serial {}", signer_serial)))?;
    if !signer.kind.is_ca() {
        return Err(VaultError::NotCa(signer.common_name().to_string()));
    }

    let now = Utc::now().timestamp();
    let covered = cas_under(vault, signer_serial);

    // BTreeMap iteration keeps the entries in ascending serial order.
    let mut entries = Vec::new();
    for record in vault.certs() {
        match record.issuer_serial {
            Some(serial) if covered.contains(&serial) => {}
            _ => continue,
        }

        let revoked_at = match record.revoked_at {
            Some(at) => at,
            None => continue,
        };

        if record.is_expired_at(now) {
            continue;
        }

        entries.push(RevokedCert {
            serial_number: serial_number(record.serial)?,
            revocation_date: der_time(revoked_at)?,
            crl_entry_extensions: None,
        });
    }

    debug!(
        signer = signer_serial,
        entries = entries.len(),
        "building CRL"
    );

    let signature_algorithm = ed25519_algorithm();
    let tbs = TbsCertList {
        version: Version::V2,
        signature: signature_algorithm.clone(),
        issuer: rdn_from_subject(&signer.subject)?,
        this_update: der_time(now)?,
        next_update: Some(der_time(now + i64::from(validity_days) * SECONDS_PER_DAY)?),
        revoked_certificates: (!entries.is_empty()).then_some(entries),
        crl_extensions: None,
    };

    let signing_key = signer.signing_keypair()?;
    let tbs_der = tbs
        .to_der()
        .map_err(|e| VaultError::Certificate(format!("DER encoding error: {}", e)))?;
    let signature = sign_der(&tbs_der, &signing_key)?;

    let crl = CertificateList {
        tbs_cert_list: tbs,
        signature_algorithm,
        signature,
    };

    let crl_der = crl
        .to_der()
        .map_err(|e| VaultError::Certificate(format!("DER encoding error: {}", e)))?;

    Ok(pem::encode(&pem::Pem::new("X509 CRL", crl_der)))
}

/// The signer itself plus every CA transitively chained below it.
fn cas_under(vault: &Vault, signer_serial: u64) -> BTreeSet<u64> {
    let mut covered = BTreeSet::new();
    covered.insert(signer_serial);

    // Parents are always issued before children, so one ascending pass
    // closes the set.
    for record in vault.certs() {
        if !record.kind.is_ca() {
            continue;
        }
        if let Some(issuer) = record.issuer_serial {
            if covered.contains(&issuer) {
                covered.insert(record.serial);
            }
        }
    }

    covered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::hierarchy::new_intermediate;
    use crate::ca::issuer::{issue_server, ServerRequest};
    use crate::ca::revocation::revoke;
    use crate::crypto::password::KdfParams;
    use crate::store::record::Subject;
    use chrono::Duration;
    use der::Decode;
    use tempfile::TempDir;

    fn test_vault(dir: &TempDir) -> Vault {
        Vault::create_with_params(
            &dir.path().join("store.db"),
            "password",
            Subject::from_common_name("Test Root"),
            Duration::days(365 * 10),
            KdfParams {
                m_cost: 8,
                t_cost: 1,
                p_cost: 1,
            },
        )
        .unwrap()
    }

    fn issue_test_server(vault: &mut Vault, signer: u64, cn: &str) -> u64 {
        issue_server(
            vault,
            signer,
            ServerRequest {
                common_name: cn.to_string(),
                dns_names: vec![],
                ip_addresses: vec![],
                validity: Duration::days(365),
                key_passphrase: None,
            },
        )
        .unwrap()
        .serial
    }

    fn parse_crl(pem_str: &str) -> CertificateList {
        let parsed = pem::parse(pem_str).unwrap();
        assert_eq!(parsed.tag(), "X509 CRL");
        CertificateList::from_der(parsed.contents()).unwrap()
    }

    fn listed_serials(crl: &CertificateList) -> Vec<Vec<u8>> {
        crl.tbs_cert_list
            .revoked_certificates
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|entry| entry.serial_number.as_bytes().to_vec())
            .collect()
    }

    #[test]
    fn test_crl_empty_before_revocation() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;
        issue_test_server(&mut vault, root, "www.example.com");

        let crl = parse_crl(&build_crl(&vault, root, 30).unwrap());
        assert!(crl.tbs_cert_list.revoked_certificates.is_none());
    }

    #[test]
    fn test_crl_lists_revoked_serial() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;
        let serial = issue_test_server(&mut vault, root, "www.example.com");

        revoke(&mut vault, "www.example.com").unwrap();

        let crl = parse_crl(&build_crl(&vault, root, 30).unwrap());
        let serials = listed_serials(&crl);
        assert_eq!(serials.len(), 1);
        assert_eq!(serials[0], serial.to_be_bytes()[7..].to_vec());
    }

    #[test]
    fn test_crl_next_update_window() {
        let dir = TempDir::new().unwrap();
        let vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;

        let crl = parse_crl(&build_crl(&vault, root, 30).unwrap());

        let this_update = crl.tbs_cert_list.this_update.to_unix_duration().as_secs() as i64;
        let next_update = crl
            .tbs_cert_list
            .next_update
            .unwrap()
            .to_unix_duration()
            .as_secs() as i64;
        assert_eq!(next_update - this_update, 30 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_crl_signature_verifies() {
        use ed25519_dalek::{Signature, Verifier};

        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;
        issue_test_server(&mut vault, root, "www.example.com");
        revoke(&mut vault, "www.example.com").unwrap();

        let crl = parse_crl(&build_crl(&vault, root, 30).unwrap());
        let tbs_der = crl.tbs_cert_list.to_der().unwrap();
        let sig_bytes: [u8; 64] = crl.signature.raw_bytes().try_into().unwrap();

        let root_key = vault.root().unwrap().signing_keypair().unwrap();
        assert!(root_key
            .public
            .verify(&tbs_der, &Signature::from_bytes(&sig_bytes))
            .is_ok());
    }

    #[test]
    fn test_crl_includes_transitively_signed() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;
        let ops = new_intermediate(&mut vault, root, "Ops", Duration::days(3650)).unwrap();
        issue_test_server(&mut vault, ops, "db.internal");

        revoke(&mut vault, "db.internal").unwrap();

        // The root's CRL covers certs issued by the intermediate.
        let root_crl = parse_crl(&build_crl(&vault, root, 30).unwrap());
        assert_eq!(listed_serials(&root_crl).len(), 1);

        // The intermediate's own CRL covers them too.
        let ops_crl = parse_crl(&build_crl(&vault, ops, 30).unwrap());
        assert_eq!(listed_serials(&ops_crl).len(), 1);
    }

    #[test]
    fn test_crl_excludes_other_branches() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;
        let ops = new_intermediate(&mut vault, root, "Ops", Duration::days(3650)).unwrap();

        issue_test_server(&mut vault, root, "root-signed.example.com");
        revoke(&mut vault, "root-signed.example.com").unwrap();

        // Revoked under the root, so the intermediate's CRL must not list
        // it.
        let ops_crl = parse_crl(&build_crl(&vault, ops, 30).unwrap());
        assert!(ops_crl.tbs_cert_list.revoked_certificates.is_none());
    }

    #[test]
    fn test_crl_drops_lapsed_certs() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;
        let serial = issue_test_server(&mut vault, root, "old.example.com");

        revoke(&mut vault, "old.example.com").unwrap();

        // Push the certificate past its own NotAfter.
        let record = vault.get_mut(serial).unwrap();
        record.not_before -= 10_000_000;
        record.not_after = record.not_before + 100;

        let crl = parse_crl(&build_crl(&vault, root, 30).unwrap());
        assert!(crl.tbs_cert_list.revoked_certificates.is_none());
    }

    #[test]
    fn test_crl_entries_ascend_by_serial() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;

        issue_test_server(&mut vault, root, "a.example.com");
        issue_test_server(&mut vault, root, "b.example.com");
        issue_test_server(&mut vault, root, "c.example.com");

        // Revoke out of serial order.
        revoke(&mut vault, "c.example.com").unwrap();
        revoke(&mut vault, "a.example.com").unwrap();
        revoke(&mut vault, "b.example.com").unwrap();

        let crl = parse_crl(&build_crl(&vault, root, 30).unwrap());
        let serials = listed_serials(&crl);
        let mut sorted = serials.clone();
        sorted.sort();
        assert_eq!(serials, sorted);
        assert_eq!(serials.len(), 3);
    }

    #[test]
    fn test_crl_signer_must_be_ca() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;
        let leaf = issue_test_server(&mut vault, root, "www.example.com");

        assert!(matches!(
            build_crl(&vault, leaf, 30),
            Err(VaultError::NotCa(_))
        ));
    }
}
