//! Certificate lookup and chain resolution.

use crate::error::{Result, VaultError};
use crate::store::record::CertKind;
use crate::store::vault::Vault;
use chrono::Utc;

/// Outcome of a successful lookup.
///
/// An expired certificate is still found (callers like `delete` can
/// revoke it), but the distinction is explicit so callers that need a
/// live certificate can reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    Found(u64),
    FoundExpired(u64),
}

impl Match {
    /// The matched serial, live or not.
    pub fn serial(self) -> u64 {
        match self {
            Match::Found(serial) | Match::FoundExpired(serial) => serial,
        }
    }
}

/// Find a certificate by common name or serial.
///
/// A needle that parses as a serial (decimal or `0x`-prefixed hex) and
/// matches an existing record wins outright. Common names are scanned with
/// deterministic precedence: root CA, then intermediate CAs, then servers,
/// then clients. A CA shadowing a leaf with the same CN resolves to the
/// CA.
pub fn find(vault: &Vault, needle: &str) -> Result<Match> {
    let now = Utc::now().timestamp();
    let serial = matching_serials(vault, needle)
        .into_iter()
        .next()
        .ok_or_else(|| VaultError::NotFound(needle.to_string()))?;

    let expired = vault
        .get(serial)
        .map(|record| record.is_expired_at(now))
        .unwrap_or(false);

    Ok(if expired {
        Match::FoundExpired(serial)
    } else {
        Match::Found(serial)
    })
}

/// Serials of every record matching `needle`, in precedence order.
///
/// A CN can match more than once when a certificate was revoked and
/// reissued under the same name.
pub(crate) fn matching_serials(vault: &Vault, needle: &str) -> Vec<u64> {
    if let Some(serial) = parse_serial(needle) {
        if vault.get(serial).is_some() {
            return vec![serial];
        }
    }

    const PRECEDENCE: [CertKind; 4] = [
        CertKind::RootCa,
        CertKind::IntermediateCa,
        CertKind::Server,
        CertKind::Client,
    ];

    let mut found = Vec::new();
    for kind in PRECEDENCE {
        for record in vault.certs().filter(|c| c.kind == kind) {
            if record.common_name() == needle {
                found.push(record.serial);
            }
        }
    }
    found
}

/// Like [`find`], but an expired match is an error.
pub fn find_live(vault: &Vault, needle: &str) -> Result<u64> {
    match find(vault, needle)? {
        Match::Found(serial) => Ok(serial),
        Match::FoundExpired(_) => Err(VaultError::Expired(needle.to_string())),
    }
}

/// The CA chain of a certificate: its issuing CA first, the root last.
///
/// The root itself has an empty chain.
pub fn chain_for(vault: &Vault, serial: u64) -> Result<Vec<u64>> {
    let record = vault
        .get(serial)
        .ok_or_else(|| VaultError::NotFound(format!("serial {}", serial)))?;

    let mut chain = Vec::new();
    let mut cursor = record.issuer_serial;
    while let Some(ca_serial) = cursor {
        let ca = vault.get(ca_serial).ok_or_else(|| {
            VaultError::Certificate(format!("issuer serial {} missing from store", ca_serial))
        })?;
        chain.push(ca_serial);
        cursor = ca.issuer_serial;
    }

    Ok(chain)
}

/// Concatenated PEM: the certificate itself, then its chain in
/// [`chain_for`] order.
pub fn chain_pem(vault: &Vault, serial: u64) -> Result<String> {
    let record = vault
        .get(serial)
        .ok_or_else(|| VaultError::NotFound(format!("serial {}", serial)))?;

    let mut output = record.cert_pem();
    for ca_serial in chain_for(vault, serial)? {
        // chain_for already proved these serials exist.
        if let Some(ca) = vault.get(ca_serial) {
            output.push_str(&ca.cert_pem());
        }
    }

    Ok(output)
}

fn parse_serial(needle: &str) -> Option<u64> {
    if let Some(hex_digits) = needle.strip_prefix("0x").or_else(|| needle.strip_prefix("0X")) {
        u64::from_str_radix(hex_digits, 16).ok()
    } else {
        needle.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::hierarchy::new_intermediate;
    use crate::ca::issuer::{issue_client, issue_server, ClientRequest, ServerRequest};
    use crate::crypto::password::KdfParams;
    use crate::store::record::Subject;
    use chrono::Duration;
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

    #[test]
    fn test_find_by_common_name() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;
        let serial = issue_test_server(&mut vault, root, "www.example.com");

        assert_eq!(
            find(&vault, "www.example.com").unwrap(),
            Match::Found(serial)
        );
    }

    #[test]
    fn test_find_by_serial() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;
        let serial = issue_test_server(&mut vault, root, "www.example.com");

        assert_eq!(
            find(&vault, &serial.to_string()).unwrap(),
            Match::Found(serial)
        );
        assert_eq!(
            find(&vault, &format!("{:#x}", serial)).unwrap(),
            Match::Found(serial)
        );
    }

    #[test]
    fn test_find_not_found() {
        let dir = TempDir::new().unwrap();
        let vault = test_vault(&dir);

        assert!(matches!(
            find(&vault, "missing.example.com"),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_precedence_ca_over_leaf() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;

        // A server certificate sharing the intermediate's CN, issued first
        // so a naive first-match scan would return it.
        let leaf = issue_test_server(&mut vault, root, "Shared Name");
        let ca = new_intermediate(&mut vault, root, "Shared Name", Duration::days(365)).unwrap();
        assert!(leaf < ca);

        assert_eq!(find(&vault, "Shared Name").unwrap(), Match::Found(ca));
    }

    #[test]
    fn test_find_expired_is_distinct() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;
        let serial = issue_test_server(&mut vault, root, "old.example.com");

        // Force the record into the past.
        let record = vault.get_mut(serial).unwrap();
        record.not_before -= 10_000_000;
        record.not_after = record.not_before + 100;

        assert_eq!(
            find(&vault, "old.example.com").unwrap(),
            Match::FoundExpired(serial)
        );
        assert!(matches!(
            find_live(&vault, "old.example.com"),
            Err(VaultError::Expired(_))
        ));
    }

    #[test]
    fn test_chain_for_through_intermediate() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;

        let ops = new_intermediate(&mut vault, root, "Ops", Duration::days(365 * 5)).unwrap();
        let leaf = issue_test_server(&mut vault, ops, "db.internal");

        assert_eq!(chain_for(&vault, leaf).unwrap(), vec![ops, root]);
        assert_eq!(chain_for(&vault, ops).unwrap(), vec![root]);
        assert_eq!(chain_for(&vault, root).unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn test_chain_pem_concatenation() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;

        let ops = new_intermediate(&mut vault, root, "Ops", Duration::days(365 * 5)).unwrap();
        let leaf = issue_test_server(&mut vault, ops, "db.internal");

        let chain = chain_pem(&vault, leaf).unwrap();
        assert_eq!(chain.matches("BEGIN CERTIFICATE").count(), 3);

        // Leaf first, root last.
        let leaf_pem = vault.get(leaf).unwrap().cert_pem();
        let root_pem = vault.get(root).unwrap().cert_pem();
        assert!(chain.starts_with(&leaf_pem));
        assert!(chain.ends_with(&root_pem));
    }

    #[test]
    fn test_client_lookup_after_servers() {
        let dir = TempDir::new().unwrap();
        let mut vault = test_vault(&dir);
        let root = vault.root().unwrap().serial;

        let client = issue_client(
            &mut vault,
            root,
            ClientRequest {
                common_name: "alice".to_string(),
                email: None,
                validity: Duration::days(365),
                key_passphrase: None,
            },
        )
        .unwrap()
        .serial;

        assert_eq!(find(&vault, "alice").unwrap(), Match::Found(client));
    }
}
