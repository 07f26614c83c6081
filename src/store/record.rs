//! Certificate records as persisted inside the store.

use crate::crypto::encryption::unwrap_key;
use crate::crypto::keys::Keypair;
use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// What role a certificate plays in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertKind {
    RootCa,
    IntermediateCa,
    Server,
    Client,
}

impl CertKind {
    /// Whether this kind may sign other certificates.
    pub fn is_ca(self) -> bool {
        matches!(self, CertKind::RootCa | CertKind::IntermediateCa)
    }
}

impl std::fmt::Display for CertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CertKind::RootCa => "root-CA",
            CertKind::IntermediateCa => "CA",
            CertKind::Server => "server",
            CertKind::Client => "client",
        };
        f.write_str(label)
    }
}

/// Subject name components of a certificate.
///
/// Issued certificates inherit the signing CA's country/organization fields
/// with only the common name replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub common_name: String,
    pub country: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
}

impl Subject {
    /// A subject with only a common name set.
    pub fn from_common_name(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            country: None,
            organization: None,
            organizational_unit: None,
        }
    }

    /// The same org-level fields with a different common name.
    pub fn with_common_name(&self, common_name: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            ..self.clone()
        }
    }
}

/// Private-key material for one certificate.
///
/// `Plain` seeds are protected only by the store envelope. `Wrapped` seeds
/// carry an additional AES-GCM envelope under a per-key passphrase; losing
/// that passphrase makes the key unusable even though the store still opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyMaterial {
    Plain(Vec<u8>),
    Wrapped(Vec<u8>),
}

impl KeyMaterial {
    /// Whether a passphrase is needed to use this key.
    pub fn is_wrapped(&self) -> bool {
        matches!(self, KeyMaterial::Wrapped(_))
    }
}

/// One certificate in the store: identity, constraints, the signed DER
/// certificate, key material, and revocation state.
///
/// Serial, subject, and validity are immutable after issuance; only the
/// revocation timestamp ever changes, and records are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertRecord {
    pub serial: u64,
    pub subject: Subject,
    pub kind: CertKind,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub email_addresses: Vec<String>,
    /// Validity window as Unix seconds.
    pub not_before: i64,
    pub not_after: i64,
    /// Serial of the signing CA; `None` only for the root.
    pub issuer_serial: Option<u64>,
    /// Remaining path-length budget; `Some` only for CA entries.
    pub path_len: Option<u8>,
    /// The signed certificate, DER-encoded.
    pub cert_der: Vec<u8>,
    pub key: KeyMaterial,
    /// Unix timestamp of revocation, set at most once.
    pub revoked_at: Option<i64>,
}

impl CertRecord {
    pub fn common_name(&self) -> &str {
        &self.subject.common_name
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.not_after
    }

    /// The certificate as a PEM block.
    pub fn cert_pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.cert_der.clone()))
    }

    /// The keypair for signing operations.
    ///
    /// Only `Plain` keys can sign; CA entries are never passphrase-wrapped.
    pub(crate) fn signing_keypair(&self) -> Result<Keypair> {
        match &self.key {
            KeyMaterial::Plain(seed) => Keypair::from_seed(seed),
            KeyMaterial::Wrapped(_) => Err(VaultError::Certificate(format!(
                "private key of '{}' is passphrase-protected and cannot sign",
                self.common_name()
            ))),
        }
    }

    /// The private key as a PKCS#8 PEM block.
    ///
    /// Wrapped keys require their passphrase; a missing passphrase is an
    /// [`VaultError::Auth`] failure, a wrong one fails the same way from
    /// the AES-GCM tag check.
    pub fn private_key_pem(&self, passphrase: Option<&str>) -> Result<String> {
        let keypair = match &self.key {
            KeyMaterial::Plain(seed) => Keypair::from_seed(seed)?,
            KeyMaterial::Wrapped(blob) => {
                let passphrase = passphrase.ok_or_else(|| {
                    VaultError::Auth(format!(
                        "private key of '{}' requires its passphrase",
                        self.common_name()
                    ))
                })?;
                let seed = unwrap_key(blob, passphrase)?;
                Keypair::from_seed(&seed)?
            }
        };

        Ok(keypair.to_pkcs8_pem())
    }
}
