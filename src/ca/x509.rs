//! X.509 certificate and CRL construction.
//!
//! This module assembles TBS structures with the `x509-cert` types, encodes
//! the extensions the store relies on (basic constraints, key usage,
//! extended key usage, subject alternative names), and signs them with
//! Ed25519. Everything here is deterministic given its inputs; serials and
//! timestamps come from the caller.

use crate::crypto::keys::Keypair;
use crate::error::{Result, VaultError};
use crate::store::record::{CertKind, Subject};
use const_oid::db::{rfc4519, rfc5280, rfc8410};
use const_oid::AssociatedOid;
use der::asn1::{BitString, GeneralizedTime, Ia5String, OctetString, UtcTime, Utf8StringRef};
use der::{Decode, Encode};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::net::IpAddr;
use std::time::Duration as StdDuration;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName,
};
use x509_cert::ext::Extension;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};

/// Inputs for building one certificate.
pub(crate) struct CertSpec<'a> {
    pub serial: u64,
    pub subject: &'a Subject,
    /// Subject of the signing CA (or of `subject` itself when self-signed).
    pub issuer: &'a Subject,
    pub not_before: i64,
    pub not_after: i64,
    pub kind: CertKind,
    /// Path-length budget, present only for CA certificates.
    pub path_len: Option<u8>,
    pub dns_names: &'a [String],
    pub ip_addresses: &'a [IpAddr],
    pub email_addresses: &'a [String],
}

/// Build and sign a certificate, returning its DER encoding.
///
/// `signing_key` is the issuer's key; for a self-signed root it is the same
/// key as `subject_key`.
pub(crate) fn build_certificate(
    spec: &CertSpec<'_>,
    subject_key: &Keypair,
    signing_key: &Keypair,
) -> Result<Vec<u8>> {
    let signature_algorithm = ed25519_algorithm();

    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: serial_number(spec.serial)?,
        signature: signature_algorithm.clone(),
        issuer: rdn_from_subject(spec.issuer)?,
        validity: validity(spec.not_before, spec.not_after)?,
        subject: rdn_from_subject(spec.subject)?,
        subject_public_key_info: subject_public_key_info(subject_key)?,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(build_extensions(spec)?),
    };

    let signature = sign_der(&tbs.to_der().map_err(encode_err)?, signing_key)?;

    let cert = Certificate {
        tbs_certificate: tbs,
        signature_algorithm,
        signature,
    };

    cert.to_der().map_err(encode_err)
}

fn build_extensions(spec: &CertSpec<'_>) -> Result<Vec<Extension>> {
    let mut extensions = Vec::new();

    if spec.kind.is_ca() {
        extensions.push(extension(
            &BasicConstraints {
                ca: true,
                path_len_constraint: spec.path_len,
            },
            true,
        )?);
        extensions.push(extension(
            &KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign),
            true,
        )?);
    } else {
        extensions.push(extension(
            &KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment),
            true,
        )?);
    }

    match spec.kind {
        CertKind::Server => {
            extensions.push(extension(
                &ExtendedKeyUsage(vec![rfc5280::ID_KP_SERVER_AUTH]),
                false,
            )?);
        }
        CertKind::Client => {
            extensions.push(extension(
                &ExtendedKeyUsage(vec![rfc5280::ID_KP_CLIENT_AUTH]),
                false,
            )?);
        }
        CertKind::RootCa | CertKind::IntermediateCa => {}
    }

    let san = subject_alt_names(spec)?;
    if !san.0.is_empty() {
        extensions.push(extension(&san, false)?);
    }

    Ok(extensions)
}

fn subject_alt_names(spec: &CertSpec<'_>) -> Result<SubjectAltName> {
    let mut names = Vec::new();

    for dns in spec.dns_names {
        let name = Ia5String::new(dns)
            .map_err(|e| VaultError::Certificate(format!("invalid DNS name '{}': {}", dns, e)))?;
        names.push(GeneralName::DnsName(name));
    }

    for ip in spec.ip_addresses {
        let bytes = match ip {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        let octets = OctetString::new(bytes).map_err(encode_err)?;
        names.push(GeneralName::IpAddress(octets));
    }

    for email in spec.email_addresses {
        let name = Ia5String::new(email).map_err(|e| {
            VaultError::Certificate(format!("invalid email address '{}': {}", email, e))
        })?;
        names.push(GeneralName::Rfc822Name(name));
    }

    Ok(SubjectAltName(names))
}

fn extension<T: Encode + AssociatedOid>(value: &T, critical: bool) -> Result<Extension> {
    Ok(Extension {
        extn_id: T::OID,
        critical,
        extn_value: OctetString::new(value.to_der().map_err(encode_err)?).map_err(encode_err)?,
    })
}

/// Build an `RdnSequence` from subject components, one RDN per attribute
/// in C, O, OU, CN order.
pub(crate) fn rdn_from_subject(subject: &Subject) -> Result<RdnSequence> {
    let mut rdns = Vec::new();

    if let Some(country) = &subject.country {
        rdns.push(rdn_attr(rfc4519::C, country)?);
    }
    if let Some(org) = &subject.organization {
        rdns.push(rdn_attr(rfc4519::O, org)?);
    }
    if let Some(ou) = &subject.organizational_unit {
        rdns.push(rdn_attr(rfc4519::OU, ou)?);
    }
    rdns.push(rdn_attr(rfc4519::CN, &subject.common_name)?);

    Ok(RdnSequence(rdns))
}

fn rdn_attr(oid: const_oid::ObjectIdentifier, value: &str) -> Result<RelativeDistinguishedName> {
    let attr = AttributeTypeAndValue {
        oid,
        value: Utf8StringRef::new(value)
            .map_err(|e| VaultError::Parse(format!("invalid attribute value '{}': {}", value, e)))?
            .into(),
    };

    let mut set = der::asn1::SetOfVec::new();
    set.insert_ordered(attr).map_err(encode_err)?;

    Ok(RelativeDistinguishedName::from(set))
}

/// Encode a store serial as a minimal positive DER INTEGER.
pub(crate) fn serial_number(serial: u64) -> Result<SerialNumber> {
    let bytes = serial.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(7);
    let mut minimal = bytes[first..].to_vec();
    if minimal[0] & 0x80 != 0 {
        minimal.insert(0, 0);
    }

    SerialNumber::new(&minimal)
        .map_err(|e| VaultError::Certificate(format!("invalid serial number: {}", e)))
}

/// A DER time from Unix seconds, UTCTime while it fits, GeneralizedTime
/// from 2050 on.
pub(crate) fn der_time(unix_secs: i64) -> Result<Time> {
    if unix_secs < 0 {
        return Err(VaultError::Validity(format!(
            "timestamp {} precedes the Unix epoch",
            unix_secs
        )));
    }

    let duration = StdDuration::from_secs(unix_secs as u64);
    match UtcTime::from_unix_duration(duration) {
        Ok(utc) => Ok(Time::UtcTime(utc)),
        Err(_) => GeneralizedTime::from_unix_duration(duration)
            .map(Time::GeneralTime)
            .map_err(|e| VaultError::Certificate(format!("invalid timestamp: {}", e))),
    }
}

pub(crate) fn validity(not_before: i64, not_after: i64) -> Result<Validity> {
    Ok(Validity {
        not_before: der_time(not_before)?,
        not_after: der_time(not_after)?,
    })
}

pub(crate) fn ed25519_algorithm() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: rfc8410::ID_ED_25519,
        parameters: None,
    }
}

fn subject_public_key_info(keypair: &Keypair) -> Result<SubjectPublicKeyInfoOwned> {
    let subject_public_key =
        BitString::from_bytes(&keypair.public_bytes()).map_err(encode_err)?;

    Ok(SubjectPublicKeyInfoOwned {
        algorithm: ed25519_algorithm(),
        subject_public_key,
    })
}

/// Sign DER bytes with an Ed25519 key, as a certificate/CRL signature value.
pub(crate) fn sign_der(der_bytes: &[u8], keypair: &Keypair) -> Result<BitString> {
    let signature = keypair.sign(der_bytes);
    BitString::from_bytes(&signature.to_bytes()).map_err(encode_err)
}

/// Decode a certificate from PEM.
pub fn cert_from_pem(pem_str: &str) -> Result<Certificate> {
    let parsed =
        pem::parse(pem_str).map_err(|e| VaultError::Pem(format!("failed to parse PEM: {}", e)))?;

    if parsed.tag() != "CERTIFICATE" {
        return Err(VaultError::Pem(format!(
            "expected CERTIFICATE, got {}",
            parsed.tag()
        )));
    }

    Certificate::from_der(parsed.contents())
        .map_err(|e| VaultError::Certificate(format!("failed to decode certificate: {}", e)))
}

fn encode_err(e: der::Error) -> VaultError {
    VaultError::Certificate(format!("DER encoding error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::Subject;

    fn server_subject() -> Subject {
        Subject {
            common_name: "www.example.com".to_string(),
            country: Some("US".to_string()),
            organization: Some("Example Corp".to_string()),
            organizational_unit: None,
        }
    }

    fn build_test_cert(kind: CertKind) -> (Vec<u8>, Keypair, Keypair) {
        let subject_key = Keypair::generate();
        let signing_key = Keypair::generate();
        let subject = server_subject();
        let issuer = Subject::from_common_name("Test CA");

        let spec = CertSpec {
            serial: 42,
            subject: &subject,
            issuer: &issuer,
            not_before: 1_700_000_000,
            not_after: 1_760_000_000,
            kind,
            path_len: kind.is_ca().then_some(2),
            dns_names: &["www.example.com".to_string()],
            ip_addresses: &[],
            email_addresses: &[],
        };

        let der = build_certificate(&spec, &subject_key, &signing_key).unwrap();
        (der, subject_key, signing_key)
    }

    #[test]
    fn test_build_certificate_decodes() {
        let (der, subject_key, _) = build_test_cert(CertKind::Server);
        let cert = Certificate::from_der(&der).unwrap();

        assert_eq!(cert.tbs_certificate.version, Version::V3);
        assert_eq!(
            cert.tbs_certificate
                .subject_public_key_info
                .subject_public_key
                .raw_bytes(),
            subject_key.public_bytes()
        );
    }

    #[test]
    fn test_certificate_signature_verifies() {
        use ed25519_dalek::{Signature, Verifier};

        let (der, _, signing_key) = build_test_cert(CertKind::Server);
        let cert = Certificate::from_der(&der).unwrap();

        let tbs_der = cert.tbs_certificate.to_der().unwrap();
        let sig_bytes: [u8; 64] = cert
            .signature
            .raw_bytes()
            .try_into()
            .expect("ed25519 signature is 64 bytes");
        let signature = Signature::from_bytes(&sig_bytes);

        assert!(signing_key.public.verify(&tbs_der, &signature).is_ok());
    }

    #[test]
    fn test_ca_cert_has_constraints() {
        let (der, _, _) = build_test_cert(CertKind::IntermediateCa);
        let cert = Certificate::from_der(&der).unwrap();

        let extensions = cert.tbs_certificate.extensions.unwrap();
        let bc = extensions
            .iter()
            .find(|e| e.extn_id == BasicConstraints::OID)
            .expect("CA cert carries basic constraints");
        assert!(bc.critical);

        let decoded = BasicConstraints::from_der(bc.extn_value.as_bytes()).unwrap();
        assert!(decoded.ca);
        assert_eq!(decoded.path_len_constraint, Some(2));
    }

    #[test]
    fn test_leaf_cert_has_no_basic_constraints() {
        let (der, _, _) = build_test_cert(CertKind::Server);
        let cert = Certificate::from_der(&der).unwrap();

        let extensions = cert.tbs_certificate.extensions.unwrap();
        assert!(extensions
            .iter()
            .all(|e| e.extn_id != BasicConstraints::OID));
    }

    #[test]
    fn test_server_cert_eku() {
        let (der, _, _) = build_test_cert(CertKind::Server);
        let cert = Certificate::from_der(&der).unwrap();

        let extensions = cert.tbs_certificate.extensions.unwrap();
        let eku = extensions
            .iter()
            .find(|e| e.extn_id == ExtendedKeyUsage::OID)
            .expect("server cert carries EKU");

        let decoded = ExtendedKeyUsage::from_der(eku.extn_value.as_bytes()).unwrap();
        assert_eq!(decoded.0, vec![rfc5280::ID_KP_SERVER_AUTH]);
    }

    #[test]
    fn test_san_encoding() {
        let subject = server_subject();
        let issuer = Subject::from_common_name("Test CA");
        let key = Keypair::generate();

        let spec = CertSpec {
            serial: 3,
            subject: &subject,
            issuer: &issuer,
            not_before: 1_700_000_000,
            not_after: 1_760_000_000,
            kind: CertKind::Server,
            path_len: None,
            dns_names: &["www.example.com".to_string(), "example.com".to_string()],
            ip_addresses: &["10.0.0.1".parse().unwrap()],
            email_addresses: &[],
        };

        let der = build_certificate(&spec, &key, &key).unwrap();
        let cert = Certificate::from_der(&der).unwrap();

        let extensions = cert.tbs_certificate.extensions.unwrap();
        let san = extensions
            .iter()
            .find(|e| e.extn_id == SubjectAltName::OID)
            .expect("SAN extension present");

        let decoded = SubjectAltName::from_der(san.extn_value.as_bytes()).unwrap();
        assert_eq!(decoded.0.len(), 3);

        let dns: Vec<String> = decoded
            .0
            .iter()
            .filter_map(|n| match n {
                GeneralName::DnsName(name) => Some(name.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(dns, vec!["www.example.com", "example.com"]);

        let ips: Vec<Vec<u8>> = decoded
            .0
            .iter()
            .filter_map(|n| match n {
                GeneralName::IpAddress(octets) => Some(octets.as_bytes().to_vec()),
                _ => None,
            })
            .collect();
        assert_eq!(ips, vec![vec![10, 0, 0, 1]]);
    }

    #[test]
    fn test_serial_number_minimal_encoding() {
        // Small serials stay single-byte.
        let small = serial_number(1).unwrap();
        assert_eq!(small.as_bytes(), &[1]);

        // High-bit serials get a leading zero to stay positive.
        let high = serial_number(0x80).unwrap();
        assert_eq!(high.as_bytes(), &[0x00, 0x80]);

        let wide = serial_number(0x1_0000).unwrap();
        assert_eq!(wide.as_bytes(), &[0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_der_time_ranges() {
        // 2023 fits in UTCTime.
        assert!(matches!(der_time(1_700_000_000), Ok(Time::UtcTime(_))));

        // 2060 needs GeneralizedTime.
        assert!(matches!(der_time(2_840_140_800), Ok(Time::GeneralTime(_))));

        // Pre-epoch is rejected.
        assert!(der_time(-1).is_err());
    }

    #[test]
    fn test_cert_from_pem_rejects_other_tags() {
        let block = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![0u8; 8]));
        match cert_from_pem(&block) {
            Err(VaultError::Pem(msg)) => assert!(msg.contains("expected CERTIFICATE")),
            _ => panic!("expected Pem error"),
        }
    }

    #[test]
    fn test_rdn_includes_all_components() {
        let rdn = rdn_from_subject(&server_subject()).unwrap();
        // C, O, CN (no OU in the fixture).
        assert_eq!(rdn.0.len(), 3);
    }
}
