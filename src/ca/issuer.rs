//! Server and client certificate issuance.

use crate::ca::x509::{build_certificate, CertSpec};
use crate::crypto::encryption::wrap_key;
use crate::crypto::keys::Keypair;
use crate::error::{Result, VaultError};
use crate::store::record::{CertKind, CertRecord, KeyMaterial};
use crate::store::vault::Vault;
use chrono::{Duration, Utc};
use std::net::IpAddr;
use tracing::{info, warn};

/// A request for a new server certificate.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub validity: Duration,
    /// Wrap the issued private key under its own passphrase.
    pub key_passphrase: Option<String>,
}

/// A request for a new client certificate.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub common_name: String,
    pub email: Option<String>,
    pub validity: Duration,
    pub key_passphrase: Option<String>,
}

/// The outcome of an issuance.
#[derive(Debug, Clone)]
pub struct Issued {
    pub serial: u64,
    /// A non-fatal condition worth surfacing to the operator.
    pub warning: Option<String>,
}

/// Issue a server certificate signed by `signer_serial`.
///
/// The common name is added to the DNS SANs when it looks like a hostname
/// (contains an interior dot and is not an IP literal). Issuing with no
/// DNS names and no IP addresses succeeds but returns a warning, since
/// TLS hostname verification will not be possible until reissued.
pub fn issue_server(
    vault: &mut Vault,
    signer_serial: u64,
    request: ServerRequest,
) -> Result<Issued> {
    let mut dns_names = request.dns_names;
    if looks_like_hostname(&request.common_name)
        && !dns_names.contains(&request.common_name)
    {
        dns_names.push(request.common_name.clone());
    }

    let warning = if dns_names.is_empty() && request.ip_addresses.is_empty() {
        let message = format!(
            "server '{}' has no DNS names or IP addresses; TLS hostname verification may not be possible",
            request.common_name
        );
        warn!("{}", message);
        Some(message)
    } else {
        None
    };

    let serial = issue(
        vault,
        signer_serial,
        IssueParams {
            common_name: &request.common_name,
            kind: CertKind::Server,
            dns_names,
            ip_addresses: request.ip_addresses,
            email_addresses: vec![],
            validity: request.validity,
            key_passphrase: request.key_passphrase.as_deref(),
        },
    )?;

    Ok(Issued { serial, warning })
}

/// Issue a client certificate signed by `signer_serial`.
///
/// When no email address is given and the common name contains an interior
/// `@`, the common name doubles as the email SAN.
pub fn issue_client(
    vault: &mut Vault,
    signer_serial: u64,
    request: ClientRequest,
) -> Result<Issued> {
    let email_addresses = match request.email {
        Some(email) => vec![email],
        None if looks_like_email(&request.common_name) => vec![request.common_name.clone()],
        None => vec![],
    };

    let serial = issue(
        vault,
        signer_serial,
        IssueParams {
            common_name: &request.common_name,
            kind: CertKind::Client,
            dns_names: vec![],
            ip_addresses: vec![],
            email_addresses,
            validity: request.validity,
            key_passphrase: request.key_passphrase.as_deref(),
        },
    )?;

    Ok(Issued {
        serial,
        warning: None,
    })
}

struct IssueParams<'a> {
    common_name: &'a str,
    kind: CertKind,
    dns_names: Vec<String>,
    ip_addresses: Vec<IpAddr>,
    email_addresses: Vec<String>,
    validity: Duration,
    key_passphrase: Option<&'a str>,
}

fn issue(vault: &mut Vault, signer_serial: u64, params: IssueParams<'_>) -> Result<u64> {
    if params.validity <= Duration::zero() {
        return Err(VaultError::Validity(format!(
            "validity of {} seconds is not positive",
            params.validity.num_seconds()
        )));
    }

    let signer = vault
        .get(signer_serial)
        .ok_or_else(|| VaultError::NotFound(format!("signer serial {}", signer_serial)))?;
    if !signer.kind.is_ca() {
        return Err(VaultError::NotCa(signer.common_name().to_string()));
    }

    let not_before = Utc::now().timestamp();
    let not_after = not_before + params.validity.num_seconds();

    // The signer must be able to vouch for the whole requested window.
    if not_before < signer.not_before || not_after > signer.not_after {
        return Err(VaultError::SignerExpired(format!(
            "CA '{}' is valid {} through {}, cannot cover {} through {}",
            signer.common_name(),
            signer.not_before,
            signer.not_after,
            not_before,
            not_after
        )));
    }

    let subject = signer.subject.with_common_name(params.common_name);
    let signing_key = signer.signing_keypair()?;
    let signer_subject = signer.subject.clone();

    let keypair = Keypair::generate();
    let serial = vault.allocate_serial();

    let cert_der = build_certificate(
        &CertSpec {
            serial,
            subject: &subject,
            issuer: &signer_subject,
            not_before,
            not_after,
            kind: params.kind,
            path_len: None,
            dns_names: &params.dns_names,
            ip_addresses: &params.ip_addresses,
            email_addresses: &params.email_addresses,
        },
        &keypair,
        &signing_key,
    )?;

    let key = match params.key_passphrase {
        Some(passphrase) => KeyMaterial::Wrapped(wrap_key(&keypair.seed_bytes(), passphrase)?),
        None => KeyMaterial::Plain(keypair.seed_bytes().to_vec()),
    };

    info!(
        serial,
        common_name = params.common_name,
        kind = %params.kind,
        signer = signer_serial,
        "issued certificate"
    );

    vault.insert(CertRecord {
        serial,
        subject,
        kind: params.kind,
        dns_names: params.dns_names,
        ip_addresses: params.ip_addresses,
        email_addresses: params.email_addresses,
        not_before,
        not_after,
        issuer_serial: Some(signer_serial),
        path_len: None,
        cert_der,
        key,
        revoked_at: None,
    });

    Ok(serial)
}

/// Whether a common name reads as a hostname: an interior dot and not an
/// IP literal.
fn looks_like_hostname(common_name: &str) -> bool {
    common_name.parse::<IpAddr>().is_err()
        && common_name.find('.').is_some_and(|index| index > 0)
}

/// Whether a common name reads as an email address (interior `@`).
fn looks_like_email(common_name: &str) -> bool {
    common_name.find('@').is_some_and(|index| index > 0)
}
