//! certvault: a small-organization certificate authority in one file.
//!
//! The whole PKI (root CA, chained intermediate CAs, issued server and
//! client certificates, private keys, and revocation state) lives in a
//! single store file protected by password-derived authenticated
//! encryption (Argon2id + AES-256-GCM). The library provides:
//!
//! - Creating, opening, atomically persisting, and rekeying the store
//! - A signing hierarchy with path-length budgets
//! - Server/client issuance with SAN and validity-window enforcement
//! - A revocation ledger and signed X.509 CRL generation
//! - Lookup by common name or serial, and trust-chain export
//!
//! Operations return `Result` types throughout; the core never aborts the
//! process, prints, or prompts. Those concerns belong to the CLI binary.
//!
//! # Example
//!
//! ```rust,no_run
//! use certvault::ca::issuer::{issue_server, ServerRequest};
//! use certvault::ca::hierarchy::resolve_signer;
//! use certvault::store::record::Subject;
//! use certvault::Vault;
//!
//! fn example() -> certvault::Result<()> {
//!     let path = std::path::Path::new("pki.db");
//!     let mut vault = Vault::create(
//!         path,
//!         "store password",
//!         Subject::from_common_name("Example Root CA"),
//!         chrono::Duration::days(365 * 5),
//!     )?;
//!
//!     let signer = resolve_signer(&vault, None)?;
//!     let issued = issue_server(
//!         &mut vault,
//!         signer,
//!         ServerRequest {
//!             common_name: "www.example.com".to_string(),
//!             dns_names: vec![],
//!             ip_addresses: vec![],
//!             validity: chrono::Duration::days(365 * 2),
//!             key_passphrase: None,
//!         },
//!     )?;
//!     println!("issued serial {}", issued.serial);
//!
//!     vault.persist()?;
//!     Ok(())
//! }
//! ```

pub mod ca;
pub mod crypto;
pub mod error;
pub mod prompt;
pub mod store;

// Re-export commonly used types
pub use error::{Result, VaultError};
pub use store::vault::Vault;
