//! Error types for certvault.
//!
//! One error enum covers the whole crate. The store core never aborts the
//! process; every operation returns a typed success value or one of these
//! errors, and the CLI boundary turns the error into a diagnostic and an
//! exit code.

use thiserror::Error;

/// The main error type for certvault operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Wrong password, wrong per-key passphrase, or a tampered/corrupted
    /// store file.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// No certificate matches the given common name or serial.
    #[error("not found: {0}")]
    NotFound(String),

    /// A certificate was found but its validity window has lapsed.
    ///
    /// This is a soft condition: an expired certificate can still be
    /// revoked or exported.
    #[error("certificate expired: {0}")]
    Expired(String),

    /// The certificate is already revoked.
    #[error("already revoked: {0}")]
    AlreadyRevoked(String),

    /// Signer resolution targeted an entry that is not a CA.
    #[error("not a CA: {0}")]
    NotCa(String),

    /// The signing CA's path-length budget is exhausted.
    #[error("path length constraint: {0}")]
    Constraint(String),

    /// The requested validity window is empty or inverted.
    #[error("invalid validity window: {0}")]
    Validity(String),

    /// The signer's own certificate does not cover the requested window.
    #[error("signer window: {0}")]
    SignerExpired(String),

    /// The target path already holds a valid store.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Filesystem failure opening or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key derivation failed.
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    /// Encryption or decryption failed for a structural reason
    /// (authentication failures are reported as [`VaultError::Auth`]).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Invalid key format or content.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Certificate or CRL construction/encoding error.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// PEM encoding/decoding error.
    #[error("PEM error: {0}")]
    Pem(String),

    /// Invalid input data.
    #[error("parse error: {0}")]
    Parse(String),
}

/// A specialized Result type for certvault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
