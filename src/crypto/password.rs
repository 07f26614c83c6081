//! Password-based key derivation.
//!
//! This module derives AES-256 keys from passwords using Argon2id. The work
//! factors are explicit so they can be recorded in the store header, and a
//! derivation context tag keeps the store password and per-key passphrases
//! in independent key spaces even for identical password material.

use crate::error::{Result, VaultError};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

/// The length of the salt used for key derivation.
pub const SALT_LENGTH: usize = 32;

/// The length of the derived key.
pub const KEY_LENGTH: usize = 32;

/// Argon2id memory cost in KiB (64 MiB).
pub const DEFAULT_M_COST: u32 = 65536;

/// Argon2id iteration count.
pub const DEFAULT_T_COST: u32 = 3;

/// Argon2id parallelism.
pub const DEFAULT_P_COST: u32 = 1;

/// What a derived key protects.
///
/// The context byte is appended to the salt before derivation, so the store
/// envelope key and a private-key wrapping key can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfContext {
    /// The store-wide encryption envelope.
    Store,
    /// A single private key wrapped under its own passphrase.
    PrivateKey,
}

impl KdfContext {
    fn tag(self) -> u8 {
        match self {
            KdfContext::Store => 0x53,
            KdfContext::PrivateKey => 0x4b,
        }
    }
}

/// Argon2id work factors, as recorded in the store header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: DEFAULT_M_COST,
            t_cost: DEFAULT_T_COST,
            p_cost: DEFAULT_P_COST,
        }
    }
}

/// Generate a random salt for key derivation.
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive an encryption key from a password, salt, and derivation context.
///
/// # Example
///
/// ```
/// use certvault::crypto::password::{derive_key, generate_salt, KdfContext, KdfParams, KEY_LENGTH};
///
/// let salt = generate_salt();
/// let params = KdfParams::default();
/// let store_key = derive_key("secret", &salt, &params, KdfContext::Store).unwrap();
/// let wrap_key = derive_key("secret", &salt, &params, KdfContext::PrivateKey).unwrap();
///
/// assert_eq!(store_key.len(), KEY_LENGTH);
/// // Same password and salt, different contexts: different keys.
/// assert_ne!(store_key, wrap_key);
/// ```
pub fn derive_key(
    password: &str,
    salt: &[u8],
    params: &KdfParams,
    context: KdfContext,
) -> Result<[u8; KEY_LENGTH]> {
    if salt.len() != SALT_LENGTH {
        return Err(VaultError::KeyDerivation(format!(
            "salt must be {} bytes, got {}",
            SALT_LENGTH,
            salt.len()
        )));
    }

    let argon_params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LENGTH))
        .map_err(|e| VaultError::KeyDerivation(format!("invalid Argon2 parameters: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut salted = Vec::with_capacity(SALT_LENGTH + 1);
    salted.extend_from_slice(salt);
    salted.push(context.tag());

    let mut output = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(password.as_bytes(), &salted, &mut output)
        .map_err(|e| VaultError::KeyDerivation(format!("Argon2 error: {}", e)))?;

    Ok(output)
}
