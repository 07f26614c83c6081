//! Private-key wrapping using AES-GCM.
//!
//! An issued certificate's private key may carry its own passphrase on top
//! of the store password. The wrapped layout is:
//!
//! `[salt (32 bytes)][nonce (12 bytes)][ciphertext (variable)]`
//!
//! Wrapping uses the `PrivateKey` derivation context, so the store password
//! and a per-key passphrase never share key material.

use crate::crypto::password::{
    derive_key, generate_salt, KdfContext, KdfParams, SALT_LENGTH,
};
use crate::error::{Result, VaultError};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

/// The length of the nonce used for AES-GCM encryption.
pub(crate) const NONCE_LENGTH: usize = 12;

/// Wrap a private key under its own passphrase.
///
/// # Example
///
/// ```
/// use certvault::crypto::encryption::{unwrap_key, wrap_key};
///
/// let seed = b"an ed25519 seed goes here";
/// let wrapped = wrap_key(seed, "key passphrase").unwrap();
/// let unwrapped = unwrap_key(&wrapped, "key passphrase").unwrap();
/// assert_eq!(seed.as_slice(), unwrapped.as_slice());
/// ```
pub fn wrap_key(key: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let salt = generate_salt();
    let derived = derive_key(passphrase, &salt, &KdfParams::default(), KdfContext::PrivateKey)?;

    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&derived)
        .map_err(|e| VaultError::Encryption(format!("invalid key length: {}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), key)
        .map_err(|e| VaultError::Encryption(format!("encryption failed: {}", e)))?;

    let mut output = Vec::with_capacity(SALT_LENGTH + NONCE_LENGTH + ciphertext.len());
    output.extend_from_slice(&salt);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);

    Ok(output)
}

/// Unwrap a private key with its passphrase.
///
/// Fails with [`VaultError::Auth`] on a wrong passphrase or tampered data.
pub fn unwrap_key(wrapped: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let min_length = SALT_LENGTH + NONCE_LENGTH;
    if wrapped.len() < min_length {
        return Err(VaultError::Encryption(format!(
            "wrapped key too short: expected at least {} bytes, got {}",
            min_length,
            wrapped.len()
        )));
    }

    let salt = &wrapped[0..SALT_LENGTH];
    let nonce_bytes = &wrapped[SALT_LENGTH..SALT_LENGTH + NONCE_LENGTH];
    let ciphertext = &wrapped[SALT_LENGTH + NONCE_LENGTH..];

    let derived = derive_key(passphrase, salt, &KdfParams::default(), KdfContext::PrivateKey)?;

    let cipher = Aes256Gcm::new_from_slice(&derived)
        .map_err(|e| VaultError::Encryption(format!("invalid key length: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| VaultError::Auth("wrong private-key passphrase".to_string()))
}
