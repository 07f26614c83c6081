//! The on-disk envelope for the credential store.
//!
//! A store is a single file:
//!
//! ```text
//! [magic (8)][version (4, LE)][m_cost (4)][t_cost (4)][p_cost (4)]
//! [salt (32)][nonce (12)][AES-256-GCM ciphertext]
//! ```
//!
//! The key-derivation parameters travel in the header so work factors can
//! be raised later without breaking existing stores. The GCM tag makes any
//! tampering (header or body) surface as an authentication failure rather
//! than garbled plaintext.

use crate::crypto::password::{
    derive_key, generate_salt, KdfContext, KdfParams, SALT_LENGTH,
};
use crate::error::{Result, VaultError};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use std::io::Write;
use std::path::Path;

/// Identifies a certvault store file.
pub const MAGIC: &[u8; 8] = b"CERTVLT\x01";

/// Current store format version.
pub const FORMAT_VERSION: u32 = 1;

const NONCE_LENGTH: usize = 12;
const HEADER_LENGTH: usize = 8 + 4 + 4 + 4 + 4 + SALT_LENGTH + NONCE_LENGTH;

/// Encrypt serialized store state into a complete file image.
pub fn seal(plaintext: &[u8], password: &str, params: &KdfParams) -> Result<Vec<u8>> {
    let salt = generate_salt();
    let key = derive_key(password, &salt, params, KdfContext::Store)?;

    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| VaultError::Encryption(format!("invalid key length: {}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| VaultError::Encryption(format!("encryption failed: {}", e)))?;

    let mut output = Vec::with_capacity(HEADER_LENGTH + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    output.extend_from_slice(&params.m_cost.to_le_bytes());
    output.extend_from_slice(&params.t_cost.to_le_bytes());
    output.extend_from_slice(&params.p_cost.to_le_bytes());
    output.extend_from_slice(&salt);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);

    Ok(output)
}

/// Decrypt a store file image back to serialized state.
///
/// Any failure that could stem from a wrong password or a modified file is
/// reported as [`VaultError::Auth`]; a wrong password never yields usable
/// plaintext.
pub fn open(data: &[u8], password: &str) -> Result<Vec<u8>> {
    if data.len() < HEADER_LENGTH {
        return Err(VaultError::Auth("store file truncated".to_string()));
    }
    if &data[0..8] != MAGIC {
        return Err(VaultError::Auth(
            "not a certvault store (bad magic)".to_string(),
        ));
    }

    let version = u32::from_le_bytes(data[8..12].try_into().unwrap_or_default());
    if version != FORMAT_VERSION {
        return Err(VaultError::Auth(format!(
            "unsupported store version {}",
            version
        )));
    }

    let params = KdfParams {
        m_cost: u32::from_le_bytes(data[12..16].try_into().unwrap_or_default()),
        t_cost: u32::from_le_bytes(data[16..20].try_into().unwrap_or_default()),
        p_cost: u32::from_le_bytes(data[20..24].try_into().unwrap_or_default()),
    };

    let salt = &data[24..24 + SALT_LENGTH];
    let nonce_bytes = &data[24 + SALT_LENGTH..HEADER_LENGTH];
    let ciphertext = &data[HEADER_LENGTH..];

    let key = derive_key(password, salt, &params, KdfContext::Store)
        .map_err(|e| VaultError::Auth(format!("cannot derive store key: {}", e)))?;

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| VaultError::Encryption(format!("invalid key length: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| VaultError::Auth("wrong password or corrupted store".to_string()))
}

/// Read the key-derivation parameters recorded in a store header.
pub fn kdf_params(data: &[u8]) -> Result<KdfParams> {
    if data.len() < HEADER_LENGTH || &data[0..8] != MAGIC {
        return Err(VaultError::Auth(
            "not a certvault store (bad magic)".to_string(),
        ));
    }

    Ok(KdfParams {
        m_cost: u32::from_le_bytes(data[12..16].try_into().unwrap_or_default()),
        t_cost: u32::from_le_bytes(data[16..20].try_into().unwrap_or_default()),
        p_cost: u32::from_le_bytes(data[20..24].try_into().unwrap_or_default()),
    })
}

/// Whether a file image starts with the store magic.
pub fn is_store(data: &[u8]) -> bool {
    data.len() >= MAGIC.len() && &data[0..MAGIC.len()] == MAGIC
}

/// Write a file image via temp-file-then-atomic-rename.
///
/// The previous store file stays valid until the replacement is fully
/// written and synced; a crash mid-write never leaves a torn store.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| VaultError::Io(e.error))?;

    Ok(())
}
