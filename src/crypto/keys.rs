//! Ed25519 keypair handling.
//!
//! Every certificate in the store is backed by an Ed25519 keypair. Only the
//! 32-byte seed is persisted; the public half is re-derived on load.

use crate::error::{Result, VaultError};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

/// The length of an Ed25519 seed.
pub const SEED_LENGTH: usize = 32;

/// An Ed25519 keypair consisting of a signing key and its public key.
#[derive(Debug, Clone)]
pub struct Keypair {
    pub secret: SigningKey,
    pub public: VerifyingKey,
}

impl Keypair {
    /// Generate a new keypair from the system RNG.
    pub fn generate() -> Self {
        let secret = SigningKey::generate(&mut OsRng);
        let public = secret.verifying_key();
        Self { secret, public }
    }

    /// Rebuild a keypair from a stored 32-byte seed.
    pub fn from_seed(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SEED_LENGTH {
            return Err(VaultError::InvalidKey(format!(
                "expected {} bytes for Ed25519 seed, got {}",
                SEED_LENGTH,
                bytes.len()
            )));
        }

        let mut seed = [0u8; SEED_LENGTH];
        seed.copy_from_slice(bytes);

        let secret = SigningKey::from_bytes(&seed);
        let public = secret.verifying_key();
        Ok(Self { secret, public })
    }

    /// Get the seed as bytes.
    pub fn seed_bytes(&self) -> [u8; SEED_LENGTH] {
        self.secret.to_bytes()
    }

    /// Get the public key as bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.secret.sign(message)
    }

    /// Encode the private key as a PKCS#8 PEM block.
    pub fn to_pkcs8_pem(&self) -> String {
        // Fixed PKCS#8 prefix for an Ed25519 private key (RFC 8410).
        let mut pkcs8_der = vec![
            0x30, 0x2e, // SEQUENCE (46 bytes)
            0x02, 0x01, 0x00, // INTEGER 0 (version)
            0x30, 0x05, // SEQUENCE (algorithm identifier)
            0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
            0x04, 0x22, // OCTET STRING (34 bytes)
            0x04, 0x20, // OCTET STRING (32 bytes) - the seed itself
        ];
        pkcs8_der.extend_from_slice(&self.seed_bytes());

        pem::encode(&pem::Pem::new("PRIVATE KEY", pkcs8_der))
    }
}
