//! Cryptographic primitives for the credential store.
//!
//! This module provides:
//!
//! - Ed25519 key generation and management
//! - Argon2id key derivation with separated store/per-key contexts
//! - AES-256-GCM wrapping of private keys under their own passphrases
//!
//! The store-wide envelope built on the same primitives lives in
//! [`crate::store::envelope`].

pub mod encryption;
pub mod keys;
pub mod password;
