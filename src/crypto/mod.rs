//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing and the proof-of-work value of a hash
//! - ECDSA key management (secp256k1) with address-based verification

pub mod hash;
pub mod keys;

pub use hash::{double_sha256, double_sha256_hex, sha256, sha256_hex, work_value};
pub use keys::{
    public_key_from_hex, public_key_to_address, sign_message, verify_signature, KeyError, KeyPair,
    SIGNATURE_LENGTH,
};
