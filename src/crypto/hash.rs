//! Cryptographic hashing utilities for the ledger
//!
//! Provides SHA-256 based hashing used for block hashes, transaction IDs
//! and signature preimages, plus the work value used by proof of work.

use sha2::{Digest, Sha256};

/// Number of leading digest bytes interpreted as the work value
const WORK_VALUE_BYTES: usize = 8;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
/// Used for block hashes in Bitcoin-style blockchains
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Computes double SHA-256 hash and returns it as a hex string
pub fn double_sha256_hex(data: &[u8]) -> String {
    hex::encode(double_sha256(data))
}

/// Numeric interpretation of a hex-encoded hash for proof of work.
///
/// The first eight bytes of the digest are read as a big-endian `u64`.
/// Lower values mean more search effort. A hash that cannot be decoded
/// maps to `u64::MAX`, which never satisfies a target.
pub fn work_value(hash_hex: &str) -> u64 {
    let bytes = match hex::decode(hash_hex) {
        Ok(bytes) if bytes.len() >= WORK_VALUE_BYTES => bytes,
        _ => return u64::MAX,
    };

    let mut prefix = [0u8; WORK_VALUE_BYTES];
    prefix.copy_from_slice(&bytes[..WORK_VALUE_BYTES]);
    u64::from_be_bytes(prefix)
}
