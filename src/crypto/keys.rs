//! ECDSA key management for the ledger
//!
//! Provides key pair generation, address derivation, signing and
//! verification using the secp256k1 elliptic curve (same as Bitcoin).
//! Signatures are recoverable so that they can be checked against an
//! address alone, without carrying the public key around.

use rand::rngs::OsRng;
use ripemd::Ripemd160;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::hash::sha256;

/// Serialized signature length: one recovery id byte plus 64 compact bytes
pub const SIGNATURE_LENGTH: usize = 65;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Key does not own address {0}")]
    AddressMismatch(String),
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Blockchain address of this key pair
    pub fn address(&self) -> String {
        public_key_to_address(&self.public_key)
    }

    /// Sign arbitrary bytes, returning a hex-encoded recoverable signature
    pub fn sign(&self, data: &[u8]) -> Result<String, KeyError> {
        sign_message(&self.secret_key, data)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Convert a public key to a blockchain address
/// Uses Bitcoin-style address generation: Base58Check(RIPEMD160(SHA256(pubkey)))
pub fn public_key_to_address(public_key: &PublicKey) -> String {
    let sha256_hash = sha256(&public_key.serialize());

    let mut ripemd = Ripemd160::new();
    ripemd.update(&sha256_hash);
    let ripemd_hash = ripemd.finalize();

    // Version byte 0x00
    let mut address_bytes = vec![0x00];
    address_bytes.extend_from_slice(&ripemd_hash);

    // First 4 bytes of double SHA256
    let checksum = {
        let first_hash = Sha256::digest(&address_bytes);
        Sha256::digest(first_hash)
    };
    address_bytes.extend_from_slice(&checksum[..4]);

    bs58::encode(address_bytes).into_string()
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Sign `data` with a secret key.
///
/// The message is SHA-256(data). The result is hex of
/// `recovery_id || compact_signature`.
pub fn sign_message(secret_key: &SecretKey, data: &[u8]) -> Result<String, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(&sha256(data))?;
    let signature = secp.sign_ecdsa_recoverable(&message, secret_key);

    let (recovery_id, compact) = signature.serialize_compact();
    let mut bytes = Vec::with_capacity(SIGNATURE_LENGTH);
    bytes.push(recovery_id.to_i32() as u8);
    bytes.extend_from_slice(&compact);
    Ok(hex::encode(bytes))
}

/// Verify that `signature_hex` over `data` was produced by the key behind `address`.
///
/// Returns `Err` when the signature cannot be parsed at all, `Ok(false)` when it
/// is well formed but belongs to a different key.
pub fn verify_signature(signature_hex: &str, data: &[u8], address: &str) -> Result<bool, KeyError> {
    let bytes = hex::decode(signature_hex)
        .map_err(|e| KeyError::MalformedSignature(format!("not hex: {}", e)))?;
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(KeyError::MalformedSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LENGTH,
            bytes.len()
        )));
    }

    let recovery_id = RecoveryId::from_i32(i32::from(bytes[0]))?;
    let signature = RecoverableSignature::from_compact(&bytes[1..], recovery_id)?;

    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(&sha256(data))?;

    match secp.recover_ecdsa(&message, &signature) {
        Ok(public_key) => Ok(public_key_to_address(&public_key) == address),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert!(!kp.private_key_hex().is_empty());
        assert!(!kp.public_key_hex().is_empty());
        assert!(!kp.address().is_empty());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let message = b"Hello, blockchain!";

        let signature = kp.sign(message).unwrap();
        assert_eq!(signature.len(), SIGNATURE_LENGTH * 2);
        assert!(verify_signature(&signature, message, &kp.address()).unwrap());
        assert!(!verify_signature(&signature, b"Hello, tampered!", &kp.address()).unwrap());
    }

    #[test]
    fn test_signature_from_other_key_is_rejected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let signature = alice.sign(b"payload").unwrap();
        assert!(!verify_signature(&signature, b"payload", &bob.address()).unwrap());
    }

    #[test]
    fn test_malformed_signature_is_an_error() {
        let kp = KeyPair::generate();
        assert!(matches!(
            verify_signature("zz", b"payload", &kp.address()),
            Err(KeyError::MalformedSignature(_))
        ));
        assert!(matches!(
            verify_signature("abcd", b"payload", &kp.address()),
            Err(KeyError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_key_pair_from_hex() {
        let kp1 = KeyPair::generate();
        let private_hex = kp1.private_key_hex();

        let kp2 = KeyPair::from_private_key_hex(&private_hex).unwrap();
        assert_eq!(kp1.public_key_hex(), kp2.public_key_hex());
        assert_eq!(kp1.address(), kp2.address());
        assert_eq!(
            public_key_to_address(&public_key_from_hex(&kp1.public_key_hex()).unwrap()),
            kp1.address()
        );
    }

    #[test]
    fn test_address_format() {
        let kp = KeyPair::generate();
        // Version byte 0x00 encodes to a leading '1'
        assert!(kp.address().starts_with('1'));
    }
}
