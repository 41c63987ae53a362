//! Block implementation for the ledger
//!
//! A block bundles transactions together with its position in the chain,
//! the hash of its predecessor, a timestamp and the proof-of-work nonce.

use crate::core::codec::{self, CodecError};
use crate::core::transaction::Transaction;
use crate::crypto::{double_sha256_hex, work_value};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Block Constants
// =============================================================================

/// Previous-hash value of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Genesis timestamp (2017-01-01T00:00:00Z)
pub const GENESIS_TIMESTAMP: i64 = 1_483_228_800;

// =============================================================================
// Block Errors
// =============================================================================

/// Block errors
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Codec error: {0}")]
    CodecError(#[from] CodecError),
    #[error("Timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

/// UTC time for `secs` since the Unix epoch
pub fn timestamp_from_secs(secs: i64) -> Result<DateTime<Utc>, BlockError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(BlockError::InvalidTimestamp(secs))
}

/// Borrowed view of every field except the cached hash, in protocol order
#[derive(Serialize)]
struct HashPreimage<'a> {
    index: u64,
    previous_hash: &'a str,
    timestamp: &'a DateTime<Utc>,
    nonce: u64,
    transactions: &'a [Transaction],
}

/// A block in the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Block index/height
    pub index: u64,
    /// Hash of the previous block
    pub previous_hash: String,
    /// Block creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Nonce used for proof of work
    pub nonce: u64,
    /// Block hash (cached, must match `calculate_hash`)
    pub hash: String,
    /// List of transactions in the block
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a new block (unmined)
    pub fn new(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
    ) -> Result<Self, BlockError> {
        let mut block = Self {
            index,
            previous_hash,
            timestamp: Utc::now(),
            nonce: 0,
            hash: String::new(),
            transactions,
        };
        block.rehash()?;
        Ok(block)
    }

    /// The fixed genesis block
    pub fn genesis() -> Result<Self, BlockError> {
        let timestamp = timestamp_from_secs(GENESIS_TIMESTAMP)?;

        let mut block = Self {
            index: 0,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            timestamp,
            nonce: 0,
            hash: String::new(),
            transactions: vec![],
        };
        block.rehash()?;
        Ok(block)
    }

    /// Calculate the hash over every field except `hash`
    pub fn calculate_hash(&self) -> Result<String, BlockError> {
        let preimage = HashPreimage {
            index: self.index,
            previous_hash: &self.previous_hash,
            timestamp: &self.timestamp,
            nonce: self.nonce,
            transactions: &self.transactions,
        };
        Ok(double_sha256_hex(&codec::encode(&preimage)?))
    }

    /// Refresh the cached hash after mutating the block
    pub fn rehash(&mut self) -> Result<(), BlockError> {
        self.hash = self.calculate_hash()?;
        Ok(())
    }

    /// Verify the cached block hash
    pub fn verify_hash(&self) -> Result<bool, BlockError> {
        Ok(self.hash == self.calculate_hash()?)
    }

    /// Work value of the cached hash; lower means more work
    pub fn work_value(&self) -> u64 {
        work_value(&self.hash)
    }

    /// Whether the cached hash satisfies `target`
    pub fn meets_target(&self, target: u64) -> bool {
        self.work_value() < target
    }

    /// Canonical encoded size of this block in bytes
    pub fn size(&self) -> Result<u64, BlockError> {
        Ok(codec::encoded_size(self)?)
    }

    /// Encode the block to its canonical bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, BlockError> {
        Ok(codec::encode(self)?)
    }

    /// Decode a block from canonical bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlockError> {
        Ok(codec::decode(bytes)?)
    }

    pub fn has_transactions(&self) -> bool {
        !self.transactions.is_empty()
    }

    /// Transactions shaped like rewards (no inputs)
    pub fn reward_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| tx.is_reward())
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn reward_block() -> Block {
        let miner = KeyPair::generate();
        let reward = Transaction::reward(&miner, 50).unwrap();
        Block::new(1, GENESIS_PREVIOUS_HASH.to_string(), vec![reward]).unwrap()
    }

    #[test]
    fn test_genesis_block_is_fixed() {
        let a = Block::genesis().unwrap();
        let b = Block::genesis().unwrap();

        assert_eq!(a.index, 0);
        assert_eq!(a.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(a.timestamp.timestamp(), GENESIS_TIMESTAMP);
        assert!(!a.has_transactions());
        assert_eq!(a.hash, b.hash);
        assert!(a.verify_hash().unwrap());
    }

    #[test]
    fn test_genesis_timestamp() {
        let timestamp = timestamp_from_secs(GENESIS_TIMESTAMP).unwrap();
        assert_eq!(timestamp.to_rfc3339(), "2017-01-01T00:00:00+00:00");
        assert_eq!(Block::genesis().unwrap().timestamp, timestamp);
    }

    #[test]
    fn test_out_of_range_timestamp_is_an_error() {
        assert!(matches!(
            timestamp_from_secs(i64::MAX),
            Err(BlockError::InvalidTimestamp(i64::MAX))
        ));
    }

    #[test]
    fn test_block_hash_verification() {
        let mut block = reward_block();
        assert!(block.verify_hash().unwrap());

        block.nonce += 1;
        assert!(!block.verify_hash().unwrap());

        block.rehash().unwrap();
        assert!(block.verify_hash().unwrap());
    }

    #[test]
    fn test_tampered_transaction_changes_hash() {
        let mut block = reward_block();
        let original = block.hash.clone();

        block.transactions[0].outputs[0].amount = 5_000;
        assert_ne!(block.calculate_hash().unwrap(), original);
        assert!(!block.verify_hash().unwrap());
    }

    #[test]
    fn test_round_trip_preserves_hash() {
        let block = reward_block();
        let bytes = block.to_bytes().unwrap();
        let decoded = Block::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, block);
        assert_eq!(decoded.calculate_hash().unwrap(), block.hash);
        assert_eq!(block.size().unwrap(), bytes.len() as u64);
    }

    #[test]
    fn test_meets_target() {
        let block = reward_block();
        assert!(block.meets_target(u64::MAX) || block.work_value() == u64::MAX);
        assert!(!block.meets_target(0));
    }

    #[test]
    fn test_reward_transactions() {
        let block = reward_block();
        assert_eq!(block.reward_transactions().count(), 1);
        assert_eq!(block.tx_count(), 1);
    }
}
