//! Mining engine for the blockchain
//!
//! Builds candidate blocks from the mempool and searches for a nonce whose
//! block hash beats the current target.

use crate::config::ChainConfig;
use crate::core::codec;
use crate::core::{Block, BlockError, Blockchain, BlockchainError, Transaction, TransactionError};
use crate::crypto::KeyPair;
use chrono::Utc;
use log::{debug, info};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How often a long nonce search refreshes the block timestamp
pub const TIMESTAMP_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Mining-related errors
#[derive(Error, Debug)]
pub enum MiningError {
    #[error("Blockchain error: {0}")]
    Blockchain(#[from] BlockchainError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Block error: {0}")]
    Block(#[from] BlockError),
    #[error("Mining task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Mining cancelled")]
    Cancelled,
}

/// Mining statistics
#[derive(Debug, Clone)]
pub struct MiningStats {
    /// Number of hash attempts
    pub hash_attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

/// Miner for creating new blocks
#[derive(Debug, Clone)]
pub struct Miner {
    key_pair: KeyPair,
    block_reward: u64,
}

impl Miner {
    /// Create a new miner paying rewards to `key_pair`'s address
    pub fn new(key_pair: KeyPair, config: &ChainConfig) -> Self {
        Self {
            key_pair,
            block_reward: config.block_reward,
        }
    }

    /// Address that receives this miner's rewards
    pub fn address(&self) -> String {
        self.key_pair.address()
    }

    /// Build an unsolved block on top of the current tip.
    ///
    /// The reward transaction comes first. Queued transactions follow in
    /// arrival order, skipping any that would break a validation rule or push
    /// the block over the size limit.
    pub fn build_candidate(&self, blockchain: &Blockchain) -> Result<Block, MiningError> {
        let last = blockchain.last_block()?;
        let reward = Transaction::reward(&self.key_pair, self.block_reward)?;
        let mut block = Block::new(last.index + 1, last.hash.clone(), vec![reward])?;

        let max_size = blockchain.config().max_block_size_bytes;
        let validator = blockchain.validator();
        let history = blockchain.blocks();
        let mut size = block.size()?;

        for tx in blockchain.queued_transactions() {
            if tx.is_reward() {
                debug!("Skipping queued reward-shaped transaction {}", tx.id());
                continue;
            }

            let tx_size = codec::encoded_size(tx).map_err(BlockError::from)?;
            if size.saturating_add(tx_size) > max_size {
                debug!("Skipping transaction {}: block would exceed {} bytes", tx.id(), max_size);
                continue;
            }

            block.transactions.push(tx.clone());
            let accepted = validator
                .check_duplicates(&block.transactions, history)
                .and_then(|_| validator.check_transaction(tx, history))
                .and_then(|_| validator.check_double_spends(&block.transactions, history));

            match accepted {
                Ok(()) => size += tx_size,
                Err(e) => {
                    debug!("Skipping transaction {}: {}", tx.id(), e);
                    block.transactions.pop();
                }
            }
        }

        block.rehash()?;
        Ok(block)
    }

    /// Search nonces until the block hash beats `target`.
    ///
    /// The timestamp is refreshed every `TIMESTAMP_REFRESH_INTERVAL`, and also
    /// when the nonce space wraps. `cancel` is polled before every attempt.
    pub fn solve(
        &self,
        mut block: Block,
        target: u64,
        cancel: &CancellationToken,
    ) -> Result<(Block, MiningStats), MiningError> {
        let start = Instant::now();
        let mut last_refresh = start;
        let mut attempts: u64 = 0;

        info!("Mining block {} against target {:#018x}...", block.index, target);

        while !block.meets_target(target) {
            if cancel.is_cancelled() {
                info!(
                    "Mining block {} cancelled after {} attempts",
                    block.index, attempts
                );
                return Err(MiningError::Cancelled);
            }

            if last_refresh.elapsed() >= TIMESTAMP_REFRESH_INTERVAL {
                block.timestamp = Utc::now();
                last_refresh = Instant::now();
            }

            match block.nonce.checked_add(1) {
                Some(nonce) => block.nonce = nonce,
                None => {
                    block.nonce = 0;
                    block.timestamp = Utc::now();
                    last_refresh = Instant::now();
                }
            }

            block.rehash()?;
            attempts = attempts.saturating_add(1);
        }

        let elapsed = start.elapsed().as_millis();
        let hash_rate = if elapsed > 0 {
            (attempts as f64) / (elapsed as f64 / 1000.0)
        } else {
            attempts as f64
        };

        let stats = MiningStats {
            hash_attempts: attempts,
            time_ms: elapsed,
            hash_rate,
        };

        info!(
            "Block {} mined in {}ms ({} attempts, {:.2} H/s)",
            block.index, elapsed, attempts, hash_rate
        );

        Ok((block, stats))
    }

    /// Build, solve and append one block, holding the chain exclusively throughout
    pub fn mine_block(&self, blockchain: &mut Blockchain) -> Result<(Block, MiningStats), MiningError> {
        let candidate = self.build_candidate(blockchain)?;
        let target = blockchain.difficulty();
        let (block, stats) = self.solve(candidate, target, &CancellationToken::new())?;

        blockchain.add_block(block.clone())?;

        Ok((block, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TransactionBuilder;
    use std::thread;

    const EASY: u64 = u64::MAX >> 4;

    fn setup() -> (Blockchain, Miner, KeyPair) {
        let chain = Blockchain::new(ChainConfig::with_fixed_target(EASY)).unwrap();
        let key_pair = KeyPair::generate();
        let miner = Miner::new(key_pair.clone(), chain.config());
        (chain, miner, key_pair)
    }

    #[test]
    fn test_mine_block() {
        let (mut chain, miner, key_pair) = setup();

        let (block, stats) = miner.mine_block(&mut chain).unwrap();

        assert_eq!(block.index, 1);
        assert!(block.meets_target(EASY));
        assert!(block.verify_hash().unwrap());
        assert_eq!(block.tx_count(), 1);
        assert!(block.transactions[0].is_valid_reward(50).unwrap());
        assert!(block.transactions[0].outputs[0].is_owned_by(&key_pair.address()));
        assert!(stats.hash_rate >= 0.0);
    }

    #[test]
    fn test_candidate_links_to_tip() {
        let (mut chain, miner, _) = setup();
        miner.mine_block(&mut chain).unwrap();

        let candidate = miner.build_candidate(&chain).unwrap();
        let tip = chain.last_block().unwrap();
        assert_eq!(candidate.index, tip.index + 1);
        assert_eq!(candidate.previous_hash, tip.hash);
        assert_eq!(candidate.reward_transactions().count(), 1);
    }

    #[test]
    fn test_solve_returns_immediately_when_target_met() {
        let (chain, miner, _) = setup();
        let candidate = miner.build_candidate(&chain).unwrap();
        let original = candidate.clone();

        let (block, stats) = miner
            .solve(candidate, u64::MAX, &CancellationToken::new())
            .unwrap();
        assert_eq!(stats.hash_attempts, 0);
        assert_eq!(block, original);
    }

    #[test]
    fn test_solve_respects_cancellation() {
        let (chain, miner, _) = setup();
        let candidate = miner.build_candidate(&chain).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            miner.solve(candidate, 0, &cancel),
            Err(MiningError::Cancelled)
        ));
    }

    #[test]
    fn test_solve_cancelled_from_another_thread() {
        let (chain, miner, _) = setup();
        let candidate = miner.build_candidate(&chain).unwrap();

        let cancel = CancellationToken::new();
        let remote = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        // Target 0 can never be met
        let result = miner.solve(candidate, 0, &cancel);
        canceller.join().unwrap();
        assert!(matches!(result, Err(MiningError::Cancelled)));
    }

    #[test]
    fn test_candidate_includes_valid_queued_transactions() {
        let (mut chain, miner, key_pair) = setup();
        miner.mine_block(&mut chain).unwrap();

        let funding = chain.utxos_for_address(&key_pair.address()).remove(0);
        let payment = TransactionBuilder::new()
            .add_input(&funding)
            .add_output("bob", 50)
            .build_and_sign(&key_pair)
            .unwrap();
        let conflicting = TransactionBuilder::new()
            .add_input(&funding)
            .add_output("carol", 50)
            .build_and_sign(&key_pair)
            .unwrap();
        let stray_reward = Transaction::reward(&KeyPair::generate(), 50).unwrap();

        chain.queue_transaction(payment.clone());
        chain.queue_transaction(payment.clone());
        chain.queue_transaction(conflicting);
        chain.queue_transaction(stray_reward);

        let candidate = miner.build_candidate(&chain).unwrap();
        let ids: Vec<&str> = candidate.transactions.iter().map(|tx| tx.id()).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], payment.id());
        assert!(candidate.verify_hash().unwrap());

        miner.mine_block(&mut chain).unwrap();
        assert_eq!(chain.balance("bob"), 50);
        // The conflicting spend and stray reward stay queued
        assert_eq!(chain.queued_transactions().len(), 2);
    }

    #[test]
    fn test_candidate_respects_size_limit() {
        let (mut chain, miner, key_pair) = setup();
        let (block1, _) = miner.mine_block(&mut chain).unwrap();

        // Room for a reward-only block plus timestamp slack, not for a payment
        let tight = ChainConfig {
            max_block_size_bytes: block1.size().unwrap() + 100,
            ..chain.config().clone()
        };
        let mut tight_chain = Blockchain::new(tight.clone()).unwrap();
        tight_chain.add_block(block1).unwrap();

        let funding = tight_chain.utxos_for_address(&key_pair.address()).remove(0);
        let payment = TransactionBuilder::new()
            .add_input(&funding)
            .add_output("bob", 50)
            .build_and_sign(&key_pair)
            .unwrap();
        assert!(codec::encoded_size(&payment).unwrap() > 100);
        tight_chain.queue_transaction(payment);

        let tight_miner = Miner::new(key_pair, &tight);
        let candidate = tight_miner.build_candidate(&tight_chain).unwrap();
        assert_eq!(candidate.tx_count(), 1);
        assert!(candidate.size().unwrap() <= tight.max_block_size_bytes);
    }
}
