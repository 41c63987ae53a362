//! Blockchain implementation
//!
//! The ledger owns the ordered block sequence and the pool of unconfirmed
//! transactions. Blocks only enter through `add_block`, which runs the
//! validator against the current tip; accepted history is never mutated.
//!
//! Share a ledger as `Arc<tokio::sync::RwLock<Blockchain>>`: `add_block`
//! needs `&mut self`, so reading the tip, validating and appending all
//! happen under a single write guard.

use crate::config::{ChainConfig, ConfigError};
use crate::core::block::{Block, BlockError};
use crate::core::difficulty::DifficultyPolicy;
use crate::core::transaction::{Output, Transaction, Utxo};
use crate::core::validator::{self, BlockValidationError, BlockValidator};
use crate::mining::Mempool;
use log::{info, warn};
use thiserror::Error;
use tokio::sync::watch;

/// Blockchain-related errors
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("Invalid block: {0}")]
    InvalidBlock(#[from] BlockValidationError),
    #[error("Block error: {0}")]
    BlockError(#[from] BlockError),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Chain is empty")]
    EmptyChain,
}

/// Which end of the chain `take_blocks` reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    First,
    Last,
}

/// Index and hash of the current chain tip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTip {
    pub index: u64,
    pub hash: String,
}

/// The main blockchain structure
pub struct Blockchain {
    blocks: Vec<Block>,
    mempool: Mempool,
    config: ChainConfig,
    validator: BlockValidator,
    policy: Box<dyn DifficultyPolicy>,
    tip: watch::Sender<ChainTip>,
}

impl Blockchain {
    /// Create a new blockchain with the genesis block, using the configured difficulty policy
    pub fn new(config: ChainConfig) -> Result<Self, BlockchainError> {
        let policy = config.difficulty.build();
        Self::with_policy(config, policy)
    }

    /// Create a blockchain with a custom difficulty policy; `config.difficulty` is ignored
    pub fn with_policy(
        config: ChainConfig,
        policy: Box<dyn DifficultyPolicy>,
    ) -> Result<Self, BlockchainError> {
        config.validate()?;

        let genesis = Block::genesis()?;
        let (tip, _) = watch::channel(ChainTip {
            index: genesis.index,
            hash: genesis.hash.clone(),
        });

        Ok(Self {
            blocks: vec![genesis],
            mempool: Mempool::new(),
            validator: BlockValidator::new(&config),
            config,
            policy,
            tip,
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn validator(&self) -> &BlockValidator {
        &self.validator
    }

    // =========================================================================
    // Block queries
    // =========================================================================

    /// All blocks, genesis first
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The first or last `n` blocks (fewer if the chain is shorter)
    pub fn take_blocks(&self, n: usize, order: Order) -> &[Block] {
        let n = n.min(self.blocks.len());
        match order {
            Order::First => &self.blocks[..n],
            Order::Last => &self.blocks[self.blocks.len() - n..],
        }
    }

    /// Get a block by index
    pub fn get_block(&self, index: u64) -> Option<&Block> {
        self.blocks.iter().find(|b| b.index == index)
    }

    /// Get a block by hash
    pub fn get_block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    /// The chain tip
    pub fn last_block(&self) -> Result<&Block, BlockchainError> {
        self.blocks.last().ok_or(BlockchainError::EmptyChain)
    }

    /// Get blockchain height
    pub fn height(&self) -> u64 {
        self.blocks.len().saturating_sub(1) as u64
    }

    /// Target work value the next block must beat
    pub fn difficulty(&self) -> u64 {
        self.policy.calculate_target(&self.blocks)
    }

    /// Watch the chain tip; the value changes whenever a block is appended
    pub fn subscribe_tip(&self) -> watch::Receiver<ChainTip> {
        self.tip.subscribe()
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Queue a transaction for mining. No validation or deduplication happens here.
    pub fn queue_transaction(&mut self, tx: Transaction) {
        self.mempool.add(tx);
    }

    pub fn queued_transactions(&self) -> &[Transaction] {
        self.mempool.transactions()
    }

    pub fn get_queued_transaction(&self, id: &str) -> Option<&Transaction> {
        self.mempool.get(id)
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// First transaction in the chain with the given id
    pub fn get_transaction_from_chain(&self, id: &str) -> Option<&Transaction> {
        validator::find_transaction(&self.blocks, id)
    }

    /// Every transaction in block order, then in-block order
    pub fn transactions(&self) -> Vec<&Transaction> {
        self.blocks
            .iter()
            .flat_map(|block| block.transactions.iter())
            .collect()
    }

    /// Output `(tx_id, output_index)` if it exists in the chain
    pub fn find_output(&self, tx_id: &str, output_index: u32) -> Option<&Output> {
        validator::find_output(&self.blocks, tx_id, output_index)
    }

    /// Whether a transaction in the chain spends `(tx_id, output_index)`
    pub fn is_output_spent(&self, tx_id: &str, output_index: u32) -> bool {
        validator::is_output_spent(&self.blocks, tx_id, output_index)
    }

    /// Get UTXOs for a specific address
    pub fn utxos_for_address(&self, address: &str) -> Vec<Utxo> {
        let mut utxos = Vec::new();

        for tx in self.transactions() {
            for (index, output) in tx.outputs.iter().enumerate() {
                let index = index as u32;
                if output.is_owned_by(address) && !self.is_output_spent(tx.id(), index) {
                    utxos.push(Utxo {
                        tx_id: tx.id().to_string(),
                        output_index: index,
                        output: output.clone(),
                    });
                }
            }
        }

        utxos
    }

    /// Get balance for an address
    pub fn balance(&self, address: &str) -> u64 {
        self.utxos_for_address(address)
            .iter()
            .fold(0u64, |acc, utxo| acc.saturating_add(utxo.output.amount))
    }

    // =========================================================================
    // Appending
    // =========================================================================

    /// Validate `block` against the tip and append it.
    ///
    /// On failure the chain and mempool are left untouched and the specific
    /// rule violation is returned. On success, queued transactions included
    /// in the block leave the mempool.
    pub fn add_block(&mut self, block: Block) -> Result<(), BlockchainError> {
        let target = self.difficulty();
        let last = self.last_block()?;

        if let Err(e) = self.validator.validate(&block, last, &self.blocks, target) {
            warn!("Rejected block {}: {}", block.index, e);
            return Err(e.into());
        }

        let confirmed = self.mempool.remove_confirmed(&block);
        info!(
            "Accepted block {} ({}) with {} transactions, {} removed from mempool",
            block.index,
            block.hash,
            block.tx_count(),
            confirmed
        );

        self.tip.send_replace(ChainTip {
            index: block.index,
            hash: block.hash.clone(),
        });
        self.blocks.push(block);

        Ok(())
    }

    /// Re-run validation over the whole chain, each block against its prefix
    pub fn validate_chain(&self) -> Result<(), BlockchainError> {
        for i in 1..self.blocks.len() {
            let history = &self.blocks[..i];
            let target = self.policy.calculate_target(history);
            self.validator
                .validate(&self.blocks[i], &history[i - 1], history, target)?;
        }
        Ok(())
    }
}
