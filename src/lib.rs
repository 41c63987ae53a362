//! pow-ledger: an append-only proof-of-work ledger in Rust
//!
//! This crate provides:
//! - UTXO transactions with secp256k1 recoverable signatures
//! - Blocks hashed over a canonical bincode encoding
//! - Pluggable difficulty policies (fixed target, periodic retarget)
//! - A fail-fast block validator
//! - A ledger with a mempool and tip notifications
//! - A cancellable miner and an async mining worker
//!
//! # Example
//!
//! ```rust
//! use pow_ledger::config::ChainConfig;
//! use pow_ledger::core::Blockchain;
//! use pow_ledger::crypto::KeyPair;
//! use pow_ledger::mining::Miner;
//!
//! // Create a ledger with an easy constant target
//! let config = ChainConfig::with_fixed_target(u64::MAX >> 4);
//! let mut blockchain = Blockchain::new(config.clone()).unwrap();
//!
//! // Mine a block
//! let miner = Miner::new(KeyPair::generate(), &config);
//! let (block, stats) = miner.mine_block(&mut blockchain).unwrap();
//! println!("Mined block {} in {}ms", block.index, stats.time_ms);
//!
//! // Check balance
//! assert_eq!(blockchain.balance(&miner.address()), config.block_reward);
//! ```

pub mod config;
pub mod core;
pub mod crypto;
pub mod mining;

// Re-export commonly used types
pub use config::{ChainConfig, DifficultyConfig};
pub use core::{
    Block, BlockValidationError, BlockValidator, Blockchain, BlockchainError, DifficultyPolicy,
    Transaction, TransactionBuilder,
};
pub use crypto::KeyPair;
pub use mining::{Mempool, Miner, MiningWorker};
