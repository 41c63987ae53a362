//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (UTXO model with signed inputs)
//! - Blocks (proof of work over a canonical encoding)
//! - Difficulty policies
//! - Block validation rules
//! - Blockchain (append-only ledger with mempool)

pub mod block;
pub mod blockchain;
pub mod codec;
pub mod difficulty;
pub mod transaction;
pub mod validator;

pub use block::{timestamp_from_secs, Block, BlockError, GENESIS_PREVIOUS_HASH, GENESIS_TIMESTAMP};
pub use blockchain::{Blockchain, BlockchainError, ChainTip, Order};
pub use codec::CodecError;
pub use difficulty::{DifficultyPolicy, FixedTarget, RetargetPolicy};
pub use transaction::{Input, Output, Transaction, TransactionBuilder, TransactionError, Utxo};
pub use validator::{BlockValidationError, BlockValidator, InvalidTransactionReason};
