//! Block validation
//!
//! A candidate block is checked against the chain tip and the full history
//! by ten ordered rules. Cheap structural checks run first, the history
//! scans and signature checks last, and the first failing rule decides the
//! outcome:
//!
//! 1. index follows the tip
//! 2. previous hash is the tip's hash
//! 3. cached hash matches the content
//! 4. work value is below the target
//! 5. at least one transaction
//! 6. encoded size within the cap
//! 7. exactly one valid reward transaction
//! 8. no transaction already in history (or repeated in the block)
//! 9. every transaction verifies and spends outputs that exist
//! 10. no output spent twice, in history or inside the block

use crate::config::ChainConfig;
use crate::core::block::{Block, BlockError};
use crate::core::codec::CodecError;
use crate::core::transaction::{Output, Transaction, TransactionError};
use crate::crypto::KeyError;
use log::debug;
use std::collections::HashSet;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Why a transaction failed the per-transaction rule
#[derive(Error, Debug)]
pub enum InvalidTransactionReason {
    #[error("id, balance or signature check failed")]
    VerificationFailed,
    #[error("input spends unknown output {source_transaction_id}:{output_index}")]
    UnknownOutput {
        source_transaction_id: String,
        output_index: u32,
    },
    #[error(
        "input for {source_transaction_id}:{output_index} claims {claimed_amount} to {claimed_address}, output holds {actual_amount} to {actual_address}"
    )]
    OutputMismatch {
        source_transaction_id: String,
        output_index: u32,
        claimed_amount: u64,
        claimed_address: String,
        actual_amount: u64,
        actual_address: String,
    },
}

/// Block validation failures, one kind per rule
#[derive(Error, Debug)]
pub enum BlockValidationError {
    #[error("Not consecutive blocks: expected index {expected}, got {actual}")]
    IndexMismatch { expected: u64, actual: u64 },
    #[error("Block points to a different parent: previous hash is {actual}, tip hash is {expected}")]
    PreviousHashMismatch { expected: String, actual: String },
    #[error("Block integrity check failed: stored hash {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },
    #[error("Insufficient work: {work} is not below target {target}")]
    InsufficientWork { work: u64, target: u64 },
    #[error("Block has no transactions")]
    EmptyBlock,
    #[error("Block too large: {size} bytes (max: {max})")]
    BlockTooLarge { size: u64, max: u64 },
    #[error(
        "Expected exactly one valid reward transaction of {expected_amount}, found {reward_transactions} without inputs"
    )]
    InvalidReward {
        reward_transactions: usize,
        expected_amount: u64,
    },
    #[error("Duplicate transaction {id}")]
    DuplicateTransaction { id: String },
    #[error("Invalid transaction {id}: {reason}")]
    InvalidTransaction {
        id: String,
        reason: InvalidTransactionReason,
    },
    #[error("Double spend of output {source_transaction_id}:{output_index}")]
    DoubleSpend {
        source_transaction_id: String,
        output_index: u32,
    },
    #[error("Crypto failure: {0}")]
    CryptoFailure(#[from] KeyError),
    #[error("Encoding failure: {0}")]
    Encoding(#[from] CodecError),
    #[error("Malformed block: {0}")]
    Malformed(BlockError),
}

impl From<TransactionError> for BlockValidationError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::CryptoError(e) => Self::CryptoFailure(e),
            TransactionError::CodecError(e) => Self::Encoding(e),
        }
    }
}

impl From<BlockError> for BlockValidationError {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::CodecError(e) => Self::Encoding(e),
            other => Self::Malformed(other),
        }
    }
}

// =============================================================================
// History scans
// =============================================================================

/// First transaction in history with the given id
pub fn find_transaction<'a>(history: &'a [Block], id: &str) -> Option<&'a Transaction> {
    history
        .iter()
        .flat_map(|block| block.transactions.iter())
        .find(|tx| tx.id() == id)
}

/// Output `(tx_id, output_index)` as recorded in history
pub fn find_output<'a>(history: &'a [Block], tx_id: &str, output_index: u32) -> Option<&'a Output> {
    find_transaction(history, tx_id).and_then(|tx| tx.outputs.get(output_index as usize))
}

/// Whether any transaction in history spends `(tx_id, output_index)`
pub fn is_output_spent(history: &[Block], tx_id: &str, output_index: u32) -> bool {
    history
        .iter()
        .flat_map(|block| block.transactions.iter())
        .any(|tx| tx.contains_input(tx_id, output_index))
}

// =============================================================================
// Validator
// =============================================================================

/// Consensus rules for appending a block
#[derive(Debug, Clone)]
pub struct BlockValidator {
    block_reward: u64,
    max_block_size_bytes: u64,
}

impl BlockValidator {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            block_reward: config.block_reward,
            max_block_size_bytes: config.max_block_size_bytes,
        }
    }

    /// Run every rule against `new_block`, stopping at the first failure
    pub fn validate(
        &self,
        new_block: &Block,
        last_block: &Block,
        history: &[Block],
        target: u64,
    ) -> Result<(), BlockValidationError> {
        let result = self.run_rules(new_block, last_block, history, target);
        if let Err(e) = &result {
            debug!("Block {} failed validation: {}", new_block.index, e);
        }
        result
    }

    fn run_rules(
        &self,
        new_block: &Block,
        last_block: &Block,
        history: &[Block],
        target: u64,
    ) -> Result<(), BlockValidationError> {
        // Cheap structural checks
        self.check_index(new_block, last_block)?;
        self.check_link(new_block, last_block)?;
        self.check_hash(new_block)?;
        self.check_work(new_block, target)?;
        self.check_not_empty(new_block)?;
        self.check_size(new_block)?;
        self.check_reward(new_block)?;

        // History scans and signature checks
        self.check_duplicates(&new_block.transactions, history)?;
        for tx in &new_block.transactions {
            self.check_transaction(tx, history)?;
        }
        self.check_double_spends(&new_block.transactions, history)?;

        Ok(())
    }

    fn check_index(&self, new_block: &Block, last_block: &Block) -> Result<(), BlockValidationError> {
        let expected = last_block.index + 1;
        if new_block.index != expected {
            return Err(BlockValidationError::IndexMismatch {
                expected,
                actual: new_block.index,
            });
        }
        Ok(())
    }

    fn check_link(&self, new_block: &Block, last_block: &Block) -> Result<(), BlockValidationError> {
        if new_block.previous_hash != last_block.hash {
            return Err(BlockValidationError::PreviousHashMismatch {
                expected: last_block.hash.clone(),
                actual: new_block.previous_hash.clone(),
            });
        }
        Ok(())
    }

    fn check_hash(&self, new_block: &Block) -> Result<(), BlockValidationError> {
        let computed = new_block.calculate_hash()?;
        if new_block.hash != computed {
            return Err(BlockValidationError::HashMismatch {
                stored: new_block.hash.clone(),
                computed,
            });
        }
        Ok(())
    }

    fn check_work(&self, new_block: &Block, target: u64) -> Result<(), BlockValidationError> {
        let work = new_block.work_value();
        if work >= target {
            return Err(BlockValidationError::InsufficientWork { work, target });
        }
        Ok(())
    }

    fn check_not_empty(&self, new_block: &Block) -> Result<(), BlockValidationError> {
        if !new_block.has_transactions() {
            return Err(BlockValidationError::EmptyBlock);
        }
        Ok(())
    }

    fn check_size(&self, new_block: &Block) -> Result<(), BlockValidationError> {
        let size = new_block.size()?;
        if size > self.max_block_size_bytes {
            return Err(BlockValidationError::BlockTooLarge {
                size,
                max: self.max_block_size_bytes,
            });
        }
        Ok(())
    }

    fn check_reward(&self, new_block: &Block) -> Result<(), BlockValidationError> {
        let rewards: Vec<&Transaction> = new_block.reward_transactions().collect();
        let valid = match rewards.as_slice() {
            [reward] => reward.is_valid_reward(self.block_reward)?,
            _ => false,
        };
        if !valid {
            return Err(BlockValidationError::InvalidReward {
                reward_transactions: rewards.len(),
                expected_amount: self.block_reward,
            });
        }
        Ok(())
    }

    /// No id from `transactions` may appear in history or twice among them
    pub fn check_duplicates(
        &self,
        transactions: &[Transaction],
        history: &[Block],
    ) -> Result<(), BlockValidationError> {
        let mut seen = HashSet::new();
        for tx in transactions {
            if !seen.insert(tx.id()) || find_transaction(history, tx.id()).is_some() {
                return Err(BlockValidationError::DuplicateTransaction {
                    id: tx.id().to_string(),
                });
            }
        }
        Ok(())
    }

    /// `Transaction::verify`, plus every input must match an output recorded in history
    pub fn check_transaction(
        &self,
        tx: &Transaction,
        history: &[Block],
    ) -> Result<(), BlockValidationError> {
        let invalid = |reason| BlockValidationError::InvalidTransaction {
            id: tx.id().to_string(),
            reason,
        };

        if !tx.verify(self.block_reward)? {
            return Err(invalid(InvalidTransactionReason::VerificationFailed));
        }

        for input in &tx.inputs {
            let output = find_output(history, &input.source_transaction_id, input.output_index)
                .ok_or_else(|| {
                    invalid(InvalidTransactionReason::UnknownOutput {
                        source_transaction_id: input.source_transaction_id.clone(),
                        output_index: input.output_index,
                    })
                })?;

            if output.amount != input.amount || output.address != input.address {
                return Err(invalid(InvalidTransactionReason::OutputMismatch {
                    source_transaction_id: input.source_transaction_id.clone(),
                    output_index: input.output_index,
                    claimed_amount: input.amount,
                    claimed_address: input.address.clone(),
                    actual_amount: output.amount,
                    actual_address: output.address.clone(),
                }));
            }
        }

        Ok(())
    }

    /// No output may be spent by history and `transactions`, or twice within `transactions`
    pub fn check_double_spends(
        &self,
        transactions: &[Transaction],
        history: &[Block],
    ) -> Result<(), BlockValidationError> {
        let mut spent_here = HashSet::new();
        for input in transactions.iter().flat_map(|tx| tx.inputs.iter()) {
            let outpoint = (input.source_transaction_id.as_str(), input.output_index);
            if !spent_here.insert(outpoint)
                || is_output_spent(history, outpoint.0, outpoint.1)
            {
                return Err(BlockValidationError::DoubleSpend {
                    source_transaction_id: input.source_transaction_id.clone(),
                    output_index: input.output_index,
                });
            }
        }
        Ok(())
    }
}
