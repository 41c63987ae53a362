//! Transaction handling for the ledger
//!
//! Implements a UTXO-based transaction model with digital signatures.
//! An input names the output it spends by `(source_transaction_id,
//! output_index)` and caches that output's amount and address, so that a
//! transaction can be checked on its own without a UTXO index.

use crate::core::codec::{self, CodecError};
use crate::crypto::{sha256_hex, verify_signature, KeyError, KeyPair};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
    #[error("Codec error: {0}")]
    CodecError(#[from] CodecError),
}

// =============================================================================
// Transaction Output
// =============================================================================

/// Transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Output {
    /// Amount of coins
    pub amount: u64,
    /// Recipient's address
    pub address: String,
}

impl Output {
    pub fn new(address: &str, amount: u64) -> Self {
        Self {
            amount,
            address: address.to_string(),
        }
    }

    /// Check if this output belongs to the given address
    pub fn is_owned_by(&self, address: &str) -> bool {
        self.address == address
    }
}

// =============================================================================
// Transaction Input
// =============================================================================

/// Transaction input (reference to a previous output)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Input {
    /// ID of the transaction that produced the spent output
    pub source_transaction_id: String,
    /// Index of the output in that transaction
    pub output_index: u32,
    /// Amount of the spent output
    pub amount: u64,
    /// Address of the spent output
    pub address: String,
    /// Signature by `address` over the fields above
    pub signature: String,
}

impl Input {
    /// Create an input spending `(source_transaction_id, output_index)` and sign it
    /// with the key that owns the output.
    pub fn signed(
        source_transaction_id: &str,
        output_index: u32,
        amount: u64,
        key_pair: &KeyPair,
    ) -> Result<Self, TransactionError> {
        let mut input = Self {
            source_transaction_id: source_transaction_id.to_string(),
            output_index,
            amount,
            address: key_pair.address(),
            signature: String::new(),
        };
        input.signature = key_pair.sign(&input.signing_data()?)?;
        Ok(input)
    }

    /// Canonical bytes covered by the input signature
    pub fn signing_data(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(&(
            &self.source_transaction_id,
            self.output_index,
            self.amount,
            &self.address,
        ))
    }

    /// Check the signature against the cached address
    pub fn verify(&self) -> Result<bool, TransactionError> {
        if self.signature.is_empty() {
            return Ok(false);
        }
        Ok(verify_signature(
            &self.signature,
            &self.signing_data()?,
            &self.address,
        )?)
    }

    /// Whether this input spends the given output
    pub fn spends(&self, source_transaction_id: &str, output_index: u32) -> bool {
        self.source_transaction_id == source_transaction_id && self.output_index == output_index
    }
}

// =============================================================================
// UTXO
// =============================================================================

/// Unspent Transaction Output (UTXO)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Utxo {
    pub tx_id: String,
    pub output_index: u32,
    pub output: Output,
}

// =============================================================================
// Transaction
// =============================================================================

/// A ledger transaction.
///
/// The `id` is derived from the inputs, outputs and timestamp and cannot be
/// set directly. A transaction without inputs is a reward transaction, the
/// only way new coins enter the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    id: String,
    /// Transaction inputs
    pub inputs: Vec<Input>,
    /// Transaction outputs
    pub outputs: Vec<Output>,
    /// Timestamp of transaction creation
    pub timestamp: DateTime<Utc>,
    /// Signature of the assembling party over the id
    pub signature: String,
}

impl Transaction {
    /// Create a new transaction (unsigned)
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>) -> Result<Self, TransactionError> {
        let mut tx = Self {
            id: String::new(),
            inputs,
            outputs,
            timestamp: Utc::now(),
            signature: String::new(),
        };
        tx.id = tx.calculate_id()?;
        Ok(tx)
    }

    /// Create a signed reward transaction paying `amount` to the key's address
    pub fn reward(key_pair: &KeyPair, amount: u64) -> Result<Self, TransactionError> {
        let mut tx = Self::new(vec![], vec![Output::new(&key_pair.address(), amount)])?;
        tx.sign(key_pair)?;
        Ok(tx)
    }

    /// Transaction ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Recompute the ID from the current content
    pub fn calculate_id(&self) -> Result<String, CodecError> {
        let data = codec::encode(&(&self.inputs, &self.outputs, &self.timestamp))?;
        Ok(sha256_hex(&data))
    }

    /// Sign the whole transaction
    pub fn sign(&mut self, key_pair: &KeyPair) -> Result<(), TransactionError> {
        self.signature = key_pair.sign(self.id.as_bytes())?;
        Ok(())
    }

    /// Check the transaction signature against `address`
    pub fn verify_signature_against(&self, address: &str) -> Result<bool, TransactionError> {
        if self.signature.is_empty() {
            return Ok(false);
        }
        Ok(verify_signature(
            &self.signature,
            self.id.as_bytes(),
            address,
        )?)
    }

    /// Whether this transaction has the shape of a reward (no inputs)
    pub fn is_reward(&self) -> bool {
        self.inputs.is_empty()
    }

    /// A valid reward mints exactly `amount` in a single output and is signed
    /// by that output's owner.
    pub fn is_valid_reward(&self, amount: u64) -> Result<bool, TransactionError> {
        if !self.is_reward() {
            return Ok(false);
        }
        match self.outputs.as_slice() {
            [output] if output.amount == amount => self.verify_signature_against(&output.address),
            _ => Ok(false),
        }
    }

    /// Sum of input amounts, `None` on overflow
    pub fn total_input(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |acc, input| acc.checked_add(input.amount))
    }

    /// Sum of output amounts, `None` on overflow
    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }

    /// Verify the transaction: the ID matches the content, outputs balance
    /// inputs (a reward instead mints exactly `block_reward`), every input
    /// signature is valid, and the transaction signature belongs to the owner
    /// of every spent output. The last check binds the inputs to these outputs.
    pub fn verify(&self, block_reward: u64) -> Result<bool, TransactionError> {
        if self.id != self.calculate_id()? {
            return Ok(false);
        }

        if self.is_reward() {
            return Ok(self.outputs.len() == 1 && self.outputs[0].amount == block_reward);
        }

        match (self.total_input(), self.total_output()) {
            (Some(input), Some(output)) if input == output => {}
            _ => return Ok(false),
        }

        for input in &self.inputs {
            if !input.verify()? {
                return Ok(false);
            }
        }

        let owners: HashSet<&str> = self.inputs.iter().map(|input| input.address.as_str()).collect();
        for owner in owners {
            if !self.verify_signature_against(owner)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Whether any input spends `(source_transaction_id, output_index)`
    pub fn contains_input(&self, source_transaction_id: &str, output_index: u32) -> bool {
        self.inputs
            .iter()
            .any(|input| input.spends(source_transaction_id, output_index))
    }
}

// =============================================================================
// Transaction Builder
// =============================================================================

/// Builder for spending transactions
#[derive(Default)]
pub struct TransactionBuilder {
    inputs: Vec<Utxo>,
    outputs: Vec<Output>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend a UTXO
    pub fn add_input(mut self, utxo: &Utxo) -> Self {
        self.inputs.push(utxo.clone());
        self
    }

    /// Add an output
    pub fn add_output(mut self, address: &str, amount: u64) -> Self {
        self.outputs.push(Output::new(address, amount));
        self
    }

    /// Sign every input and the transaction with `key_pair`, which must own
    /// all spent outputs.
    pub fn build_and_sign(self, key_pair: &KeyPair) -> Result<Transaction, TransactionError> {
        let address = key_pair.address();
        let mut inputs = Vec::with_capacity(self.inputs.len());

        for utxo in &self.inputs {
            if !utxo.output.is_owned_by(&address) {
                return Err(KeyError::AddressMismatch(utxo.output.address.clone()).into());
            }
            inputs.push(Input::signed(
                &utxo.tx_id,
                utxo.output_index,
                utxo.output.amount,
                key_pair,
            )?);
        }

        let mut tx = Transaction::new(inputs, self.outputs)?;
        tx.sign(key_pair)?;
        Ok(tx)
    }
}

// =============================================================================
// Tests
// =============================================================================
