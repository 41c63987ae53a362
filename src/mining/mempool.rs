//! Transaction pool (mempool) for pending transactions
//!
//! Holds transactions that have been submitted but are not yet part of an
//! accepted block, in arrival order. The pool does not deduplicate and does
//! not validate; the miner filters when it builds a candidate and the
//! ledger prunes entries once a block including them is accepted.

use crate::core::{Block, Transaction};
use std::collections::HashSet;

/// Insertion-ordered pool of unconfirmed transactions
#[derive(Debug, Default, Clone)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    /// Create a new mempool
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction
    pub fn add(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// All queued transactions in arrival order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// First queued transaction with the given id
    pub fn get(&self, id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.id() == id)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Drop every entry whose id appears in `block`; returns how many were removed
    pub fn remove_confirmed(&mut self, block: &Block) -> usize {
        let confirmed: HashSet<&str> = block.transactions.iter().map(|tx| tx.id()).collect();
        let before = self.transactions.len();
        self.transactions.retain(|tx| !confirmed.contains(tx.id()));
        before - self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn tx() -> Transaction {
        Transaction::reward(&KeyPair::generate(), 50).unwrap()
    }

    #[test]
    fn test_insertion_order_and_lookup() {
        let mut pool = Mempool::new();
        let (a, b) = (tx(), tx());
        pool.add(a.clone());
        pool.add(b.clone());

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.transactions()[0].id(), a.id());
        assert_eq!(pool.get(b.id()), Some(&b));
        assert!(pool.get("missing").is_none());
    }

    #[test]
    fn test_no_deduplication() {
        let mut pool = Mempool::new();
        let a = tx();
        pool.add(a.clone());
        pool.add(a);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_remove_confirmed() {
        let mut pool = Mempool::new();
        let (a, b) = (tx(), tx());
        pool.add(a.clone());
        pool.add(b.clone());
        pool.add(a.clone());

        let block = Block::new(1, "0".repeat(64), vec![a]).unwrap();
        assert_eq!(pool.remove_confirmed(&block), 2);
        assert_eq!(pool.transactions(), &[b]);
        assert!(!pool.is_empty());
    }
}
