//! Mining module for block creation and transaction pooling

pub mod mempool;
pub mod miner;
pub mod worker;

pub use mempool::Mempool;
pub use miner::{Miner, MiningError, MiningStats, TIMESTAMP_REFRESH_INTERVAL};
pub use worker::MiningWorker;
