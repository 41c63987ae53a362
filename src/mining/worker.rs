//! Background mining loop
//!
//! Each round snapshots a candidate and target under a read lock, solves on a
//! blocking thread, and restarts as soon as the chain tip moves underneath it.

use crate::core::Blockchain;
use crate::mining::miner::{Miner, MiningError};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Mines blocks onto a shared chain until stopped
pub struct MiningWorker {
    miner: Miner,
    blockchain: Arc<RwLock<Blockchain>>,
    shutdown: CancellationToken,
}

impl MiningWorker {
    pub fn new(
        miner: Miner,
        blockchain: Arc<RwLock<Blockchain>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            miner,
            blockchain,
            shutdown,
        }
    }

    /// Mine until `limit` blocks have been appended (forever if `None`) or
    /// `shutdown` is cancelled. Returns the number of blocks this worker added.
    pub async fn run(&self, limit: Option<u64>) -> Result<u64, MiningError> {
        let mut mined = 0u64;

        while limit.map_or(true, |limit| mined < limit) {
            if self.shutdown.is_cancelled() {
                break;
            }

            // Subscribe under the same guard so no tip change is missed
            let (candidate, target, mut tip) = {
                let chain = self.blockchain.read().await;
                (
                    self.miner.build_candidate(&chain)?,
                    chain.difficulty(),
                    chain.subscribe_tip(),
                )
            };

            let round = self.shutdown.child_token();
            let miner = self.miner.clone();
            let round_token = round.clone();
            let mut task =
                tokio::task::spawn_blocking(move || miner.solve(candidate, target, &round_token));

            let solved = tokio::select! {
                result = &mut task => result?,
                _ = tip.changed() => {
                    info!("Chain tip moved, restarting mining round");
                    round.cancel();
                    if let Err(e) = task.await {
                        warn!("Abandoned mining round failed: {}", e);
                    }
                    continue;
                }
            };

            let block = match solved {
                Ok((block, _stats)) => block,
                Err(MiningError::Cancelled) => continue,
                Err(e) => return Err(e),
            };

            let mut chain = self.blockchain.write().await;
            match chain.add_block(block) {
                Ok(()) => mined += 1,
                Err(e) => warn!("Mined block was rejected: {}", e),
            }
        }

        info!("Mining worker stopped after {} blocks", mined);
        Ok(mined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::core::{Block, DifficultyPolicy};
    use crate::crypto::KeyPair;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    const EASY: u64 = u64::MAX >> 4;

    /// Target read from a shared cell so a test can change it mid-run
    struct SharedTarget(Arc<AtomicU64>);

    impl DifficultyPolicy for SharedTarget {
        fn calculate_target(&self, _history: &[Block]) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_mines_limited_blocks() {
        let config = ChainConfig::with_fixed_target(EASY);
        let chain = Arc::new(RwLock::new(Blockchain::new(config.clone()).unwrap()));
        let worker = MiningWorker::new(
            Miner::new(KeyPair::generate(), &config),
            chain.clone(),
            CancellationToken::new(),
        );

        let mined = worker.run(Some(3)).await.unwrap();

        assert_eq!(mined, 3);
        let chain = chain.read().await;
        assert_eq!(chain.height(), 3);
        assert!(chain.validate_chain().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_stops_on_shutdown() {
        let config = ChainConfig::default();
        let chain = Blockchain::with_policy(
            config.clone(),
            Box::new(SharedTarget(Arc::new(AtomicU64::new(0)))),
        )
        .unwrap();
        let shutdown = CancellationToken::new();
        let worker = MiningWorker::new(
            Miner::new(KeyPair::generate(), &config),
            Arc::new(RwLock::new(chain)),
            shutdown.clone(),
        );

        let handle = tokio::spawn(async move { worker.run(None).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let mined = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(mined, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_restarts_when_tip_moves() {
        let target = Arc::new(AtomicU64::new(0));
        let config = ChainConfig::default();
        let chain = Blockchain::with_policy(config.clone(), Box::new(SharedTarget(target.clone())))
            .unwrap();
        let chain = Arc::new(RwLock::new(chain));

        let worker_key = KeyPair::generate();
        let worker_address = worker_key.address();
        let worker = MiningWorker::new(
            Miner::new(worker_key, &config),
            chain.clone(),
            CancellationToken::new(),
        );
        let handle = tokio::spawn(async move { worker.run(Some(1)).await });

        // Let the worker start on an unsolvable round
        tokio::time::sleep(Duration::from_millis(100)).await;
        {
            let mut guard = chain.write().await;
            target.store(EASY, Ordering::SeqCst);
            let rival = Miner::new(KeyPair::generate(), &config);
            rival.mine_block(&mut guard).unwrap();
        }

        let mined = tokio::time::timeout(Duration::from_secs(30), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(mined, 1);

        let chain = chain.read().await;
        assert_eq!(chain.height(), 2);
        let tip = chain.last_block().unwrap();
        assert!(tip.transactions[0].outputs[0].is_owned_by(&worker_address));
    }
}
