//! Difficulty policies
//!
//! A policy maps the block history to the target work value the next block
//! must beat. Targets are plain `u64` work values: a block is acceptable when
//! `work_value(hash) < target`, so a smaller target is harder.

use crate::core::block::Block;
use log::debug;

/// Maps ledger history to the current target work value
pub trait DifficultyPolicy: Send + Sync {
    /// Target for the block that would extend `history`
    fn calculate_target(&self, history: &[Block]) -> u64;
}

/// A constant target, independent of history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTarget(pub u64);

impl DifficultyPolicy for FixedTarget {
    fn calculate_target(&self, _history: &[Block]) -> u64 {
        self.0
    }
}

/// Bitcoin-style retargeting over fixed windows of blocks.
///
/// Every `interval` blocks the target is multiplied by
/// `actual_span / expected_span` of the window just completed. The actual
/// span is clamped to within `max_adjustment_factor` of the expected one.
/// Windows start at block 1: the genesis timestamp is a fixed constant, not
/// a solve time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetargetPolicy {
    pub initial_target: u64,
    pub interval: u64,
    pub target_block_time_secs: u64,
    pub max_adjustment_factor: u64,
}

impl RetargetPolicy {
    /// Apply one window's adjustment
    fn adjust(&self, target: u64, first: &Block, last: &Block) -> u64 {
        let expected = u128::from(self.interval.max(1)) * u128::from(self.target_block_time_secs.max(1));
        let factor = u128::from(self.max_adjustment_factor.max(1));

        let actual = last
            .timestamp
            .signed_duration_since(first.timestamp)
            .num_seconds()
            .max(0) as u128;
        let actual = actual.clamp((expected / factor).max(1), expected * factor);

        let adjusted = u128::from(target) * actual / expected;
        let adjusted = adjusted.clamp(1, u128::from(u64::MAX)) as u64;

        debug!(
            "Retarget at block {}: window took {}s (expected {}s), target {} -> {}",
            last.index,
            actual,
            expected,
            target,
            adjusted
        );

        adjusted
    }
}

impl DifficultyPolicy for RetargetPolicy {
    fn calculate_target(&self, history: &[Block]) -> u64 {
        let interval = self.interval.max(1) as usize;
        let mut target = self.initial_target.max(1);
        let mined = history.get(1..).unwrap_or_default();

        // Window w spans blocks [(w - 1) * interval + 1, w * interval + 1]
        let mut end = interval;
        while end < mined.len() {
            target = self.adjust(target, &mined[end - interval], &mined[end]);
            end += interval;
        }

        target
    }
}
