//! Ledger configuration
//!
//! Constants that stay fixed for the lifetime of a ledger: block reward,
//! block size cap and the difficulty policy. A `ChainConfig` is passed
//! explicitly to the ledger, the validator and the miner.

use crate::core::difficulty::{DifficultyPolicy, FixedTarget, RetargetPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Block reward in coins
pub const BLOCK_REWARD: u64 = 50;

/// Maximum block size in bytes (1MB like Bitcoin pre-SegWit)
pub const MAX_BLOCK_SIZE: u64 = 1_000_000;

/// Initial target work value (about 2^20 hashes per block)
pub const DEFAULT_TARGET: u64 = u64::MAX >> 20;

/// Number of blocks between difficulty adjustments
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Target block time in seconds
pub const TARGET_BLOCK_TIME: u64 = 10;

/// Maximum factor a single adjustment may move the target by
pub const MAX_DIFFICULTY_ADJUSTMENT_FACTOR: u64 = 4;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Difficulty policy selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DifficultyConfig {
    /// Constant target
    Fixed { target: u64 },
    /// Windowed retargeting toward `target_block_time_secs`
    Retarget {
        initial_target: u64,
        interval: u64,
        target_block_time_secs: u64,
        max_adjustment_factor: u64,
    },
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self::Retarget {
            initial_target: DEFAULT_TARGET,
            interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
            target_block_time_secs: TARGET_BLOCK_TIME,
            max_adjustment_factor: MAX_DIFFICULTY_ADJUSTMENT_FACTOR,
        }
    }
}

impl DifficultyConfig {
    /// Instantiate the configured policy
    pub fn build(&self) -> Box<dyn DifficultyPolicy> {
        match *self {
            Self::Fixed { target } => Box::new(FixedTarget(target)),
            Self::Retarget {
                initial_target,
                interval,
                target_block_time_secs,
                max_adjustment_factor,
            } => Box::new(RetargetPolicy {
                initial_target,
                interval,
                target_block_time_secs,
                max_adjustment_factor,
            }),
        }
    }
}

/// Ledger-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Largest accepted canonical block encoding
    pub max_block_size_bytes: u64,
    /// Amount minted by each block's reward transaction
    pub block_reward: u64,
    /// Difficulty policy
    pub difficulty: DifficultyConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_block_size_bytes: MAX_BLOCK_SIZE,
            block_reward: BLOCK_REWARD,
            difficulty: DifficultyConfig::default(),
        }
    }
}

impl ChainConfig {
    /// Config with a constant target, mostly useful for tests and demos
    pub fn with_fixed_target(target: u64) -> Self {
        Self {
            difficulty: DifficultyConfig::Fixed { target },
            ..Default::default()
        }
    }

    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every block invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_reward == 0 {
            return Err(ConfigError::Invalid("block_reward must be positive".into()));
        }
        if self.max_block_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_block_size_bytes must be positive".into(),
            ));
        }

        match self.difficulty {
            DifficultyConfig::Fixed { target } if target == 0 => {
                Err(ConfigError::Invalid("target must be positive".into()))
            }
            DifficultyConfig::Retarget {
                initial_target,
                interval,
                target_block_time_secs,
                max_adjustment_factor,
            } if initial_target == 0
                || interval == 0
                || target_block_time_secs == 0
                || max_adjustment_factor == 0 =>
            {
                Err(ConfigError::Invalid(
                    "retarget parameters must all be positive".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}
