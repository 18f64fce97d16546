//! Configuration types for block production

use crate::error::{BlockProductionError, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Default builder boost factor (percent); 100 compares bids at face value.
pub const DEFAULT_BUILDER_BOOST_FACTOR: u64 = 100;

/// Runtime configuration for block production
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BlockProductionConfig {
    /// Build consensus and execution fields concurrently
    pub build_mode: BuildMode,

    /// Eth1 voting settings
    pub eth1: Eth1Config,

    /// External builder settings
    pub builder: BuilderConfig,
}

/// Assembly mode for the consensus and execution stages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Consensus fields in a spawned task, execution fields on the caller
    #[default]
    Parallel,
    /// Both stages on the caller, one after the other
    Sequential,
}

/// Eth1 voting settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Eth1Config {
    /// Upper bound for the whole eth1 vote computation (default: 2000)
    pub vote_timeout_ms: u64,

    /// Emit deterministic mock votes instead of querying eth1 (interop networks)
    pub mock_votes: bool,
}

impl Default for Eth1Config {
    fn default() -> Self {
        Self {
            vote_timeout_ms: 2_000,
            mock_votes: false,
        }
    }
}

impl Eth1Config {
    /// Vote timeout as a `Duration`.
    pub fn vote_timeout(&self) -> Duration {
        Duration::from_millis(self.vote_timeout_ms)
    }
}

/// External builder settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Deadline for a builder header request (default: 1000)
    pub get_header_timeout_ms: u64,

    /// Percentage added to the local payload value before comparing bids
    pub local_block_value_boost: u64,

    /// Bids below this value (gwei) are ignored
    pub min_bid_gwei: u64,

    /// Bids must beat the local value by at least this much (gwei)
    pub min_bid_difference_gwei: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            get_header_timeout_ms: 1_000,
            local_block_value_boost: 0,
            min_bid_gwei: 0,
            min_bid_difference_gwei: 0,
        }
    }
}

impl BuilderConfig {
    /// Header request timeout as a `Duration`.
    pub fn get_header_timeout(&self) -> Duration {
        Duration::from_millis(self.get_header_timeout_ms)
    }
}

impl BlockProductionConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BlockProductionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BN_BUILD_BLOCK_PARALLEL`: `false`/`0` selects sequential assembly (default: true)
    /// - `BN_ETH1_VOTE_TIMEOUT_MS`: eth1 vote deadline (default: 2000)
    /// - `BN_ETH1_MOCK_VOTES`: mock eth1 votes (default: false)
    /// - `BN_BUILDER_TIMEOUT_MS`: builder header deadline (default: 1000)
    /// - `BN_LOCAL_BLOCK_VALUE_BOOST`: local boost percent (default: 0)
    /// - `BN_MIN_BUILDER_BID`: minimum bid in gwei (default: 0)
    /// - `BN_MIN_BUILDER_DIFF`: minimum margin over local in gwei (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse_u64 = |key: &str, default: u64| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            build_mode: match env::var("BN_BUILD_BLOCK_PARALLEL") {
                Ok(v) if v.to_lowercase() == "false" || v == "0" => BuildMode::Sequential,
                _ => BuildMode::Parallel,
            },
            eth1: Eth1Config {
                vote_timeout_ms: parse_u64("BN_ETH1_VOTE_TIMEOUT_MS", defaults.eth1.vote_timeout_ms),
                mock_votes: env::var("BN_ETH1_MOCK_VOTES")
                    .map(|v| v.to_lowercase() == "true" || v == "1")
                    .unwrap_or(false),
            },
            builder: BuilderConfig {
                get_header_timeout_ms: parse_u64(
                    "BN_BUILDER_TIMEOUT_MS",
                    defaults.builder.get_header_timeout_ms,
                ),
                local_block_value_boost: parse_u64("BN_LOCAL_BLOCK_VALUE_BOOST", 0),
                min_bid_gwei: parse_u64("BN_MIN_BUILDER_BID", 0),
                min_bid_difference_gwei: parse_u64("BN_MIN_BUILDER_DIFF", 0),
            },
        }
    }

    /// Reject settings that would disable a stage outright.
    pub fn validate(&self) -> Result<()> {
        if self.eth1.vote_timeout_ms == 0 {
            return Err(BlockProductionError::InvalidConfig(
                "eth1.vote_timeout_ms must be positive".into(),
            ));
        }
        if self.builder.get_header_timeout_ms == 0 {
            return Err(BlockProductionError::InvalidConfig(
                "builder.get_header_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
