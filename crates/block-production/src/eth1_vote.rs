//! Eth1 data voting.
//!
//! Picks the eth1 data a proposer votes for: the deposit contract state at
//! the latest eth1 block inside the follow-distance window of the current
//! voting period. Lookup failures yield a vote instead of an error, and no
//! path emits a deposit count below the head's accepted count.
//!
//! Votes already cast in the period are not tallied; the proposer always
//! votes for its own view of the window.

use crate::config::Eth1Config;
use crate::error::{BlockProductionError, Result};
use crate::ports::{DepositFetcher, Eth1Fetcher};
use shared_types::{hash, BeaconState, ChainSpec, Eth1Data, H256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Eth1 vote oracle.
pub struct Eth1VoteOracle {
    eth1: Arc<dyn Eth1Fetcher>,
    deposits: Arc<dyn DepositFetcher>,
    spec: ChainSpec,
    config: Eth1Config,
    /// Set once the "eth1 offline" warning has been logged for an outage
    offline_warned: AtomicBool,
}

impl Eth1VoteOracle {
    /// Create an oracle over the given fetchers.
    pub fn new(
        eth1: Arc<dyn Eth1Fetcher>,
        deposits: Arc<dyn DepositFetcher>,
        spec: ChainSpec,
        config: Eth1Config,
    ) -> Self {
        Self {
            eth1,
            deposits,
            spec,
            config,
            offline_warned: AtomicBool::new(false),
        }
    }

    /// Eth1 data to embed in a block built on `state`.
    ///
    /// `state` must already be advanced to the proposal slot. Lookup
    /// failures and the timeout degrade to a random vote; the only error is
    /// cancellation.
    pub async fn select_eth1_data(
        &self,
        state: &BeaconState,
        cancel: &CancellationToken,
    ) -> Result<Eth1Data> {
        if self.config.mock_votes {
            return Ok(self.mock_vote(state));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BlockProductionError::Cancelled { stage: "eth1 vote" }),
            outcome = tokio::time::timeout(self.config.vote_timeout(), self.window_vote(state)) => {
                match outcome {
                    Ok(vote) => vote,
                    Err(_) => {
                        warn!(
                            timeout_ms = self.config.vote_timeout_ms,
                            "Timed out computing eth1 vote, using random vote"
                        );
                        Ok(self.random_vote(state))
                    }
                }
            }
        }
    }

    /// Whether the offline warning has fired for the current outage.
    pub fn offline_warned(&self) -> bool {
        self.offline_warned.load(Ordering::Relaxed)
    }

    /// Re-arm the offline warning.
    pub fn reset_offline_warning(&self) {
        self.offline_warned.store(false, Ordering::Relaxed);
    }

    async fn window_vote(&self, state: &BeaconState) -> Result<Eth1Data> {
        let head_data = &state.eth1_data;

        if !self.eth1.is_connected() {
            if !self.offline_warned.swap(true, Ordering::Relaxed) {
                warn!("Beacon node is no longer connected to an eth1 chain, so eth1 data votes are now random");
            }
            return Ok(self.random_vote(state));
        }
        self.offline_warned.store(false, Ordering::Relaxed);

        let genesis_time = self.eth1.eth2_genesis_time();
        let follow_distance = self.spec.eth1_follow_distance_seconds();
        let period_start = self.spec.voting_period_start_time(genesis_time, state.slot);

        // A period starting before the follow distance also ends before genesis + follow distance.
        let latest_valid_time = match period_start.checked_sub(follow_distance) {
            Some(time) if time >= genesis_time.saturating_add(follow_distance) => time,
            _ => {
                debug!(
                    slot = state.slot,
                    period_start,
                    "Voting period before genesis + follow distance, using eth1data from head"
                );
                return Ok(head_data.clone());
            }
        };
        let earliest_valid_time = period_start.saturating_sub(follow_distance.saturating_mul(2));

        if let Err(e) = self.eth1.block_by_timestamp(earliest_valid_time).await {
            error!(error = %e, "Could not get first block by earliest valid time");
            return Ok(self.random_vote(state));
        }
        let last_block = match self.eth1.block_by_timestamp(latest_valid_time).await {
            Ok(block) => block,
            Err(e) => {
                error!(error = %e, "Could not get last block by latest valid time");
                return Ok(self.random_vote(state));
            }
        };
        if last_block.timestamp < earliest_valid_time {
            return Ok(head_data.clone());
        }

        let (deposit_count, deposit_root) = match self
            .deposits
            .deposits_number_and_root_at_height(last_block.number)
            .await
        {
            Ok(observed) => observed,
            Err(e) => {
                error!(error = %e, height = last_block.number, "Could not read deposit count at height");
                return Ok(self.random_vote(state));
            }
        };
        if deposit_count == 0 {
            let chain_start = self.deposits.chain_start_eth1_data();
            if chain_start.deposit_count >= head_data.deposit_count {
                return Ok(chain_start);
            }
            return Ok(head_data.clone());
        }

        if deposit_count >= head_data.deposit_count {
            return Ok(match self.eth1.block_hash_by_height(last_block.number).await {
                Ok(block_hash) => Eth1Data {
                    deposit_root,
                    deposit_count,
                    block_hash,
                },
                Err(e) => {
                    error!(error = %e, "Could not get hash of last block by latest valid time");
                    self.random_vote(state)
                }
            });
        }

        Ok(head_data.clone())
    }

    /// Unpredictable vote that cannot reach a majority.
    fn random_vote(&self, state: &BeaconState) -> Eth1Data {
        Eth1Data {
            deposit_root: hash(H256::from_low_u64_be(rand::random::<u64>()).as_bytes()),
            deposit_count: state.eth1_data.deposit_count,
            block_hash: hash(H256::from_low_u64_be(rand::random::<u64>()).as_bytes()),
        }
    }

    /// Deterministic interop vote derived from the slot.
    fn mock_vote(&self, state: &BeaconState) -> Eth1Data {
        let slot_in_period = state.slot % self.spec.slots_per_eth1_voting_period();
        let seed = self.spec.epoch_at_slot(state.slot).wrapping_add(slot_in_period);
        let deposit_root = hash(&seed.to_le_bytes());
        Eth1Data {
            deposit_root,
            deposit_count: state.eth1_data.deposit_count,
            block_hash: hash(deposit_root.as_bytes()),
        }
    }
}

/// Vote used when the oracle itself fails: zero hashes, head deposit count.
pub fn zero_hash_vote(state: &BeaconState) -> Eth1Data {
    Eth1Data {
        deposit_root: H256::zero(),
        deposit_count: state.eth1_data.deposit_count,
        block_hash: H256::zero(),
    }
}
