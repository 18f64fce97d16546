//! # Network Constants
//!
//! Protocol parameters for a beacon network. `ChainSpec::default()` is
//! mainnet; `ChainSpec::minimal()` shrinks epochs and committees for tests.

use crate::primitives::{Epoch, Slot};
use serde::Deserialize;

/// Epoch value meaning "never".
pub const FAR_FUTURE_EPOCH: Epoch = u64::MAX;

/// Protocol constants for one network.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChainSpec {
    /// Slots per epoch
    pub slots_per_epoch: u64,
    /// Seconds per slot
    pub seconds_per_slot: u64,
    /// Epochs per eth1 voting period
    pub epochs_per_eth1_voting_period: u64,
    /// Eth1 blocks to trail the eth1 head by
    pub eth1_follow_distance: u64,
    /// Expected eth1 block time
    pub seconds_per_eth1_block: u64,

    /// Altair activation epoch
    pub altair_fork_epoch: Epoch,
    /// Bellatrix activation epoch
    pub bellatrix_fork_epoch: Epoch,
    /// Capella activation epoch
    pub capella_fork_epoch: Epoch,
    /// Deneb activation epoch
    pub deneb_fork_epoch: Epoch,

    /// Epochs per sync committee period
    pub epochs_per_sync_committee_period: u64,
    /// Sync committee members
    pub sync_committee_size: u64,
    /// Sync committee gossip subnets
    pub sync_committee_subnet_count: u64,

    /// Consecutive empty slots that disable the builder
    pub max_builder_consecutive_missed_slots: u64,
    /// Empty slots in the last epoch that disable the builder
    pub max_builder_epoch_missed_slots: u64,

    /// Blob commitments per block
    pub max_blobs_per_block: u64,
    /// Deposits per block
    pub max_deposits: u64,
    /// Attestations per block
    pub max_attestations: u64,
    /// Proposer slashings per block
    pub max_proposer_slashings: u64,
    /// Attester slashings per block
    pub max_attester_slashings: u64,
    /// Voluntary exits per block
    pub max_voluntary_exits: u64,
    /// BLS-to-execution changes per block
    pub max_bls_to_execution_changes: u64,

    /// Tolerated clock skew for gossip and request timing (milliseconds)
    pub maximum_gossip_clock_disparity_ms: u64,
    /// Length of the `block_roots` ring buffer
    pub slots_per_historical_root: u64,
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl ChainSpec {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        Self {
            slots_per_epoch: 32,
            seconds_per_slot: 12,
            epochs_per_eth1_voting_period: 64,
            eth1_follow_distance: 2048,
            seconds_per_eth1_block: 14,
            altair_fork_epoch: 74_240,
            bellatrix_fork_epoch: 144_896,
            capella_fork_epoch: 194_048,
            deneb_fork_epoch: 269_568,
            epochs_per_sync_committee_period: 256,
            sync_committee_size: 512,
            sync_committee_subnet_count: 4,
            max_builder_consecutive_missed_slots: 3,
            max_builder_epoch_missed_slots: 5,
            max_blobs_per_block: 6,
            max_deposits: 16,
            max_attestations: 128,
            max_proposer_slashings: 16,
            max_attester_slashings: 2,
            max_voluntary_exits: 16,
            max_bls_to_execution_changes: 16,
            maximum_gossip_clock_disparity_ms: 500,
            slots_per_historical_root: 8192,
        }
    }

    /// Minimal preset with every fork active from genesis unless overridden.
    pub fn minimal() -> Self {
        Self {
            slots_per_epoch: 8,
            seconds_per_slot: 6,
            epochs_per_eth1_voting_period: 4,
            eth1_follow_distance: 16,
            altair_fork_epoch: 0,
            bellatrix_fork_epoch: 0,
            capella_fork_epoch: 0,
            deneb_fork_epoch: 0,
            epochs_per_sync_committee_period: 8,
            sync_committee_size: 32,
            slots_per_historical_root: 64,
            ..Self::mainnet()
        }
    }

    /// Set all fork epochs at once; handy for fork-matrix tests.
    pub fn with_fork_epochs(
        mut self,
        altair: Epoch,
        bellatrix: Epoch,
        capella: Epoch,
        deneb: Epoch,
    ) -> Self {
        self.altair_fork_epoch = altair;
        self.bellatrix_fork_epoch = bellatrix;
        self.capella_fork_epoch = capella;
        self.deneb_fork_epoch = deneb;
        self
    }

    /// Epoch containing `slot`.
    pub fn epoch_at_slot(&self, slot: Slot) -> Epoch {
        slot / self.slots_per_epoch.max(1)
    }

    /// First slot of `epoch`.
    pub fn epoch_start_slot(&self, epoch: Epoch) -> Slot {
        epoch.saturating_mul(self.slots_per_epoch)
    }

    /// Unix start time of `slot`.
    pub fn slot_start_time(&self, genesis_time: u64, slot: Slot) -> u64 {
        genesis_time.saturating_add(slot.saturating_mul(self.seconds_per_slot))
    }

    /// Slots in one eth1 voting period.
    pub fn slots_per_eth1_voting_period(&self) -> u64 {
        self.epochs_per_eth1_voting_period
            .saturating_mul(self.slots_per_epoch)
            .max(1)
    }

    /// Start time of the eth1 voting period containing `slot`.
    pub fn voting_period_start_time(&self, genesis_time: u64, slot: Slot) -> u64 {
        let period_start_slot = slot - slot % self.slots_per_eth1_voting_period();
        self.slot_start_time(genesis_time, period_start_slot)
    }

    /// Eth1 follow distance expressed in seconds.
    pub fn eth1_follow_distance_seconds(&self) -> u64 {
        self.eth1_follow_distance
            .saturating_mul(self.seconds_per_eth1_block)
    }

    /// Sync committee period of `epoch`.
    pub fn sync_committee_period(&self, epoch: Epoch) -> u64 {
        epoch / self.epochs_per_sync_committee_period.max(1)
    }

    /// Committee positions per sync subnet.
    pub fn sync_subcommittee_size(&self) -> u64 {
        (self.sync_committee_size / self.sync_committee_subnet_count.max(1)).max(1)
    }

    /// Wall-clock length of one epoch in milliseconds.
    pub fn epoch_duration_ms(&self) -> u64 {
        self.slots_per_epoch
            .saturating_mul(self.seconds_per_slot)
            .saturating_mul(1000)
    }
}
