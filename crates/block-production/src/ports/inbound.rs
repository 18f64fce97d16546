//! Inbound ports (driving side - API)

use crate::domain::{ForkName, SyncSubnetRegistration, RegistrationOutcome};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{AttestationData, CommitteeIndex, Epoch, Root, Slot, ValidatorIndex, Wei};
use tokio_util::sync::CancellationToken;

/// Primary port: Validator-facing proposer API
#[async_trait]
pub trait ProposerApi: Send + Sync {
    /// Build an unsigned block for `request.slot`
    async fn produce_block(
        &self,
        request: ProduceBlockRequest,
        cancel: &CancellationToken,
    ) -> Result<ProducedBlock>;

    /// Unblind if needed, broadcast and import a signed block; returns its root
    async fn accept_signed_block(&self, encoded: &[u8], cancel: &CancellationToken) -> Result<Root>;

    /// Attestation data for the current slot
    async fn get_attestation_data(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
        cancel: &CancellationToken,
    ) -> Result<AttestationData>;

    /// Record the sync subnets of one validator for one period
    fn register_sync_subnets(&self, registration: &SyncSubnetRegistration) -> RegistrationOutcome;

    /// Batch sync committee subscriptions from validator clients
    async fn submit_sync_committee_subscriptions(
        &self,
        subscriptions: Vec<SyncCommitteeSubscription>,
    ) -> Result<()>;
}

/// Block production request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProduceBlockRequest {
    /// Proposal slot
    pub slot: Slot,
    /// RANDAO reveal; must be 96 bytes
    pub randao_reveal: Vec<u8>,
    /// Graffiti; at most 32 bytes, zero-padded
    pub graffiti: Option<Vec<u8>>,
    /// Never consult the builder
    #[serde(default)]
    pub skip_mev_boost: bool,
    /// Percent multiplier on builder bids (default 100)
    #[serde(default)]
    pub builder_boost_factor: Option<u64>,
}

/// Produced block with its metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducedBlock {
    /// Fork of the block
    pub version: ForkName,
    /// Whether the block carries a payload header
    pub is_blinded: bool,
    /// Value of the chosen payload (zero before Bellatrix)
    pub payload_value: Wei,
    /// JSON-encoded block contents
    pub data: Vec<u8>,
}

/// One sync committee subscription request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommitteeSubscription {
    /// Validator index
    pub validator_index: ValidatorIndex,
    /// Positions of the validator in the sync committee
    pub sync_committee_indices: Vec<u64>,
    /// Last epoch (exclusive) of the subscription
    pub until_epoch: Epoch,
}
