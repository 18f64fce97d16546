//! Fork-typed beacon blocks.
//!
//! `BlockDraft` is a closed union over the five fork shapes. Each fork body
//! embeds the previous fork's body as `base`, so a later body is a strict
//! superset of an earlier one. Fork-specific fields are reached through the
//! object-safe [`BlockBody`] trait, whose accessors return `None` for forks
//! that lack the field.

use crate::domain::fork::ForkName;
use crate::error::{BlockProductionError, Result};
use serde::{Deserialize, Serialize};
use shared_types::{
    object_root, Attestation, AttesterSlashing, BlindedBlobSidecar, BlobSidecar, BlsSignature,
    ChainSpec, Deposit, Eth1Data, ExecutionPayload, ExecutionPayloadHeader, KzgCommitment,
    ProposerSlashing, Root, SignedBlindedBlobSidecar, SignedBlobSidecar,
    SignedBlsToExecutionChange, SignedVoluntaryExit, Slot, SyncAggregate, ValidatorIndex, H256,
};

// =============================================================================
// BODIES
// =============================================================================

/// Phase0 block body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase0Body {
    /// Proposer's RANDAO reveal
    pub randao_reveal: BlsSignature,
    /// Eth1 vote
    pub eth1_data: Eth1Data,
    /// Arbitrary proposer data
    pub graffiti: H256,
    /// Proposer slashings
    pub proposer_slashings: Vec<ProposerSlashing>,
    /// Attester slashings
    pub attester_slashings: Vec<AttesterSlashing>,
    /// Attestations
    pub attestations: Vec<Attestation>,
    /// Deposits
    pub deposits: Vec<Deposit>,
    /// Voluntary exits
    pub voluntary_exits: Vec<SignedVoluntaryExit>,
}

/// Altair block body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AltairBody {
    /// Phase0 fields
    pub base: Phase0Body,
    /// Sync committee participation
    pub sync_aggregate: SyncAggregate,
}

/// Execution part of a post-merge body: the payload, or its header when blinded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionField {
    /// Full payload from the local engine or an unblinded builder block
    Full(ExecutionPayload),
    /// Header committed to by a builder bid
    Blinded(ExecutionPayloadHeader),
}

impl Default for ExecutionField {
    fn default() -> Self {
        Self::Full(ExecutionPayload::default())
    }
}

impl ExecutionField {
    /// Execution block hash of the payload or header.
    pub fn block_hash(&self) -> H256 {
        match self {
            Self::Full(payload) => payload.block_hash,
            Self::Blinded(header) => header.block_hash,
        }
    }

    /// Header form; identical for a payload and its blinded counterpart.
    pub fn to_header(&self) -> ExecutionPayloadHeader {
        match self {
            Self::Full(payload) => payload.to_header(),
            Self::Blinded(header) => header.clone(),
        }
    }
}

/// Bellatrix block body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BellatrixBody {
    /// Altair fields
    pub base: AltairBody,
    /// Execution payload or header
    pub execution: ExecutionField,
}

/// Capella block body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapellaBody {
    /// Bellatrix fields
    pub base: BellatrixBody,
    /// Withdrawal credential changes
    pub bls_to_execution_changes: Vec<SignedBlsToExecutionChange>,
}

/// Deneb block body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenebBody {
    /// Capella fields
    pub base: CapellaBody,
    /// Commitments to the blobs carried by sidecars
    pub blob_kzg_commitments: Vec<KzgCommitment>,
}

/// Uniform access to the fields of any fork body.
pub trait BlockBody: Send + Sync {
    /// Fields present since phase0.
    fn phase0(&self) -> &Phase0Body;

    /// Mutable phase0 fields.
    fn phase0_mut(&mut self) -> &mut Phase0Body;

    /// Sync aggregate, Altair onward.
    fn sync_aggregate(&self) -> Option<&SyncAggregate> {
        None
    }

    /// Mutable sync aggregate, Altair onward.
    fn sync_aggregate_mut(&mut self) -> Option<&mut SyncAggregate> {
        None
    }

    /// Execution payload or header, Bellatrix onward.
    fn execution(&self) -> Option<&ExecutionField> {
        None
    }

    /// Mutable execution field, Bellatrix onward.
    fn execution_mut(&mut self) -> Option<&mut ExecutionField> {
        None
    }

    /// BLS-to-execution changes, Capella onward.
    fn bls_to_execution_changes(&self) -> Option<&Vec<SignedBlsToExecutionChange>> {
        None
    }

    /// Mutable BLS-to-execution changes, Capella onward.
    fn bls_to_execution_changes_mut(&mut self) -> Option<&mut Vec<SignedBlsToExecutionChange>> {
        None
    }

    /// Blob commitments, Deneb onward.
    fn blob_kzg_commitments(&self) -> Option<&Vec<KzgCommitment>> {
        None
    }

    /// Mutable blob commitments, Deneb onward.
    fn blob_kzg_commitments_mut(&mut self) -> Option<&mut Vec<KzgCommitment>> {
        None
    }
}

impl BlockBody for Phase0Body {
    fn phase0(&self) -> &Phase0Body {
        self
    }

    fn phase0_mut(&mut self) -> &mut Phase0Body {
        self
    }
}

impl BlockBody for AltairBody {
    fn phase0(&self) -> &Phase0Body {
        &self.base
    }

    fn phase0_mut(&mut self) -> &mut Phase0Body {
        &mut self.base
    }

    fn sync_aggregate(&self) -> Option<&SyncAggregate> {
        Some(&self.sync_aggregate)
    }

    fn sync_aggregate_mut(&mut self) -> Option<&mut SyncAggregate> {
        Some(&mut self.sync_aggregate)
    }
}

impl BlockBody for BellatrixBody {
    fn phase0(&self) -> &Phase0Body {
        self.base.phase0()
    }

    fn phase0_mut(&mut self) -> &mut Phase0Body {
        self.base.phase0_mut()
    }

    fn sync_aggregate(&self) -> Option<&SyncAggregate> {
        self.base.sync_aggregate()
    }

    fn sync_aggregate_mut(&mut self) -> Option<&mut SyncAggregate> {
        self.base.sync_aggregate_mut()
    }

    fn execution(&self) -> Option<&ExecutionField> {
        Some(&self.execution)
    }

    fn execution_mut(&mut self) -> Option<&mut ExecutionField> {
        Some(&mut self.execution)
    }
}

impl BlockBody for CapellaBody {
    fn phase0(&self) -> &Phase0Body {
        self.base.phase0()
    }

    fn phase0_mut(&mut self) -> &mut Phase0Body {
        self.base.phase0_mut()
    }

    fn sync_aggregate(&self) -> Option<&SyncAggregate> {
        self.base.sync_aggregate()
    }

    fn sync_aggregate_mut(&mut self) -> Option<&mut SyncAggregate> {
        self.base.sync_aggregate_mut()
    }

    fn execution(&self) -> Option<&ExecutionField> {
        self.base.execution()
    }

    fn execution_mut(&mut self) -> Option<&mut ExecutionField> {
        self.base.execution_mut()
    }

    fn bls_to_execution_changes(&self) -> Option<&Vec<SignedBlsToExecutionChange>> {
        Some(&self.bls_to_execution_changes)
    }

    fn bls_to_execution_changes_mut(&mut self) -> Option<&mut Vec<SignedBlsToExecutionChange>> {
        Some(&mut self.bls_to_execution_changes)
    }
}

impl BlockBody for DenebBody {
    fn phase0(&self) -> &Phase0Body {
        self.base.phase0()
    }

    fn phase0_mut(&mut self) -> &mut Phase0Body {
        self.base.phase0_mut()
    }

    fn sync_aggregate(&self) -> Option<&SyncAggregate> {
        self.base.sync_aggregate()
    }

    fn sync_aggregate_mut(&mut self) -> Option<&mut SyncAggregate> {
        self.base.sync_aggregate_mut()
    }

    fn execution(&self) -> Option<&ExecutionField> {
        self.base.execution()
    }

    fn execution_mut(&mut self) -> Option<&mut ExecutionField> {
        self.base.execution_mut()
    }

    fn bls_to_execution_changes(&self) -> Option<&Vec<SignedBlsToExecutionChange>> {
        self.base.bls_to_execution_changes()
    }

    fn bls_to_execution_changes_mut(&mut self) -> Option<&mut Vec<SignedBlsToExecutionChange>> {
        self.base.bls_to_execution_changes_mut()
    }

    fn blob_kzg_commitments(&self) -> Option<&Vec<KzgCommitment>> {
        Some(&self.blob_kzg_commitments)
    }

    fn blob_kzg_commitments_mut(&mut self) -> Option<&mut Vec<KzgCommitment>> {
        Some(&mut self.blob_kzg_commitments)
    }
}

// =============================================================================
// BLOCKS
// =============================================================================

/// Beacon block over a fork-specific body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlock<B> {
    /// Block slot
    pub slot: Slot,
    /// Proposer index
    pub proposer_index: ValidatorIndex,
    /// Parent block root
    pub parent_root: Root,
    /// Post-state root
    pub state_root: Root,
    /// Fork body
    pub body: B,
}

/// A fork-typed block, mutable while being assembled.
///
/// The variant is chosen once from the slot's epoch by [`BlockDraft::empty`]
/// and never changes afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version", content = "block", rename_all = "lowercase")]
pub enum BlockDraft {
    /// Phase0 block
    Phase0(BeaconBlock<Phase0Body>),
    /// Altair block
    Altair(BeaconBlock<AltairBody>),
    /// Bellatrix block
    Bellatrix(BeaconBlock<BellatrixBody>),
    /// Capella block
    Capella(BeaconBlock<CapellaBody>),
    /// Deneb block
    Deneb(BeaconBlock<DenebBody>),
}

macro_rules! map_block {
    ($draft:expr, $block:ident => $body:expr) => {
        match $draft {
            BlockDraft::Phase0($block) => $body,
            BlockDraft::Altair($block) => $body,
            BlockDraft::Bellatrix($block) => $body,
            BlockDraft::Capella($block) => $body,
            BlockDraft::Deneb($block) => $body,
        }
    };
}

impl BlockDraft {
    /// Empty block of the fork active at `slot`.
    pub fn empty(slot: Slot, spec: &ChainSpec) -> Self {
        let fork = ForkName::from_epoch(spec.epoch_at_slot(slot), spec);
        let mut draft = match fork {
            ForkName::Phase0 => Self::Phase0(BeaconBlock::default()),
            ForkName::Altair => Self::Altair(BeaconBlock::default()),
            ForkName::Bellatrix => Self::Bellatrix(BeaconBlock::default()),
            ForkName::Capella => Self::Capella(BeaconBlock::default()),
            ForkName::Deneb => Self::Deneb(BeaconBlock::default()),
        };
        map_block!(&mut draft, block => block.slot = slot);
        draft
    }

    /// Fork of this block.
    pub fn fork(&self) -> ForkName {
        match self {
            Self::Phase0(_) => ForkName::Phase0,
            Self::Altair(_) => ForkName::Altair,
            Self::Bellatrix(_) => ForkName::Bellatrix,
            Self::Capella(_) => ForkName::Capella,
            Self::Deneb(_) => ForkName::Deneb,
        }
    }

    /// Block slot.
    pub fn slot(&self) -> Slot {
        map_block!(self, block => block.slot)
    }

    /// Proposer index.
    pub fn proposer_index(&self) -> ValidatorIndex {
        map_block!(self, block => block.proposer_index)
    }

    /// Parent root.
    pub fn parent_root(&self) -> Root {
        map_block!(self, block => block.parent_root)
    }

    /// Post-state root.
    pub fn state_root(&self) -> Root {
        map_block!(self, block => block.state_root)
    }

    /// Stamp proposer and parent.
    pub fn set_header(&mut self, proposer_index: ValidatorIndex, parent_root: Root) {
        map_block!(self, block => {
            block.proposer_index = proposer_index;
            block.parent_root = parent_root;
        })
    }

    /// Stamp the post-state root.
    pub fn set_state_root(&mut self, state_root: Root) {
        map_block!(self, block => block.state_root = state_root)
    }

    /// Body accessors.
    pub fn body(&self) -> &dyn BlockBody {
        map_block!(self, block => &block.body as &dyn BlockBody)
    }

    /// Mutable body accessors.
    pub fn body_mut(&mut self) -> &mut dyn BlockBody {
        map_block!(self, block => &mut block.body as &mut dyn BlockBody)
    }

    /// Whether the block carries a payload header instead of a payload.
    pub fn is_blinded(&self) -> bool {
        matches!(self.body().execution(), Some(ExecutionField::Blinded(_)))
    }

    /// Block root.
    ///
    /// Computed with the payload replaced by its header, so a blinded block
    /// and its unblinded counterpart share one root.
    pub fn canonical_root(&self) -> Result<Root> {
        let mut canonical = self.clone();
        if let Some(execution) = canonical.body_mut().execution_mut() {
            let header = execution.to_header();
            *execution = ExecutionField::Blinded(header);
        }
        object_root(&canonical).map_err(|e| BlockProductionError::internal("compute block root", e))
    }
}

// =============================================================================
// WIRE CONTAINERS
// =============================================================================

/// Unsigned block handed to the validator client, with blob sidecars.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContents {
    /// Block
    pub block: BlockDraft,
    /// Sidecars for a full Deneb block
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blob_sidecars: Vec<BlobSidecar>,
    /// Sidecars for a blinded Deneb block
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blinded_blob_sidecars: Vec<BlindedBlobSidecar>,
}

impl BlockContents {
    /// JSON wire encoding, tagged with the fork version.
    pub fn encode(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse the JSON wire encoding.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Proposer-signed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBeaconBlock {
    /// Block
    pub message: BlockDraft,
    /// Proposer signature
    pub signature: BlsSignature,
}

/// Signed block with its signed sidecars, as submitted by a validator client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlockContents {
    /// Signed block
    pub signed_block: SignedBeaconBlock,
    /// Signed sidecars of a full Deneb block
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signed_blob_sidecars: Vec<SignedBlobSidecar>,
    /// Signed sidecars of a blinded Deneb block
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signed_blinded_blob_sidecars: Vec<SignedBlindedBlobSidecar>,
}

impl SignedBlockContents {
    /// JSON wire encoding.
    pub fn encode(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse the JSON wire encoding.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
