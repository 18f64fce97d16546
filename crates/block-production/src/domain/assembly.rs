//! Block assembly stages.
//!
//! A draft moves through a fixed sequence of stages. The consensus and
//! execution halves may be built concurrently, so each half is produced as a
//! partial struct and merged into the draft after both complete.

use crate::domain::block::{BlockDraft, ExecutionField};
use crate::error::{BlockProductionError, Result};
use shared_types::{
    Attestation, AttesterSlashing, BlindedBlobsBundle, BlobsBundle, Deposit, Eth1Data,
    ProposerSlashing, SignedBlsToExecutionChange, SignedVoluntaryExit, SyncAggregate, Wei,
};

/// Lifecycle of a block draft.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DraftStage {
    /// Header stamped, body empty
    Empty,
    /// Consensus fields merged
    ConsensusPopulated,
    /// Execution fields merged
    ExecutionPopulated,
    /// State root stamped
    StateRootComputed,
    /// Encoded for the caller; immutable from here on
    Serialized,
}

impl DraftStage {
    /// Stage that must follow this one.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::ConsensusPopulated),
            Self::ConsensusPopulated => Some(Self::ExecutionPopulated),
            Self::ExecutionPopulated => Some(Self::StateRootComputed),
            Self::StateRootComputed => Some(Self::Serialized),
            Self::Serialized => None,
        }
    }

    /// Move to `to`, rejecting anything but the immediate successor.
    pub fn advance(&mut self, to: Self) -> Result<()> {
        if self.next() != Some(to) {
            return Err(BlockProductionError::internal(
                "assemble block",
                format!("invalid stage transition {:?} -> {:?}", self, to),
            ));
        }
        *self = to;
        Ok(())
    }
}

/// Consensus half of a block body.
#[derive(Clone, Debug, Default)]
pub struct ConsensusFields {
    /// Eth1 vote
    pub eth1_data: Eth1Data,
    /// Deposits matching the vote
    pub deposits: Vec<Deposit>,
    /// Packed attestations
    pub attestations: Vec<Attestation>,
    /// Proposer slashings
    pub proposer_slashings: Vec<ProposerSlashing>,
    /// Attester slashings
    pub attester_slashings: Vec<AttesterSlashing>,
    /// Voluntary exits
    pub voluntary_exits: Vec<SignedVoluntaryExit>,
    /// Sync aggregate, Altair onward
    pub sync_aggregate: Option<SyncAggregate>,
    /// BLS-to-execution changes, Capella onward
    pub bls_to_execution_changes: Vec<SignedBlsToExecutionChange>,
}

/// Blob data carried alongside the execution field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobsData {
    /// Blobs from the local engine
    Full(BlobsBundle),
    /// Blob roots from a builder bid
    Blinded(BlindedBlobsBundle),
}

impl BlobsData {
    /// Commitments in block order.
    pub fn kzg_commitments(&self) -> &[shared_types::KzgCommitment] {
        match self {
            Self::Full(bundle) => &bundle.kzg_commitments,
            Self::Blinded(bundle) => &bundle.kzg_commitments,
        }
    }
}

/// Execution half of a block body.
#[derive(Clone, Debug, Default)]
pub struct ExecutionFields {
    /// Chosen payload or header; `None` before Bellatrix
    pub execution: Option<ExecutionField>,
    /// Blob data, Deneb onward
    pub blobs: Option<BlobsData>,
    /// Value of the chosen payload in wei
    pub payload_value: Wei,
}

impl BlockDraft {
    /// Merge the consensus half. Fields the fork does not carry are dropped.
    pub fn apply_consensus(&mut self, fields: ConsensusFields) {
        let body = self.body_mut();
        let base = body.phase0_mut();
        base.eth1_data = fields.eth1_data;
        base.deposits = fields.deposits;
        base.attestations = fields.attestations;
        base.proposer_slashings = fields.proposer_slashings;
        base.attester_slashings = fields.attester_slashings;
        base.voluntary_exits = fields.voluntary_exits;
        if let (Some(slot), Some(aggregate)) = (body.sync_aggregate_mut(), fields.sync_aggregate) {
            *slot = aggregate;
        }
        if let Some(changes) = body.bls_to_execution_changes_mut() {
            *changes = fields.bls_to_execution_changes;
        }
    }

    /// Merge the execution half, including blob commitments.
    pub fn apply_execution(&mut self, fields: &ExecutionFields) {
        let body = self.body_mut();
        if let (Some(slot), Some(execution)) = (body.execution_mut(), fields.execution.as_ref()) {
            *slot = execution.clone();
        }
        if let (Some(commitments), Some(blobs)) =
            (body.blob_kzg_commitments_mut(), fields.blobs.as_ref())
        {
            *commitments = blobs.kzg_commitments().to_vec();
        }
    }
}
