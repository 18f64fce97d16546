//! # Consensus Containers
//!
//! Block operations, execution payloads and blob containers exchanged between
//! the beacon node, the execution engine and the builder network.
//!
//! Fields added by later forks are `Option`s on the shared execution types so
//! one payload type can serve Bellatrix, Capella and Deneb.

use crate::primitives::{
    hash, hash_concat, Blob, BlsPublicKey, BlsSignature, CommitteeIndex, Epoch,
    ExecutionAddress, Gwei, Hash32, KzgCommitment, KzgProof, Root, Slot, ValidatorIndex,
};
use primitive_types::{H256, U256};
use serde::{Deserialize, Serialize};

// =============================================================================
// ETH1 / CHECKPOINTS
// =============================================================================

/// Reference to the deposit contract state on the execution chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Eth1Data {
    /// Root of the deposit Merkle tree
    pub deposit_root: Root,
    /// Number of deposits observed
    pub deposit_count: u64,
    /// Execution block the data was read at
    pub block_hash: Hash32,
}

/// Epoch boundary checkpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint epoch
    pub epoch: Epoch,
    /// Block root at the epoch boundary
    pub root: Root,
}

/// Data an attester signs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttestationData {
    /// Attested slot
    pub slot: Slot,
    /// Committee index
    pub index: CommitteeIndex,
    /// LMD GHOST vote
    pub beacon_block_root: Root,
    /// FFG source
    pub source: Checkpoint,
    /// FFG target
    pub target: Checkpoint,
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Aggregated attestation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Bitfield of participating committee members
    pub aggregation_bits: Vec<u8>,
    /// Attested data
    pub data: AttestationData,
    /// Aggregate signature
    pub signature: BlsSignature,
}

/// Attestation with explicit attesting indices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedAttestation {
    /// Sorted validator indices
    pub attesting_indices: Vec<ValidatorIndex>,
    /// Attested data
    pub data: AttestationData,
    /// Aggregate signature
    pub signature: BlsSignature,
}

/// Two conflicting attestations by overlapping validators.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttesterSlashing {
    /// First attestation
    pub attestation_1: IndexedAttestation,
    /// Second attestation
    pub attestation_2: IndexedAttestation,
}

/// Beacon block header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlockHeader {
    /// Block slot
    pub slot: Slot,
    /// Proposer index
    pub proposer_index: ValidatorIndex,
    /// Parent block root
    pub parent_root: Root,
    /// Post-state root
    pub state_root: Root,
    /// Body root
    pub body_root: Root,
}

/// Signed beacon block header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBeaconBlockHeader {
    /// Header
    pub message: BeaconBlockHeader,
    /// Proposer signature
    pub signature: BlsSignature,
}

/// Two conflicting headers by the same proposer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposerSlashing {
    /// First header
    pub signed_header_1: SignedBeaconBlockHeader,
    /// Second header
    pub signed_header_2: SignedBeaconBlockHeader,
}

/// Deposit data as emitted by the deposit contract.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositData {
    /// Validator public key
    pub pubkey: BlsPublicKey,
    /// Withdrawal credentials
    pub withdrawal_credentials: H256,
    /// Deposit amount
    pub amount: Gwei,
    /// Proof of possession
    pub signature: BlsSignature,
}

/// Deposit with its Merkle branch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Branch against the deposit root
    pub proof: Vec<H256>,
    /// Deposit data
    pub data: DepositData,
}

/// Voluntary exit message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoluntaryExit {
    /// Earliest epoch the exit is valid
    pub epoch: Epoch,
    /// Exiting validator
    pub validator_index: ValidatorIndex,
}

/// Signed voluntary exit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedVoluntaryExit {
    /// Exit
    pub message: VoluntaryExit,
    /// Validator signature
    pub signature: BlsSignature,
}

/// Sync committee participation for the previous slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAggregate {
    /// One bit per sync committee member
    pub sync_committee_bits: Vec<u8>,
    /// Aggregate signature
    pub sync_committee_signature: BlsSignature,
}

impl SyncAggregate {
    /// Aggregate with no participants and the infinity signature.
    pub fn empty(sync_committee_size: u64) -> Self {
        let bytes = sync_committee_size.div_ceil(8) as usize;
        Self {
            sync_committee_bits: vec![0u8; bytes],
            sync_committee_signature: BlsSignature::infinity(),
        }
    }
}

/// Request to switch withdrawal credentials to an execution address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsToExecutionChange {
    /// Validator index
    pub validator_index: ValidatorIndex,
    /// Current BLS withdrawal key
    pub from_bls_pubkey: BlsPublicKey,
    /// New execution address
    pub to_execution_address: ExecutionAddress,
}

/// Signed withdrawal credential change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlsToExecutionChange {
    /// Change
    pub message: BlsToExecutionChange,
    /// Signature by the BLS withdrawal key
    pub signature: BlsSignature,
}

// =============================================================================
// EXECUTION
// =============================================================================

/// Withdrawal processed by the execution layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Global withdrawal index
    pub index: u64,
    /// Validator index
    pub validator_index: ValidatorIndex,
    /// Recipient
    pub address: ExecutionAddress,
    /// Amount
    pub amount: Gwei,
}

/// Full execution payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayload {
    /// Parent execution block hash
    pub parent_hash: Hash32,
    /// Fee recipient
    pub fee_recipient: ExecutionAddress,
    /// Execution state root
    pub state_root: H256,
    /// Receipts root
    pub receipts_root: H256,
    /// Logs bloom
    pub logs_bloom: Vec<u8>,
    /// RANDAO mix
    pub prev_randao: H256,
    /// Block number
    pub block_number: u64,
    /// Gas limit
    pub gas_limit: u64,
    /// Gas used
    pub gas_used: u64,
    /// Timestamp
    pub timestamp: u64,
    /// Extra data
    pub extra_data: Vec<u8>,
    /// Base fee
    pub base_fee_per_gas: U256,
    /// Execution block hash
    pub block_hash: Hash32,
    /// Opaque transactions
    pub transactions: Vec<Vec<u8>>,
    /// Withdrawals (Capella onward)
    pub withdrawals: Option<Vec<Withdrawal>>,
    /// Blob gas used (Deneb onward)
    pub blob_gas_used: Option<u64>,
    /// Excess blob gas (Deneb onward)
    pub excess_blob_gas: Option<u64>,
}

impl ExecutionPayload {
    /// Header committing to this payload.
    pub fn to_header(&self) -> ExecutionPayloadHeader {
        ExecutionPayloadHeader {
            parent_hash: self.parent_hash,
            fee_recipient: self.fee_recipient,
            state_root: self.state_root,
            receipts_root: self.receipts_root,
            logs_bloom: self.logs_bloom.clone(),
            prev_randao: self.prev_randao,
            block_number: self.block_number,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            base_fee_per_gas: self.base_fee_per_gas,
            block_hash: self.block_hash,
            transactions_root: transactions_root(&self.transactions),
            withdrawals_root: self.withdrawals.as_deref().map(withdrawals_root),
            blob_gas_used: self.blob_gas_used,
            excess_blob_gas: self.excess_blob_gas,
        }
    }
}

/// Execution payload with transactions and withdrawals replaced by roots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayloadHeader {
    /// Parent execution block hash
    pub parent_hash: Hash32,
    /// Fee recipient
    pub fee_recipient: ExecutionAddress,
    /// Execution state root
    pub state_root: H256,
    /// Receipts root
    pub receipts_root: H256,
    /// Logs bloom
    pub logs_bloom: Vec<u8>,
    /// RANDAO mix
    pub prev_randao: H256,
    /// Block number
    pub block_number: u64,
    /// Gas limit
    pub gas_limit: u64,
    /// Gas used
    pub gas_used: u64,
    /// Timestamp
    pub timestamp: u64,
    /// Extra data
    pub extra_data: Vec<u8>,
    /// Base fee
    pub base_fee_per_gas: U256,
    /// Execution block hash
    pub block_hash: Hash32,
    /// Root of the transaction list
    pub transactions_root: Root,
    /// Root of the withdrawal list (Capella onward)
    pub withdrawals_root: Option<Root>,
    /// Blob gas used (Deneb onward)
    pub blob_gas_used: Option<u64>,
    /// Excess blob gas (Deneb onward)
    pub excess_blob_gas: Option<u64>,
}

/// Root of a transaction list: a hash chain over the per-transaction hashes.
pub fn transactions_root(transactions: &[Vec<u8>]) -> Root {
    transactions
        .iter()
        .fold(hash(b"transactions"), |acc, tx| {
            hash_concat(acc.as_bytes(), hash(tx).as_bytes())
        })
}

/// Root of the empty transaction list.
pub fn empty_transactions_root() -> Root {
    transactions_root(&[])
}

/// Root of a withdrawal list.
pub fn withdrawals_root(withdrawals: &[Withdrawal]) -> Root {
    withdrawals.iter().fold(hash(b"withdrawals"), |acc, w| {
        let mut leaf = Vec::with_capacity(8 + 8 + 20 + 8);
        leaf.extend_from_slice(&w.index.to_le_bytes());
        leaf.extend_from_slice(&w.validator_index.to_le_bytes());
        leaf.extend_from_slice(w.address.as_bytes());
        leaf.extend_from_slice(&w.amount.to_le_bytes());
        hash_concat(acc.as_bytes(), hash(&leaf).as_bytes())
    })
}

// =============================================================================
// BLOBS
// =============================================================================

/// Blobs with their commitments and proofs, index-aligned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobsBundle {
    /// Commitments
    pub kzg_commitments: Vec<KzgCommitment>,
    /// Proofs
    pub proofs: Vec<KzgProof>,
    /// Blobs
    pub blobs: Vec<Blob>,
}

/// Builder-side bundle carrying blob roots instead of blobs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedBlobsBundle {
    /// Commitments
    pub kzg_commitments: Vec<KzgCommitment>,
    /// Proofs
    pub proofs: Vec<KzgProof>,
    /// Roots of the withheld blobs
    pub blob_roots: Vec<Root>,
}

/// Root of a single blob.
pub fn blob_root(blob: &[u8]) -> Root {
    hash(blob)
}

/// Blob paired with its block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobSidecar {
    /// Root of the block carrying the commitment
    pub block_root: Root,
    /// Position of the commitment in the block
    pub index: u64,
    /// Block slot
    pub slot: Slot,
    /// Parent of the block
    pub block_parent_root: Root,
    /// Block proposer
    pub proposer_index: ValidatorIndex,
    /// Blob data
    pub blob: Blob,
    /// Commitment
    pub kzg_commitment: KzgCommitment,
    /// Proof
    pub kzg_proof: KzgProof,
}

/// Sidecar for a blinded block: the blob is referenced by root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedBlobSidecar {
    /// Root of the block carrying the commitment
    pub block_root: Root,
    /// Position of the commitment in the block
    pub index: u64,
    /// Block slot
    pub slot: Slot,
    /// Parent of the block
    pub block_parent_root: Root,
    /// Block proposer
    pub proposer_index: ValidatorIndex,
    /// Root of the withheld blob
    pub blob_root: Root,
    /// Commitment
    pub kzg_commitment: KzgCommitment,
    /// Proof
    pub kzg_proof: KzgProof,
}

impl BlindedBlobSidecar {
    /// Fill in the blob, yielding a full sidecar.
    pub fn into_full(self, blob: Blob) -> BlobSidecar {
        BlobSidecar {
            block_root: self.block_root,
            index: self.index,
            slot: self.slot,
            block_parent_root: self.block_parent_root,
            proposer_index: self.proposer_index,
            blob,
            kzg_commitment: self.kzg_commitment,
            kzg_proof: self.kzg_proof,
        }
    }
}

/// Proposer-signed blob sidecar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlobSidecar {
    /// Sidecar
    pub message: BlobSidecar,
    /// Proposer signature
    pub signature: BlsSignature,
}

/// Proposer-signed blinded blob sidecar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlindedBlobSidecar {
    /// Sidecar
    pub message: BlindedBlobSidecar,
    /// Proposer signature
    pub signature: BlsSignature,
}

// =============================================================================
// VALIDATORS / SYNC COMMITTEE
// =============================================================================

/// Coarse validator status as reported to validator clients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    /// Not known to the beacon chain
    #[default]
    Unknown,
    /// Deposit seen, not yet processed
    Deposited,
    /// Waiting in the activation queue
    Pending,
    /// Active
    Active,
    /// Active with an exit scheduled
    Exiting,
    /// Slashed and awaiting exit
    Slashing,
    /// Exited
    Exited,
}

impl ValidatorStatus {
    /// Whether the validator is expected to perform sync committee duties.
    pub fn is_active_or_exiting(self) -> bool {
        matches!(self, Self::Active | Self::Exiting)
    }
}

/// Registry entry visible to this node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    /// Public key
    pub pubkey: BlsPublicKey,
    /// Current status
    pub status: ValidatorStatus,
}

/// Sync committee for one period.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommittee {
    /// Member keys in committee order; duplicates allowed
    pub pubkeys: Vec<BlsPublicKey>,
    /// Aggregate key
    pub aggregate_pubkey: BlsPublicKey,
}

/// Validator registration with the builder network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRegistration {
    /// Fee recipient
    pub fee_recipient: ExecutionAddress,
    /// Preferred gas limit
    pub gas_limit: u64,
    /// Registration timestamp
    pub timestamp: u64,
    /// Validator key
    pub pubkey: BlsPublicKey,
}
