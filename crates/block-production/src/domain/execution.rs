//! Execution payload sourcing: builder bid validation and local-vs-builder
//! selection.
//!
//! Everything here is pure. The service fetches the local payload and the
//! bid, then asks [`select_payload`] which one goes into the block.

use crate::config::DEFAULT_BUILDER_BOOST_FACTOR;
use crate::domain::assembly::{BlobsData, ExecutionFields};
use crate::domain::block::ExecutionField;
use crate::domain::fork::ForkName;
use serde::{Deserialize, Serialize};
use shared_types::{
    empty_transactions_root, wei_to_gwei, BlindedBlobsBundle, BlobsBundle, BlsPublicKey,
    BlsSignature, ExecutionPayload, ExecutionPayloadHeader, Gwei, Hash32, Wei,
};
use thiserror::Error;

/// Payload built by the local execution engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalPayload {
    /// Payload
    pub payload: ExecutionPayload,
    /// Block value in wei
    pub value: Wei,
    /// Blobs, Deneb onward
    pub blobs_bundle: Option<BlobsBundle>,
    /// Engine asks the proposer not to use a builder
    pub should_override_builder: bool,
}

/// Builder offer for the right to supply the payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderBid {
    /// Committed payload header
    pub header: ExecutionPayloadHeader,
    /// Blob commitments and roots, Deneb onward
    pub blinded_blobs_bundle: Option<BlindedBlobsBundle>,
    /// Bid value in wei
    pub value: Wei,
    /// Builder key
    pub pubkey: BlsPublicKey,
    /// Fork the bid was built for
    pub version: Option<ForkName>,
}

/// Signed builder bid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBuilderBid {
    /// Bid
    pub message: BuilderBid,
    /// Builder signature
    pub signature: BlsSignature,
}

/// What a bid must match to be usable for this proposal.
#[derive(Clone, Debug)]
pub struct BidExpectations {
    /// Proposal fork
    pub fork: ForkName,
    /// Head execution block hash
    pub parent_hash: Hash32,
    /// Registered gas limit, if the registration could be read
    pub gas_limit: Option<u64>,
    /// Slot start time in seconds
    pub timestamp: u64,
    /// Blob commitment limit
    pub max_blobs: u64,
}

/// Reasons a builder bid is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BidError {
    /// Bid built for another fork
    #[error("builder bid version {actual:?} does not match fork {expected}")]
    VersionMismatch {
        /// Proposal fork
        expected: ForkName,
        /// Bid fork
        actual: Option<ForkName>,
    },

    /// Bid worth nothing
    #[error("builder returned header with 0 bid amount")]
    ZeroValue,

    /// Empty payload
    #[error("builder returned header with an empty tx root")]
    EmptyTransactions,

    /// Built on the wrong parent
    #[error("incorrect parent hash {actual:?} != {expected:?}")]
    ParentHashMismatch {
        /// Head execution hash
        expected: Hash32,
        /// Bid parent hash
        actual: Hash32,
    },

    /// Gas limit differs from the registration
    #[error("incorrect header gas limit {actual} != {expected}")]
    GasLimitMismatch {
        /// Registered gas limit
        expected: u64,
        /// Bid gas limit
        actual: u64,
    },

    /// Timestamp differs from the slot start
    #[error("incorrect timestamp {actual} != {expected}")]
    TimestampMismatch {
        /// Slot start time
        expected: u64,
        /// Bid timestamp
        actual: u64,
    },

    /// More commitments than a block may carry
    #[error("builder returned {count} blob commitments, limit is {max}")]
    TooManyBlobs {
        /// Commitments in the bid
        count: usize,
        /// Protocol maximum
        max: u64,
    },
}

/// Check a bid against the proposal it would fill.
pub fn validate_bid(bid: &BuilderBid, expected: &BidExpectations) -> Result<(), BidError> {
    if bid.version != Some(expected.fork) {
        return Err(BidError::VersionMismatch {
            expected: expected.fork,
            actual: bid.version,
        });
    }
    if bid.value.is_zero() {
        return Err(BidError::ZeroValue);
    }
    if bid.header.transactions_root == empty_transactions_root() {
        return Err(BidError::EmptyTransactions);
    }
    if bid.header.parent_hash != expected.parent_hash {
        return Err(BidError::ParentHashMismatch {
            expected: expected.parent_hash,
            actual: bid.header.parent_hash,
        });
    }
    if let Some(gas_limit) = expected.gas_limit {
        if bid.header.gas_limit != gas_limit {
            return Err(BidError::GasLimitMismatch {
                expected: gas_limit,
                actual: bid.header.gas_limit,
            });
        }
    }
    if bid.header.timestamp != expected.timestamp {
        return Err(BidError::TimestampMismatch {
            expected: expected.timestamp,
            actual: bid.header.timestamp,
        });
    }
    if let Some(bundle) = &bid.blinded_blobs_bundle {
        if bundle.kzg_commitments.len() as u64 > expected.max_blobs {
            return Err(BidError::TooManyBlobs {
                count: bundle.kzg_commitments.len(),
                max: expected.max_blobs,
            });
        }
    }
    Ok(())
}

/// Knobs for comparing a bid with the local payload.
#[derive(Clone, Copy, Debug)]
pub struct SelectionPolicy {
    /// Percent added to the local value
    pub local_block_value_boost: u64,
    /// Minimum bid in gwei
    pub min_bid_gwei: Gwei,
    /// Minimum margin over local in gwei
    pub min_bid_difference_gwei: Gwei,
    /// Percent multiplier on the bid; 100 compares at face value
    pub builder_boost_factor: u64,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            local_block_value_boost: 0,
            min_bid_gwei: 0,
            min_bid_difference_gwei: 0,
            builder_boost_factor: DEFAULT_BUILDER_BOOST_FACTOR,
        }
    }
}

/// Which source fills the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadSource {
    /// Local engine payload
    Local,
    /// Builder header (blinded block)
    Builder,
}

/// Outcome of [`select_payload`], with the values compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Winning source
    pub source: PayloadSource,
    /// Why the local payload was kept, if it was
    pub reason: Option<&'static str>,
    /// Builder value in gwei (0 without a bid)
    pub builder_gwei: Gwei,
    /// Local value in gwei
    pub local_gwei: Gwei,
}

/// Choose between the local payload and a validated bid.
pub fn select_payload(
    fork: ForkName,
    local: &LocalPayload,
    bid: Option<&BuilderBid>,
    policy: &SelectionPolicy,
) -> Selection {
    let local_gwei = wei_to_gwei(local.value);
    let keep_local = |reason, builder_gwei| Selection {
        source: PayloadSource::Local,
        reason: Some(reason),
        builder_gwei,
        local_gwei,
    };

    let Some(bid) = bid else {
        return keep_local("no builder bid", 0);
    };
    let builder_gwei = wei_to_gwei(bid.value);

    if fork.has_withdrawals() {
        let local_root = local.payload.to_header().withdrawals_root;
        if bid.header.withdrawals_root != local_root {
            return keep_local("withdrawals root mismatch", builder_gwei);
        }
        if builder_gwei < policy.min_bid_gwei {
            return keep_local("bid below minimum", builder_gwei);
        }
        if builder_gwei < local_gwei.saturating_add(policy.min_bid_difference_gwei) {
            return keep_local("bid margin below minimum difference", builder_gwei);
        }
        let boosted_builder = builder_gwei as u128 * policy.builder_boost_factor as u128;
        let boosted_local = local_gwei as u128 * (100 + policy.local_block_value_boost as u128);
        if boosted_builder <= boosted_local {
            return keep_local("local payload value higher", builder_gwei);
        }
    }

    Selection {
        source: PayloadSource::Builder,
        reason: None,
        builder_gwei,
        local_gwei,
    }
}

impl ExecutionFields {
    /// Execution half from the local payload.
    pub fn from_local(fork: ForkName, local: LocalPayload) -> Self {
        let blobs = if fork.has_blobs() {
            Some(BlobsData::Full(local.blobs_bundle.unwrap_or_default()))
        } else {
            None
        };
        Self {
            execution: Some(ExecutionField::Full(local.payload)),
            blobs,
            payload_value: local.value,
        }
    }

    /// Execution half from a builder bid.
    pub fn from_bid(fork: ForkName, bid: BuilderBid) -> Self {
        let blobs = if fork.has_blobs() {
            Some(BlobsData::Blinded(bid.blinded_blobs_bundle.unwrap_or_default()))
        } else {
            None
        };
        Self {
            execution: Some(ExecutionField::Blinded(bid.header)),
            blobs,
            payload_value: bid.value,
        }
    }
}
