//! Outbound events (published)

use serde::{Deserialize, Serialize};
use shared_types::{Root, Slot, ValidatorIndex};

/// Event: A block proposed through this node was imported
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReceivedEvent {
    /// Block root
    pub block_root: Root,

    /// Block slot
    pub slot: Slot,

    /// Proposer index
    pub proposer_index: ValidatorIndex,

    /// Whether the block was submitted blinded
    pub was_blinded: bool,

    /// Blob sidecars broadcast with the block
    pub blob_count: usize,

    /// Event timestamp (unix milliseconds)
    pub timestamp_ms: u64,
}
