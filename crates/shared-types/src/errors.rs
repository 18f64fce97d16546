//! # Error Types
//!
//! Errors raised by the state accessors in this crate.

use crate::primitives::{Slot, ValidatorIndex};
use thiserror::Error;

/// Errors from read-only state accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Requested slot is not covered by the `block_roots` ring buffer.
    #[error("slot {slot} is out of range for state at slot {state_slot}")]
    SlotOutOfRange {
        /// Requested slot
        slot: Slot,
        /// Slot of the state
        state_slot: Slot,
    },

    /// State carries no block roots.
    #[error("state has no block roots")]
    EmptyBlockRoots,

    /// Validator index past the end of the registry.
    #[error("unknown validator index {0}")]
    UnknownValidator(ValidatorIndex),
}
