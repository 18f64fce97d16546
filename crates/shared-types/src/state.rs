//! # Beacon State View
//!
//! The subset of the beacon state that block production reads. The state
//! transition itself lives behind the `StateTransition` port of the
//! block-production crate; this type is a plain value that can be cloned
//! into concurrent tasks.

use crate::chain_spec::ChainSpec;
use crate::entities::{Checkpoint, Eth1Data, SyncCommittee, ValidatorRecord};
use crate::errors::StateError;
use crate::primitives::{Epoch, Hash32, Root, Slot, ValidatorIndex};
use serde::{Deserialize, Serialize};

/// Read-only beacon state view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconState {
    /// Beacon chain genesis time (unix seconds)
    pub genesis_time: u64,
    /// State slot
    pub slot: Slot,
    /// Ring buffer of recent block roots, indexed by `slot % len`
    pub block_roots: Vec<Root>,
    /// Accepted eth1 data
    pub eth1_data: Eth1Data,
    /// Index of the next deposit to process
    pub eth1_deposit_index: u64,
    /// Current justified checkpoint
    pub current_justified_checkpoint: Checkpoint,
    /// Finalized checkpoint
    pub finalized_checkpoint: Checkpoint,
    /// Validator registry
    pub validators: Vec<ValidatorRecord>,
    /// Sync committee of the current period (Altair onward)
    pub current_sync_committee: Option<SyncCommittee>,
    /// Sync committee of the next period (Altair onward)
    pub next_sync_committee: Option<SyncCommittee>,
    /// Block hash of the latest execution payload (zero before the merge)
    pub latest_execution_block_hash: Hash32,
}

impl BeaconState {
    /// Epoch of the state slot.
    pub fn current_epoch(&self, spec: &ChainSpec) -> Epoch {
        spec.epoch_at_slot(self.slot)
    }

    /// Block root recorded for `slot`.
    ///
    /// Valid only for `slot < self.slot <= slot + block_roots.len()`.
    pub fn block_root_at_slot(&self, slot: Slot) -> Result<Root, StateError> {
        let len = self.block_roots.len() as u64;
        if len == 0 {
            return Err(StateError::EmptyBlockRoots);
        }
        if slot >= self.slot || self.slot > slot.saturating_add(len) {
            return Err(StateError::SlotOutOfRange {
                slot,
                state_slot: self.slot,
            });
        }
        Ok(self.block_roots[(slot % len) as usize])
    }

    /// Record `root` for `slot` in the ring buffer.
    pub fn set_block_root(&mut self, slot: Slot, root: Root) -> Result<(), StateError> {
        let len = self.block_roots.len() as u64;
        if len == 0 {
            return Err(StateError::EmptyBlockRoots);
        }
        self.block_roots[(slot % len) as usize] = root;
        Ok(())
    }

    /// Registry entry for `index`.
    pub fn validator(&self, index: ValidatorIndex) -> Result<&ValidatorRecord, StateError> {
        self.validators
            .get(index as usize)
            .ok_or(StateError::UnknownValidator(index))
    }
}
