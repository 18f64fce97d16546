//! GetAttestationData behind the single-entry cache.

use super::{cancellable, ProposerService};
use crate::domain::{AttestationCacheEntry, CacheOutcome};
use crate::error::{BlockProductionError, Result};
use shared_types::{AttestationData, Checkpoint, CommitteeIndex, Slot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

impl ProposerService {
    pub(super) async fn attestation_data(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
        cancel: &CancellationToken,
    ) -> Result<AttestationData> {
        if self.sync.is_syncing() {
            return Err(BlockProductionError::Syncing);
        }
        self.validate_attestation_time(slot)?;

        let (entry, outcome) = cancellable(
            cancel,
            "get attestation data",
            self.attestation_cache
                .get_or_compute(slot, || self.compute_attestation_entry(slot)),
        )
        .await??;

        match outcome {
            CacheOutcome::Hit => self.metrics.record_attestation_cache_hit(),
            CacheOutcome::Computed => {
                self.metrics.record_attestation_data_computed();
                debug!(
                    slot,
                    head_root = ?entry.head_root,
                    target_epoch = entry.target.epoch,
                    "Computed attestation data"
                );
            }
        }
        Ok(entry.to_attestation_data(committee_index))
    }

    /// Reject slots outside the current slot, allowing for clock disparity.
    fn validate_attestation_time(&self, slot: Slot) -> Result<()> {
        let disparity = self.spec.maximum_gossip_clock_disparity_ms;
        let slot_start = self
            .spec
            .slot_start_time(self.chain.genesis_time(), slot)
            .saturating_mul(1000);
        let slot_end = slot_start.saturating_add(self.spec.seconds_per_slot.saturating_mul(1000));
        let now = self.now_ms();

        if now.saturating_add(disparity) < slot_start {
            return Err(BlockProductionError::InvalidRequest(format!(
                "slot {slot} is in the future"
            )));
        }
        if now >= slot_end.saturating_add(disparity) {
            return Err(BlockProductionError::InvalidRequest(format!(
                "slot {slot} is not the current slot"
            )));
        }
        Ok(())
    }

    async fn compute_attestation_entry(&self, slot: Slot) -> Result<AttestationCacheEntry> {
        let optimistic = self
            .chain
            .is_optimistic()
            .await
            .map_err(|e| BlockProductionError::from_port("check optimistic status", e))?;
        if optimistic {
            return Err(BlockProductionError::Optimistic);
        }

        let mut head_root = self
            .chain
            .head_root()
            .await
            .map_err(|e| BlockProductionError::from_port("get head root", e))?;
        let mut state = self
            .chain
            .head_state()
            .await
            .map_err(|e| BlockProductionError::from_port("get head state", e))?;

        // Head is ahead of the requested slot: attest to the block at `slot`.
        if state.slot > slot {
            head_root = state.block_root_at_slot(slot)?;
            state = self
                .chain
                .state_by_root(head_root)
                .await
                .map_err(|e| BlockProductionError::from_port("get historical head state", e))?;
        }

        let epoch = self.spec.epoch_at_slot(slot);
        if state.current_epoch(&self.spec) < epoch {
            state = match self.transition.cached_next_slot_state(head_root, slot).await {
                Some(advanced) => advanced,
                None => self
                    .transition
                    .process_slots(state, slot)
                    .await
                    .map_err(|e| BlockProductionError::from_port("process slots", e))?,
            };
        }

        let target_epoch = state.current_epoch(&self.spec);
        let epoch_start = self.spec.epoch_start_slot(target_epoch);
        let target_root = if epoch_start == state.slot {
            head_root
        } else {
            let root = state.block_root_at_slot(epoch_start)?;
            if root.is_zero() {
                head_root
            } else {
                root
            }
        };

        Ok(AttestationCacheEntry {
            slot,
            head_root,
            source: state.current_justified_checkpoint,
            target: Checkpoint {
                epoch: target_epoch,
                root: target_root,
            },
        })
    }
}
