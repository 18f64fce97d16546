//! Builder admission control.
//!
//! Decides per proposal whether the external builder may be asked for a
//! payload. The circuit breaker is recomputed from fork-choice counters on
//! every call and keeps no state of its own.

use crate::error::{BlockProductionError, Result};
use crate::ports::{BuilderClient, ForkChoice};
use shared_types::{ChainSpec, Slot, ValidatorIndex};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// No builder endpoint configured
    NotConfigured,
    /// Builder may be used
    Allowed,
    /// Chain liveness is degraded; builder disabled for this slot
    CircuitOpen,
    /// Validator has not registered with the builder
    NotRegistered,
}

/// Circuit breaker verdict for `slot`.
///
/// Trips when too many consecutive slots lack a block, or when the last
/// epoch of slots missed too many blocks. The epoch check is skipped during
/// the first epoch.
pub fn circuit_breaker_tripped(
    slot: Slot,
    highest_received_slot: Slot,
    received_last_epoch: impl FnOnce() -> Result<u64>,
    spec: &ChainSpec,
) -> Result<bool> {
    let gap = slot.checked_sub(highest_received_slot).ok_or_else(|| {
        BlockProductionError::internal(
            "evaluate circuit breaker",
            format!(
                "slot {} is behind highest received block slot {}",
                slot, highest_received_slot
            ),
        )
    })?;
    if gap >= spec.max_builder_consecutive_missed_slots {
        return Ok(true);
    }

    if slot < spec.slots_per_epoch {
        return Ok(false);
    }
    let received = received_last_epoch()?;
    let missed = spec.slots_per_epoch.saturating_sub(received);
    Ok(missed >= spec.max_builder_epoch_missed_slots)
}

/// Builder admission controller.
pub struct BuilderAdmissionController {
    builder: Arc<dyn BuilderClient>,
    fork_choice: Arc<dyn ForkChoice>,
    spec: ChainSpec,
}

impl BuilderAdmissionController {
    /// Create a controller.
    pub fn new(
        builder: Arc<dyn BuilderClient>,
        fork_choice: Arc<dyn ForkChoice>,
        spec: ChainSpec,
    ) -> Self {
        Self {
            builder,
            fork_choice,
            spec,
        }
    }

    /// Whether `validator_index` may use the builder at `slot`.
    pub async fn can_use_builder(&self, slot: Slot, validator_index: ValidatorIndex) -> Result<Admission> {
        if !self.builder.is_configured() {
            return Ok(Admission::NotConfigured);
        }

        let fork_choice = &self.fork_choice;
        let tripped = circuit_breaker_tripped(
            slot,
            fork_choice.highest_received_block_slot(),
            || {
                fork_choice
                    .received_blocks_last_epoch()
                    .map_err(|e| BlockProductionError::from_port("read received blocks", e))
            },
            &self.spec,
        )?;
        if tripped {
            warn!(slot, "Circuit breaker activated due to missing consecutive slot. Ignore if mev-boost is not used");
            return Ok(Admission::CircuitOpen);
        }

        match self.builder.registration(validator_index).await {
            Ok(_) => Ok(Admission::Allowed),
            Err(e) if e.is_not_registered() => {
                debug!(validator_index, reason = %e, "Validator not registered with builder");
                Ok(Admission::NotRegistered)
            }
            Err(e) => Err(BlockProductionError::internal("read builder registration", e)),
        }
    }
}
