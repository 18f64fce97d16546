//! Sync committee subnet registration and batch subscriptions.

use super::ProposerService;
use crate::domain::{RegistrationOutcome, SubnetSubscription, SyncSubnetRegistration};
use crate::error::{BlockProductionError, Result};
use crate::ports::SyncCommitteeSubscription;
use shared_types::BlsPublicKey;
use std::collections::BTreeSet;
use tracing::{debug, info};

impl ProposerService {
    pub(super) fn register_subnets(&self, registration: &SyncSubnetRegistration) -> RegistrationOutcome {
        let outcome = self.sync_subnets.register(registration, self.now_ms());
        if matches!(outcome, RegistrationOutcome::Registered(_)) {
            self.metrics.record_sync_subnet_registration();
        }
        outcome
    }

    /// Validate the whole batch first; nothing is stored if any entry fails.
    pub(super) async fn submit_subscriptions(
        &self,
        subscriptions: Vec<SyncCommitteeSubscription>,
    ) -> Result<()> {
        if self.sync.is_syncing() {
            return Err(BlockProductionError::Syncing);
        }
        if subscriptions.is_empty() {
            return Err(BlockProductionError::InvalidRequest(
                "no sync committee subscriptions provided".into(),
            ));
        }

        let state = self
            .chain
            .head_state()
            .await
            .map_err(|e| BlockProductionError::from_port("get head state", e))?;

        let period_len = self.spec.epochs_per_sync_committee_period;
        let current_epoch = self.spec.epoch_at_slot(self.current_slot());
        let start_epoch = self.spec.sync_committee_period(current_epoch) * period_len;
        let last_allowed = start_epoch.saturating_add(period_len.saturating_mul(2));

        let mut accepted: Vec<(BlsPublicKey, &SyncCommitteeSubscription)> =
            Vec::with_capacity(subscriptions.len());
        for sub in &subscriptions {
            let validator = state.validator(sub.validator_index).map_err(|_| {
                BlockProductionError::InvalidRequest(format!(
                    "could not find validator {}",
                    sub.validator_index
                ))
            })?;
            if !validator.status.is_active_or_exiting() {
                return Err(BlockProductionError::InvalidRequest(format!(
                    "validator {} is not active",
                    sub.validator_index
                )));
            }
            if sub.until_epoch <= current_epoch {
                return Err(BlockProductionError::InvalidRequest(format!(
                    "epoch {} for validator {} is in the past",
                    sub.until_epoch, sub.validator_index
                )));
            }
            if sub.until_epoch > last_allowed {
                return Err(BlockProductionError::InvalidRequest(format!(
                    "epoch {} for validator {} is beyond the next sync committee period",
                    sub.until_epoch, sub.validator_index
                )));
            }
            accepted.push((validator.pubkey, sub));
        }

        let now = self.now_ms();
        let subcommittee_size = self.spec.sync_subcommittee_size().max(1);
        for (pubkey, sub) in accepted {
            let subnets: Vec<u64> = sub
                .sync_committee_indices
                .iter()
                .map(|index| index / subcommittee_size)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let lifetime_ms = (sub.until_epoch - start_epoch).saturating_mul(self.spec.epoch_duration_ms());
            debug!(
                validator_index = sub.validator_index,
                subnets = ?subnets,
                until_epoch = sub.until_epoch,
                "Subscribing to sync committee subnets"
            );
            self.sync_subnets.insert(SubnetSubscription {
                pubkey,
                period_start_epoch: start_epoch,
                subnets,
                expires_at_ms: now.saturating_add(lifetime_ms),
            });
        }

        info!(count = subscriptions.len(), start_epoch, "Accepted sync committee subscriptions");
        Ok(())
    }
}
