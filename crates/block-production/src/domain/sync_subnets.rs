//! Sync committee subnet registry.
//!
//! Tracks which sync subnets each validator key must stay subscribed to for
//! a committee period. Entries are evicted by expiry only.

use parking_lot::Mutex;
use shared_types::{BlsPublicKey, ChainSpec, Epoch, SyncCommittee, ValidatorStatus};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// A stored subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetSubscription {
    /// Validator key
    pub pubkey: BlsPublicKey,
    /// First epoch of the committee period
    pub period_start_epoch: Epoch,
    /// Subnet indices, ascending, without duplicates
    pub subnets: Vec<u64>,
    /// Unix milliseconds after which the entry is stale
    pub expires_at_ms: u64,
}

/// Input to [`SyncSubnetRegistry::register`].
#[derive(Clone, Debug)]
pub struct SyncSubnetRegistration {
    /// Current epoch
    pub current_epoch: Epoch,
    /// Committee period being registered
    pub period: u64,
    /// Validator key
    pub pubkey: BlsPublicKey,
    /// Committee of that period
    pub committee: SyncCommittee,
    /// Validator status
    pub status: ValidatorStatus,
}

/// What a registration did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Validator is neither active nor exiting
    Inactive,
    /// An unexpired entry already covers the period
    AlreadySubscribed,
    /// Future period, too early to subscribe
    Deferred,
    /// Entry stored
    Registered(SubnetSubscription),
}

/// Subnets for every committee position held by `pubkey`.
pub fn subnets_from_committee(
    pubkey: &BlsPublicKey,
    committee: &SyncCommittee,
    spec: &ChainSpec,
) -> Vec<u64> {
    let subcommittee_size = spec.sync_subcommittee_size();
    committee
        .pubkeys
        .iter()
        .enumerate()
        .filter(|(_, key)| *key == pubkey)
        .map(|(position, _)| position as u64 / subcommittee_size)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Subnet subscriptions keyed by `(pubkey, period start epoch)`.
#[derive(Debug)]
pub struct SyncSubnetRegistry {
    spec: ChainSpec,
    subscriptions: Mutex<HashMap<(BlsPublicKey, Epoch), SubnetSubscription>>,
}

impl SyncSubnetRegistry {
    /// Empty registry.
    pub fn new(spec: ChainSpec) -> Self {
        Self {
            spec,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Register the subnets `pubkey` occupies in `registration.committee`.
    ///
    /// The expiry check and the write happen under one lock, so concurrent
    /// registrations for one key never overwrite a live entry.
    pub fn register(&self, registration: &SyncSubnetRegistration, now_ms: u64) -> RegistrationOutcome {
        if !registration.status.is_active_or_exiting() {
            return RegistrationOutcome::Inactive;
        }

        let period_len = self.spec.epochs_per_sync_committee_period;
        let start_epoch = registration.period.saturating_mul(period_len);
        let end_epoch = start_epoch.saturating_add(period_len);
        let current_period = self.spec.sync_committee_period(registration.current_epoch);

        let mut subscriptions = self.subscriptions.lock();
        let key = (registration.pubkey, start_epoch);
        if let Some(existing) = subscriptions.get(&key) {
            if existing.expires_at_ms > now_ms {
                return RegistrationOutcome::AlreadySubscribed;
            }
        }

        let first_valid_epoch = start_epoch.saturating_sub(self.spec.sync_committee_subnet_count);
        if registration.period != current_period && registration.current_epoch < first_valid_epoch {
            return RegistrationOutcome::Deferred;
        }

        let subnets = subnets_from_committee(&registration.pubkey, &registration.committee, &self.spec);
        let remaining_epochs = end_epoch.saturating_sub(registration.current_epoch);
        let subscription = SubnetSubscription {
            pubkey: registration.pubkey,
            period_start_epoch: start_epoch,
            subnets,
            expires_at_ms: now_ms
                .saturating_add(remaining_epochs.saturating_mul(self.spec.epoch_duration_ms())),
        };
        debug!(
            pubkey = %registration.pubkey.short_hex(),
            start_epoch,
            subnets = ?subscription.subnets,
            "Registered sync committee subnets"
        );
        subscriptions.insert(key, subscription.clone());
        RegistrationOutcome::Registered(subscription)
    }

    /// Store a subscription unconditionally.
    pub fn insert(&self, subscription: SubnetSubscription) {
        self.subscriptions
            .lock()
            .insert((subscription.pubkey, subscription.period_start_epoch), subscription);
    }

    /// Subscription for `(pubkey, start_epoch)`, expired or not.
    pub fn subnets_for(&self, pubkey: &BlsPublicKey, start_epoch: Epoch) -> Option<SubnetSubscription> {
        self.subscriptions.lock().get(&(*pubkey, start_epoch)).cloned()
    }

    /// Union of subnets over unexpired subscriptions.
    pub fn active_subnets(&self, now_ms: u64) -> BTreeSet<u64> {
        self.subscriptions
            .lock()
            .values()
            .filter(|s| s.expires_at_ms > now_ms)
            .flat_map(|s| s.subnets.iter().copied())
            .collect()
    }

    /// Drop expired subscriptions, returning how many were removed.
    pub fn prune_expired(&self, now_ms: u64) -> usize {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|_, s| s.expires_at_ms > now_ms);
        before - subscriptions.len()
    }

    /// Number of stored subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
