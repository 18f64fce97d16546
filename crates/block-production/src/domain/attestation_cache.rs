//! Single-entry attestation data cache.
//!
//! Holds the attestation data of exactly one slot. It is not an LRU: a miss
//! for a different slot overwrites the entry unconditionally. Readers take
//! the shared lock; a miss takes the exclusive lock and re-checks before
//! computing, so a herd of requests for one slot triggers one computation.

use crate::error::Result;
use shared_types::{AttestationData, Checkpoint, CommitteeIndex, Root, Slot};
use std::future::Future;
use tokio::sync::RwLock;

/// Slot-level attestation data; the committee index is per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationCacheEntry {
    /// Slot the data is for
    pub slot: Slot,
    /// Head block root
    pub head_root: Root,
    /// FFG source
    pub source: Checkpoint,
    /// FFG target
    pub target: Checkpoint,
}

impl AttestationCacheEntry {
    /// Response for one committee.
    pub fn to_attestation_data(&self, index: CommitteeIndex) -> AttestationData {
        AttestationData {
            slot: self.slot,
            index,
            beacon_block_root: self.head_root,
            source: self.source,
            target: self.target,
        }
    }
}

/// How a lookup was served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the entry
    Hit,
    /// Computed and stored
    Computed,
}

/// The cache.
#[derive(Debug, Default)]
pub struct AttestationDataCache {
    entry: RwLock<Option<AttestationCacheEntry>>,
}

impl AttestationDataCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `slot`, if cached.
    pub async fn get(&self, slot: Slot) -> Option<AttestationCacheEntry> {
        let guard = self.entry.read().await;
        guard.as_ref().filter(|e| e.slot == slot).cloned()
    }

    /// Entry for `slot`, running `compute` under the exclusive lock on a miss.
    ///
    /// A failed computation leaves the previous entry in place. Dropping the
    /// returned future releases the lock without writing.
    pub async fn get_or_compute<F, Fut>(
        &self,
        slot: Slot,
        compute: F,
    ) -> Result<(AttestationCacheEntry, CacheOutcome)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AttestationCacheEntry>>,
    {
        if let Some(entry) = self.get(slot).await {
            return Ok((entry, CacheOutcome::Hit));
        }

        let mut guard = self.entry.write().await;
        if let Some(entry) = guard.as_ref().filter(|e| e.slot == slot) {
            return Ok((entry.clone(), CacheOutcome::Hit));
        }

        let entry = compute().await?;
        *guard = Some(entry.clone());
        Ok((entry, CacheOutcome::Computed))
    }

    /// Slot of the current entry.
    pub async fn cached_slot(&self) -> Option<Slot> {
        self.entry.read().await.as_ref().map(|e| e.slot)
    }
}
