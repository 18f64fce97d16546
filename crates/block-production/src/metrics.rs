//! Metrics collection for block production subsystem
//!
//! Counters are kept per service instance and mirrored into the
//! process-wide Prometheus collectors of `beacon-telemetry`.

use beacon_telemetry::metrics as prom;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for block production
#[derive(Debug, Default)]
pub struct Metrics {
    /// Blocks produced for validator clients
    pub blocks_produced: AtomicU64,

    /// Signed blocks accepted, broadcast and imported
    pub blocks_proposed: AtomicU64,

    /// Builder header requests that failed or were rejected
    pub builder_get_payload_misses: AtomicU64,

    /// Proposals where the cached head differed from the proposer head
    pub late_block_reorg_attempts: AtomicU64,

    /// Proposals that found the builder circuit breaker open
    pub circuit_breaker_trips: AtomicU64,

    /// Attestation data requests served from the cache
    pub attestation_cache_hits: AtomicU64,

    /// Attestation data computations (cache misses)
    pub attestation_data_computations: AtomicU64,

    /// Sync committee subnet subscriptions stored
    pub sync_subnet_registrations: AtomicU64,

    /// Blob sidecars that failed to broadcast
    pub blob_broadcast_failures: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a produced block
    pub fn record_block_produced(&self, fork: &str, blinded: bool) {
        self.blocks_produced.fetch_add(1, Ordering::Relaxed);
        prom::BLOCKS_PRODUCED
            .with_label_values(&[fork, if blinded { "true" } else { "false" }])
            .inc();
    }

    /// Record a signed block accepted for import
    pub fn record_block_proposed(&self) {
        self.blocks_proposed.fetch_add(1, Ordering::Relaxed);
        prom::BLOCKS_PROPOSED.inc();
    }

    /// Record a failed or rejected builder bid
    pub fn record_builder_miss(&self) {
        self.builder_get_payload_misses
            .fetch_add(1, Ordering::Relaxed);
        prom::BUILDER_GET_PAYLOAD_MISSES.inc();
    }

    /// Record a proposal on a parent other than the cached head
    pub fn record_late_block_reorg_attempt(&self) {
        self.late_block_reorg_attempts
            .fetch_add(1, Ordering::Relaxed);
        prom::LATE_BLOCK_REORG_ATTEMPTS.inc();
    }

    /// Record an open circuit breaker
    pub fn record_circuit_breaker_trip(&self) {
        self.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
        prom::BUILDER_CIRCUIT_BREAKER_TRIPS.inc();
    }

    /// Record the values compared during payload selection
    pub fn record_payload_values(&self, builder_gwei: u64, local_gwei: u64) {
        prom::BUILDER_PAYLOAD_VALUE_GWEI.set(builder_gwei as f64);
        prom::LOCAL_PAYLOAD_VALUE_GWEI.set(local_gwei as f64);
    }

    /// Record an attestation data cache hit
    pub fn record_attestation_cache_hit(&self) {
        self.attestation_cache_hits.fetch_add(1, Ordering::Relaxed);
        prom::ATTESTATION_DATA_REQUESTS
            .with_label_values(&["hit"])
            .inc();
    }

    /// Record an attestation data computation
    pub fn record_attestation_data_computed(&self) {
        self.attestation_data_computations
            .fetch_add(1, Ordering::Relaxed);
        prom::ATTESTATION_DATA_REQUESTS
            .with_label_values(&["computed"])
            .inc();
    }

    /// Record a stored sync subnet subscription
    pub fn record_sync_subnet_registration(&self) {
        self.sync_subnet_registrations
            .fetch_add(1, Ordering::Relaxed);
        prom::SYNC_SUBNET_REGISTRATIONS.inc();
    }

    /// Record a blob sidecar broadcast failure
    pub fn record_blob_broadcast_failure(&self) {
        self.blob_broadcast_failures.fetch_add(1, Ordering::Relaxed);
        prom::BLOB_BROADCAST_FAILURES.inc();
    }

    /// Get builder miss count
    pub fn builder_misses(&self) -> u64 {
        self.builder_get_payload_misses.load(Ordering::Relaxed)
    }

    /// Get late-block reorg attempt count
    pub fn late_block_reorg_attempts(&self) -> u64 {
        self.late_block_reorg_attempts.load(Ordering::Relaxed)
    }

    /// Get attestation data computation count
    pub fn attestation_data_computations(&self) -> u64 {
        self.attestation_data_computations.load(Ordering::Relaxed)
    }

    /// Get circuit breaker trip count
    pub fn circuit_breaker_trips(&self) -> u64 {
        self.circuit_breaker_trips.load(Ordering::Relaxed)
    }

    /// Get attestation cache hit count
    pub fn attestation_cache_hits(&self) -> u64 {
        self.attestation_cache_hits.load(Ordering::Relaxed)
    }

    /// Get produced block count
    pub fn blocks_produced(&self) -> u64 {
        self.blocks_produced.load(Ordering::Relaxed)
    }

    /// Get proposed block count
    pub fn blocks_proposed(&self) -> u64 {
        self.blocks_proposed.load(Ordering::Relaxed)
    }

    /// Get failed sidecar broadcast count
    pub fn blob_broadcast_failures(&self) -> u64 {
        self.blob_broadcast_failures.load(Ordering::Relaxed)
    }

    /// Get stored sync subnet subscription count
    pub fn sync_subnet_registrations(&self) -> u64 {
        self.sync_subnet_registrations.load(Ordering::Relaxed)
    }
}
