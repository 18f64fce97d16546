//! Prometheus metrics for block production.
//!
//! All metrics follow the naming convention: `bn_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., blocks_produced_total)
//! - **Gauge**: Value that can go up or down (e.g., builder_payload_value_gwei)
//! - **Histogram**: Distribution of values (e.g., block_production_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PROPOSER
    // =========================================================================

    /// Blocks produced, by fork
    pub static ref BLOCKS_PRODUCED: CounterVec = CounterVec::new(
        Opts::new("bn_proposer_blocks_produced_total", "Blocks produced for validator clients"),
        &["fork", "blinded"]
    ).expect("metric creation failed");

    /// Signed blocks accepted for broadcast and import
    pub static ref BLOCKS_PROPOSED: Counter = Counter::new(
        "bn_proposer_blocks_proposed_total",
        "Signed blocks accepted, broadcast and imported"
    ).expect("metric creation failed");

    /// Block production duration histogram
    pub static ref BLOCK_PRODUCTION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "bn_proposer_block_production_duration_seconds",
            "Time spent assembling a block"
        ).buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0])
    ).expect("metric creation failed");

    /// Head differed from the proposer head at proposal time
    pub static ref LATE_BLOCK_REORG_ATTEMPTS: Counter = Counter::new(
        "bn_proposer_late_block_reorg_attempted_total",
        "Proposals built on a parent other than the cached head"
    ).expect("metric creation failed");

    /// Blob sidecars that failed to broadcast
    pub static ref BLOB_BROADCAST_FAILURES: Counter = Counter::new(
        "bn_proposer_blob_sidecar_broadcast_failures_total",
        "Blob sidecars that could not be broadcast"
    ).expect("metric creation failed");

    // =========================================================================
    // BUILDER
    // =========================================================================

    /// Builder bid requests that failed or were rejected
    pub static ref BUILDER_GET_PAYLOAD_MISSES: Counter = Counter::new(
        "bn_builder_get_payload_miss_total",
        "Builder header requests that failed, timed out or were rejected"
    ).expect("metric creation failed");

    /// Circuit breaker activations
    pub static ref BUILDER_CIRCUIT_BREAKER_TRIPS: Counter = Counter::new(
        "bn_builder_circuit_breaker_trips_total",
        "Proposals where the builder circuit breaker was open"
    ).expect("metric creation failed");

    /// Last builder bid value
    pub static ref BUILDER_PAYLOAD_VALUE_GWEI: Gauge = Gauge::new(
        "bn_builder_payload_value_gwei",
        "Value of the last compared builder bid in gwei"
    ).expect("metric creation failed");

    /// Last local payload value
    pub static ref LOCAL_PAYLOAD_VALUE_GWEI: Gauge = Gauge::new(
        "bn_local_payload_value_gwei",
        "Value of the last compared local payload in gwei"
    ).expect("metric creation failed");

    // =========================================================================
    // ATTESTER / SYNC COMMITTEE
    // =========================================================================

    /// Attestation data requests by cache outcome
    pub static ref ATTESTATION_DATA_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("bn_attestation_data_requests_total", "Attestation data requests"),
        &["outcome"]  // outcome: hit/computed
    ).expect("metric creation failed");

    /// Sync committee subnet subscriptions stored
    pub static ref SYNC_SUBNET_REGISTRATIONS: Counter = Counter::new(
        "bn_sync_committee_subnet_registrations_total",
        "Sync committee subnet subscriptions stored"
    ).expect("metric creation failed");
}

/// Handle proving metrics were registered.
pub struct MetricsHandle {
    registered: usize,
}

impl MetricsHandle {
    /// Number of collectors registered.
    pub fn registered(&self) -> usize {
        self.registered
    }
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Proposer
        Box::new(BLOCKS_PRODUCED.clone()),
        Box::new(BLOCKS_PROPOSED.clone()),
        Box::new(BLOCK_PRODUCTION_DURATION.clone()),
        Box::new(LATE_BLOCK_REORG_ATTEMPTS.clone()),
        Box::new(BLOB_BROADCAST_FAILURES.clone()),
        // Builder
        Box::new(BUILDER_GET_PAYLOAD_MISSES.clone()),
        Box::new(BUILDER_CIRCUIT_BREAKER_TRIPS.clone()),
        Box::new(BUILDER_PAYLOAD_VALUE_GWEI.clone()),
        Box::new(LOCAL_PAYLOAD_VALUE_GWEI.clone()),
        // Attester / sync committee
        Box::new(ATTESTATION_DATA_REQUESTS.clone()),
        Box::new(SYNC_SUBNET_REGISTRATIONS.clone()),
    ];

    let registered = metrics.len();
    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle { registered })
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
