//! # Beacon Telemetry
//!
//! Logging and metrics for the beacon node block-production stack.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` registry with env filter, JSON or pretty output
//! - **Metrics**: process-wide Prometheus registry for proposer, builder and attester paths
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BN_SERVICE_NAME` | `beacon-node` | Service name in logs |
//! | `BN_LOG_LEVEL` | `info` | Log level filter |
//! | `BN_JSON_LOGS` | container-dependent | JSON log output |
//! | `BN_METRICS_PORT` | `8080` | Prometheus port |

#![warn(missing_docs)]

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{gather_metrics, register_metrics, HistogramTimer, MetricsHandle};
pub use tracing_setup::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber is already installed, or installation failed
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Collector registration or encoding failed
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Unparseable log filter or similar
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard to hold for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Initialize metrics first so early log lines can be counted against them
    let metrics_handle = register_metrics()?;
    init_logging(&config)?;

    Ok(TelemetryGuard {
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
