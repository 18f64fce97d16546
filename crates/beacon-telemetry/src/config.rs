//! Telemetry configuration from environment variables.

use std::env;

/// Log target of the block production crate.
pub const PROPOSER_LOG_TARGET: &str = "block_production";

/// Configuration for logging.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,

    /// Base log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Level override for proposer logs only, e.g. `debug` while
    /// investigating missed proposals
    pub proposer_log_level: Option<String>,

    /// Whether to install an output layer at all
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Network name (mainnet, holesky, devnet)
    pub network: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "beacon-node".to_string(),
            log_level: "info".to_string(),
            proposer_log_level: None,
            console_output: true,
            json_logs: false,
            network: "mainnet".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BN_SERVICE_NAME`: Service name (default: beacon-node)
    /// - `BN_LOG_LEVEL`: Base log level (default: info)
    /// - `BN_PROPOSER_LOG_LEVEL`: Level for block production logs (default: base level)
    /// - `BN_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `BN_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `BN_NETWORK`: Network name (default: mainnet)
    ///
    /// `RUST_LOG`, when set, replaces the whole filter at init time.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("BN_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: env::var("BN_LOG_LEVEL").unwrap_or(defaults.log_level),
            proposer_log_level: env::var("BN_PROPOSER_LOG_LEVEL").ok(),
            console_output: env_flag("BN_CONSOLE_OUTPUT").unwrap_or(true),
            json_logs: env_flag("BN_JSON_LOGS").unwrap_or(is_container),
            network: env::var("BN_NETWORK").unwrap_or(defaults.network),
        }
    }

    /// `EnvFilter` directives: the base level plus the proposer override.
    pub fn filter_directives(&self) -> String {
        match &self.proposer_log_level {
            Some(level) => format!("{},{}={}", self.log_level, PROPOSER_LOG_TARGET, level),
            None => self.log_level.clone(),
        }
    }

    /// Service name qualified by network, e.g. `beacon-node-holesky`.
    pub fn full_service_name(&self) -> String {
        if self.network == "mainnet" {
            self.service_name.clone()
        } else {
            format!("{}-{}", self.service_name, self.network)
        }
    }
}

/// `true`/`1` and `false`/`0`, case-insensitive; anything else is unset.
fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
