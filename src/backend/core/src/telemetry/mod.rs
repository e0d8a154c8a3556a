//! Telemetry: structured logging and engine metrics.
//!
//! - **Logging**: `tracing` events rendered as JSON, pretty or compact output
//! - **Metrics**: decision, mutation, cache and error counters via the `metrics` facade
//!
//! # Example
//!
//! ```rust,no_run
//! use warden_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::default()).expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{register_metric_descriptions, DecisionMetrics, DecisionTimer, MutationMetrics};

use serde::Deserialize;

/// Unified telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TelemetryConfig {
    pub fn with_logging(logging: LoggingConfig) -> Self {
        Self {
            logging,
            ..Self::default()
        }
    }
}

fn default_service_name() -> String {
    "warden".to_string()
}

/// Initialize logging and register metric descriptions.
///
/// Call once at process startup.
///
/// # Errors
///
/// Returns an error if the subscriber cannot be installed.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.logging)?;
    register_metric_descriptions();

    ::tracing::debug!(
        service_name = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Telemetry initialized"
    );
    Ok(())
}
