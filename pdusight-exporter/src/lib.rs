//! Prometheus exporter for PDU sensor readings polled over JSON-RPC.
//!
//! One process polls any number of PDUs through their management API and
//! serves everything it learns as labeled time series.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  PDU device  │────>│  DevicePoller    │────>│ DeviceCollector │
//! │  (JSON-RPC)  │     │  (dual cadence)  │     │ (latest state)  │
//! └──────────────┘     └──────────────────┘     └────────┬────────┘
//!                                                        │
//!                                     ┌──────────────────▼──┐
//!                                     │ Registry + /metrics │
//!                                     │  (filter + encode)  │
//!                                     └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! pdusight-exporter --config pdus.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod http;
pub mod naming;
pub mod poller;
pub mod registry;

pub use collector::{DeviceCollector, MetricSample, SensorSample};
pub use config::{DeviceConfig, DiscoveryFailurePolicy, ExporterConfig, LabelPolicy};
pub use http::HttpServer;
pub use poller::DevicePoller;
pub use registry::Registry;

use config::{LogFormat, LoggingConfig};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}
