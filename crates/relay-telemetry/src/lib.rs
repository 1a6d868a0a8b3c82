//! # Relay Telemetry
//!
//! Structured logging for topic-relay processes. Library crates only emit
//! `tracing` events; binaries call [`init_logging`] once at startup.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RELAY_SERVICE_NAME` | `topic-relay` | Service name on the startup event |
//! | `RELAY_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `RELAY_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `RELAY_JSON_LOGS` | `false` (`true` in containers) | JSON lines output |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;

pub use config::{TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use logging::init_logging;

use thiserror::Error;

/// Logging initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}
