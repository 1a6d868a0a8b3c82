//! # Relay Node
//!
//! Demo process for the relay bus: a writer loop publishing a counter event
//! on a fixed interval and a reader loop draining the bound queue.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (from env)
//! 2. Initialize logging
//! 3. Build the broker for the configured backend
//! 4. Provision reader, then writer
//! 5. Run both loops until Ctrl+C

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod runtime;

pub use config::{Backend, NodeConfig, NodeConfigError, NodeRole};
pub use runtime::{build_broker, reader_loop, writer_loop, NodeRuntime, RunSummary};
