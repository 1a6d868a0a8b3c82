//! # Relay Node
//!
//! Entry point for the relay demo node. See the library crate for the
//! runtime itself.

use anyhow::{Context, Result};
use relay_node::{NodeConfig, NodeRuntime};
use relay_telemetry::{init_logging, TelemetryConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let telemetry = TelemetryConfig::for_service("relay-node");
    init_logging(&telemetry).context("Failed to initialize logging")?;

    // Load configuration
    let config = NodeConfig::from_env().context("Invalid node configuration")?;
    info!(
        backend = %config.backend,
        role = ?config.role,
        topic = %config.bus.topic,
        queue = %config.bus.queue,
        "Configuration loaded"
    );

    let runtime = NodeRuntime::new(config).await?;

    let stop = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C"),
            Err(err) => error!(error = %err, "Failed to listen for Ctrl+C"),
        }
        runtime.shutdown();
    };

    let run = runtime.run();
    tokio::pin!(run);
    let summary = tokio::select! {
        result = &mut run => result?,
        () = stop => run.await?,
    };
    info!(
        published = summary.published,
        consumed = summary.consumed,
        "Shutdown complete"
    );
    Ok(())
}
