//! # Node Runtime
//!
//! Provisions the configured topic/queue pair and drives the demo loops:
//!
//! - **writer loop**: publishes `{event_type}` from `{source}` with
//!   `data.count` incrementing, one event per publish interval
//! - **reader loop**: reads, logs and commits every delivery; undecodable
//!   messages are committed too so they are not redelivered forever
//!
//! Both loops stop when the shutdown trigger fires. The reader loop also
//! stops when the queue fails permanently, e.g. it was deleted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use relay_bus::{
    shutdown_channel, BrokerProvider, Event, InMemoryBroker, ReadError, Reader, Shutdown,
    ShutdownTrigger, WriteError, Writer,
};
use tracing::{error, info, warn};

use crate::config::{Backend, NodeConfig};

/// Counters reported when the node stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Events published by the writer loop.
    pub published: u64,
    /// Deliveries committed by the reader loop.
    pub consumed: u64,
}

/// The demo node.
pub struct NodeRuntime {
    config: NodeConfig,
    broker: Arc<dyn BrokerProvider>,
    shutdown_tx: ShutdownTrigger,
    shutdown_rx: Shutdown,
}

impl NodeRuntime {
    /// Create a runtime with the broker selected by `config.backend`.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let broker = build_broker(config.backend).await?;
        Ok(Self::with_broker(config, broker))
    }

    /// Create a runtime on an existing broker.
    pub fn with_broker(config: NodeConfig, broker: Arc<dyn BrokerProvider>) -> Self {
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        Self {
            config,
            broker,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Provision and run until [`NodeRuntime::shutdown`] is called.
    ///
    /// The reader is provisioned first so the queue is subscribed before the
    /// first event goes out.
    pub async fn run(&self) -> Result<RunSummary> {
        let bus = &self.config.bus;
        let role = self.config.role;

        let reader = if role.consumes() {
            Some(
                Reader::new(Arc::clone(&self.broker), bus)
                    .await
                    .context("Failed to provision reader")?,
            )
        } else {
            None
        };

        let writer = if role.produces() {
            Some(
                Writer::new(Arc::clone(&self.broker), &bus.topic)
                    .await
                    .context("Failed to provision writer")?,
            )
        } else {
            None
        };

        info!(
            backend = %self.config.backend,
            topic = %bus.topic,
            queue = %bus.queue,
            "Node is running"
        );

        let produce = async {
            match &writer {
                Some(writer) => {
                    writer_loop(
                        writer,
                        &self.config.event_type,
                        &self.config.source,
                        self.config.publish_interval(),
                        self.shutdown_rx.clone(),
                    )
                    .await
                }
                None => Ok(0),
            }
        };

        let consume = async {
            match &reader {
                Some(reader) => reader_loop(reader, self.shutdown_rx.clone()).await,
                None => 0,
            }
        };

        let (published, consumed) = tokio::join!(produce, consume);
        let summary = RunSummary {
            published: published.context("Writer loop stopped")?,
            consumed,
        };

        info!(
            published = summary.published,
            consumed = summary.consumed,
            "Node stopped"
        );
        Ok(summary)
    }

    /// Signal both loops to stop.
    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.shutdown_tx.trigger();
    }
}

/// Build the broker for `backend`.
pub async fn build_broker(backend: Backend) -> Result<Arc<dyn BrokerProvider>> {
    match backend {
        Backend::Memory => {
            let broker: Arc<dyn BrokerProvider> = Arc::new(InMemoryBroker::new());
            Ok(broker)
        }
        #[cfg(feature = "aws")]
        Backend::Aws => {
            let config = relay_bus::AwsBrokerConfig::from_env();
            info!(region = ?config.region, endpoint = ?config.endpoint, "Connecting to SNS/SQS");
            let broker: Arc<dyn BrokerProvider> =
                Arc::new(relay_bus::AwsBroker::connect(&config).await);
            Ok(broker)
        }
        #[cfg(not(feature = "aws"))]
        Backend::Aws => anyhow::bail!("aws backend requires the `aws` feature"),
    }
}

/// Publish one counter event per `interval` until shutdown.
///
/// Stops at the first failed publish. Returns the number of events sent.
pub async fn writer_loop(
    writer: &Writer,
    event_type: &str,
    source: &str,
    interval: Duration,
    mut shutdown: Shutdown,
) -> Result<u64, WriteError> {
    let mut count: u64 = 0;

    while !shutdown.is_triggered() {
        let data = BTreeMap::from([("count".to_string(), count.to_string())]);
        let event = Event::new(event_type, source, data);
        writer.write(&event).await?;
        info!(event_id = %event.id(), count, "Event published");
        count += 1;

        tokio::select! {
            biased;
            () = shutdown.triggered() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    Ok(count)
}

/// Read, log and commit until shutdown or a permanent receive failure.
/// Returns the number of committed deliveries.
pub async fn reader_loop(reader: &Reader, mut shutdown: Shutdown) -> u64 {
    let mut consumed: u64 = 0;

    loop {
        match reader.read(&mut shutdown).await {
            Ok(delivery) => {
                info!(
                    event_id = %delivery.event.id(),
                    event_type = %delivery.event.event_type(),
                    source = %delivery.event.source(),
                    data = ?delivery.event.data(),
                    "Event received"
                );
                match reader.commit(&delivery.receipt).await {
                    Ok(()) => consumed += 1,
                    Err(err) => warn!(error = %err, "Commit failed, message will be redelivered"),
                }
            }
            Err(ReadError::Decode { receipt, source }) => {
                warn!(error = %source, "Dropping undecodable message");
                if let Err(err) = reader.commit(&receipt).await {
                    warn!(error = %err, "Commit of undecodable message failed");
                }
            }
            Err(ReadError::Transport(err)) => {
                error!(error = %err, "Receive failed permanently, stopping reader");
                return consumed;
            }
            Err(ReadError::Cancelled) => return consumed,
        }
    }
}
