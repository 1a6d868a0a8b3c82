//! # Node Configuration
//!
//! Backend selection, role and demo publishing parameters on top of
//! [`BusConfig`].

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use relay_bus::{BusConfig, ConfigError};
use thiserror::Error;

/// Default pause between published events.
pub const DEFAULT_PUBLISH_INTERVAL_SECS: u64 = 10;

/// Default `source` stamped on published events.
pub const DEFAULT_SOURCE: &str = "A";

/// Default `eventType` of published events.
pub const DEFAULT_EVENT_TYPE: &str = "testEvent";

/// Which broker the node talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// In-process broker; producer and consumer must share the process.
    #[default]
    Memory,
    /// SNS topics and SQS queues (requires the `aws` feature).
    Aws,
}

impl FromStr for Backend {
    type Err = NodeConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "aws" => Ok(Self::Aws),
            other => Err(NodeConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Aws => f.write_str("aws"),
        }
    }
}

/// Which loops the node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRole {
    Producer,
    Consumer,
    #[default]
    Both,
}

impl NodeRole {
    pub fn produces(self) -> bool {
        matches!(self, Self::Producer | Self::Both)
    }

    pub fn consumes(self) -> bool {
        matches!(self, Self::Consumer | Self::Both)
    }
}

impl FromStr for NodeRole {
    type Err = NodeConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "producer" => Ok(Self::Producer),
            "consumer" => Ok(Self::Consumer),
            "both" => Ok(Self::Both),
            other => Err(NodeConfigError::UnknownRole(other.to_string())),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum NodeConfigError {
    #[error(transparent)]
    Bus(#[from] ConfigError),

    #[error("Unknown backend {0:?} (expected memory or aws)")]
    UnknownBackend(String),

    #[error("Unknown role {0:?} (expected producer, consumer or both)")]
    UnknownRole(String),

    #[error("Invalid publish interval {0:?}")]
    InvalidPublishInterval(String),

    #[error("Publish interval must be greater than zero")]
    ZeroPublishInterval,

    #[error("Event source must not be empty")]
    EmptySource,
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub backend: Backend,
    pub role: NodeRole,
    /// Topic, queue and receive tuning.
    pub bus: BusConfig,
    /// Seconds between published events.
    pub publish_interval_secs: u64,
    /// `source` of published events.
    pub source: String,
    /// `eventType` of published events.
    pub event_type: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            role: NodeRole::default(),
            bus: BusConfig::new("test-topic", "test-queue"),
            publish_interval_secs: DEFAULT_PUBLISH_INTERVAL_SECS,
            source: DEFAULT_SOURCE.to_string(),
            event_type: DEFAULT_EVENT_TYPE.to_string(),
        }
    }
}

impl NodeConfig {
    /// Load from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RELAY_BACKEND`: `memory` or `aws` (default: memory)
    /// - `RELAY_ROLE`: `producer`, `consumer` or `both` (default: both)
    /// - `RELAY_PUBLISH_INTERVAL_SECS`: Seconds between events (default: 10)
    /// - `RELAY_SOURCE`: Event source (default: A)
    /// - `RELAY_EVENT_TYPE`: Event type (default: testEvent)
    /// - plus the topic/queue variables read by [`BusConfig::from_env`]
    pub fn from_env() -> Result<Self, NodeConfigError> {
        let defaults = Self::default();

        let config = Self {
            backend: match env::var("RELAY_BACKEND") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.backend,
            },
            role: match env::var("RELAY_ROLE") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.role,
            },
            bus: BusConfig::from_env()?,
            publish_interval_secs: match env::var("RELAY_PUBLISH_INTERVAL_SECS") {
                Ok(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| NodeConfigError::InvalidPublishInterval(value))?,
                Err(_) => defaults.publish_interval_secs,
            },
            source: env::var("RELAY_SOURCE").unwrap_or(defaults.source),
            event_type: env::var("RELAY_EVENT_TYPE").unwrap_or(defaults.event_type),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NodeConfigError> {
        if self.publish_interval_secs == 0 {
            return Err(NodeConfigError::ZeroPublishInterval);
        }
        if self.source.trim().is_empty() {
            return Err(NodeConfigError::EmptySource);
        }
        self.bus.validate()?;
        Ok(())
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.role, NodeRole::Both);
        assert_eq!(config.bus.topic, "test-topic");
        assert_eq!(config.publish_interval(), Duration::from_secs(10));
        assert_eq!(config.source, "A");
        assert_eq!(config.event_type, "testEvent");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("memory".parse::<Backend>().unwrap(), Backend::Memory);
        assert_eq!(" AWS ".parse::<Backend>().unwrap(), Backend::Aws);
        assert!(matches!(
            "kafka".parse::<Backend>(),
            Err(NodeConfigError::UnknownBackend(name)) if name == "kafka"
        ));
    }

    #[test]
    fn test_parse_role() {
        let role: NodeRole = "consumer".parse().unwrap();
        assert!(role.consumes());
        assert!(!role.produces());
        assert!(NodeRole::Both.produces() && NodeRole::Both.consumes());
        assert!("observer".parse::<NodeRole>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = NodeConfig {
            publish_interval_secs: 0,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(NodeConfigError::ZeroPublishInterval)));

        let config = NodeConfig {
            source: "  ".to_string(),
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(NodeConfigError::EmptySource)));

        let config = NodeConfig {
            bus: BusConfig::new("", "test-queue"),
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(NodeConfigError::Bus(_))));
    }
}
