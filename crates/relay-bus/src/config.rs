//! Bus configuration and validation.
//!
//! # Example
//!
//! ```ignore
//! use relay_bus::config::{BusConfig, ReceiveConfig};
//!
//! let config = BusConfig::new("orders", "billing")
//!     .with_receive(ReceiveConfig::default().with_visibility_timeout_secs(60));
//! config.validate()?;
//! ```

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::ReceiveRequest;

/// Default time a delivered message stays hidden.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 20;

/// Default long-poll window.
pub const DEFAULT_WAIT_TIME_SECS: u64 = 1;

/// Default pause after a failed receive.
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 1_000;

/// Broker upper bound on the visibility timeout (12 hours).
pub const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;

/// Broker upper bound on the long-poll window.
pub const MAX_WAIT_TIME_SECS: u64 = 20;

/// Messages requested per poll.
pub const MESSAGES_PER_POLL: u8 = 1;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    #[error("Visibility timeout {secs}s exceeds maximum {max}s")]
    VisibilityTimeoutTooLong { secs: u64, max: u64 },

    #[error("Wait time {secs}s exceeds maximum {max}s")]
    WaitTimeTooLong { secs: u64, max: u64 },

    #[error("Error backoff must be greater than zero")]
    ZeroErrorBackoff,

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Receive-side tuning for a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Exclusivity window for a delivered message, in seconds.
    pub visibility_timeout_secs: u64,
    /// Long-poll window per receive call, in seconds.
    pub wait_time_secs: u64,
    /// Pause before polling again after a transport error, in milliseconds.
    pub error_backoff_ms: u64,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: DEFAULT_VISIBILITY_TIMEOUT_SECS,
            wait_time_secs: DEFAULT_WAIT_TIME_SECS,
            error_backoff_ms: DEFAULT_ERROR_BACKOFF_MS,
        }
    }
}

impl ReceiveConfig {
    /// Validate against broker limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.visibility_timeout_secs > MAX_VISIBILITY_TIMEOUT_SECS {
            return Err(ConfigError::VisibilityTimeoutTooLong {
                secs: self.visibility_timeout_secs,
                max: MAX_VISIBILITY_TIMEOUT_SECS,
            });
        }
        if self.wait_time_secs > MAX_WAIT_TIME_SECS {
            return Err(ConfigError::WaitTimeTooLong {
                secs: self.wait_time_secs,
                max: MAX_WAIT_TIME_SECS,
            });
        }
        if self.error_backoff_ms == 0 {
            return Err(ConfigError::ZeroErrorBackoff);
        }
        Ok(())
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// The single-message receive request a reader issues per poll.
    #[must_use]
    pub fn request(&self) -> ReceiveRequest {
        ReceiveRequest {
            max_messages: MESSAGES_PER_POLL,
            visibility_timeout: self.visibility_timeout(),
            wait_time: self.wait_time(),
        }
    }

    /// Builder-style method to set the visibility timeout
    pub fn with_visibility_timeout_secs(mut self, secs: u64) -> Self {
        self.visibility_timeout_secs = secs;
        self
    }

    /// Builder-style method to set the long-poll window
    pub fn with_wait_time_secs(mut self, secs: u64) -> Self {
        self.wait_time_secs = secs;
        self
    }

    /// Builder-style method to set the error backoff
    pub fn with_error_backoff_ms(mut self, ms: u64) -> Self {
        self.error_backoff_ms = ms;
        self
    }
}

/// Topic/queue pair plus receive tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Topic producers publish to.
    pub topic: String,
    /// Queue bound to the topic that a reader drains.
    pub queue: String,
    #[serde(default)]
    pub receive: ReceiveConfig,
}

impl BusConfig {
    pub fn new(topic: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            queue: queue.into(),
            receive: ReceiveConfig::default(),
        }
    }

    /// Builder-style method to set receive tuning
    pub fn with_receive(mut self, receive: ReceiveConfig) -> Self {
        self.receive = receive;
        self
    }

    /// Load from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RELAY_TOPIC`: Topic name (default: test-topic)
    /// - `RELAY_QUEUE`: Queue name (default: test-queue)
    /// - `RELAY_VISIBILITY_TIMEOUT_SECS`: Visibility timeout (default: 20)
    /// - `RELAY_WAIT_TIME_SECS`: Long-poll window (default: 1)
    /// - `RELAY_ERROR_BACKOFF_MS`: Pause after a failed receive (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ReceiveConfig::default();
        let receive = ReceiveConfig {
            visibility_timeout_secs: env_u64(
                "RELAY_VISIBILITY_TIMEOUT_SECS",
                defaults.visibility_timeout_secs,
            )?,
            wait_time_secs: env_u64("RELAY_WAIT_TIME_SECS", defaults.wait_time_secs)?,
            error_backoff_ms: env_u64("RELAY_ERROR_BACKOFF_MS", defaults.error_backoff_ms)?,
        };

        let config = Self {
            topic: env::var("RELAY_TOPIC").unwrap_or_else(|_| "test-topic".to_string()),
            queue: env::var("RELAY_QUEUE").unwrap_or_else(|_| "test-queue".to_string()),
            receive,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::EmptyName("Topic"));
        }
        if self.queue.trim().is_empty() {
            return Err(ConfigError::EmptyName("Queue"));
        }
        self.receive.validate()
    }
}

fn env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_receive_config() {
        let config = ReceiveConfig::default();
        assert_eq!(config.visibility_timeout(), Duration::from_secs(20));
        assert_eq!(config.wait_time(), Duration::from_secs(1));
        assert_eq!(config.error_backoff(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_request_asks_for_one_message() {
        let request = ReceiveConfig::default().with_visibility_timeout_secs(45).request();
        assert_eq!(request.max_messages, 1);
        assert_eq!(request.visibility_timeout, Duration::from_secs(45));
        assert_eq!(request.wait_time, Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let config = ReceiveConfig::default().with_visibility_timeout_secs(43_201);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VisibilityTimeoutTooLong { secs: 43_201, .. })
        ));

        let config = ReceiveConfig::default().with_wait_time_secs(21);
        assert!(matches!(config.validate(), Err(ConfigError::WaitTimeTooLong { .. })));

        let config = ReceiveConfig::default().with_error_backoff_ms(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroErrorBackoff));
    }

    #[test]
    fn test_rejects_empty_names() {
        assert_eq!(
            BusConfig::new(" ", "billing").validate(),
            Err(ConfigError::EmptyName("Topic"))
        );
        assert_eq!(
            BusConfig::new("orders", "").validate(),
            Err(ConfigError::EmptyName("Queue"))
        );
    }

    #[test]
    fn test_deserialize_with_partial_receive_section() {
        let config: BusConfig = serde_json::from_str(
            r#"{"topic": "orders", "queue": "billing", "receive": {"wait_time_secs": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.receive.wait_time_secs, 10);
        assert_eq!(config.receive.visibility_timeout_secs, DEFAULT_VISIBILITY_TIMEOUT_SECS);
        assert!(config.validate().is_ok());
    }
}
