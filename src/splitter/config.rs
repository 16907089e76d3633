//! Splitter configuration and its development/production presets.

use thiserror::Error;

/// Tunables for [`super::MessageSplitter`].
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Bounded capacity of the management queue.
    pub management_queue_capacity: usize,
    /// Bounded capacity of the network queue.
    pub network_queue_capacity: usize,
    /// Stamped into `data.insId` on every outbound message.
    pub instance_id: String,
    /// Whether outbound responses are validated against their response
    /// schema before being sent. Off by default since a schema bug on the
    /// response side should not itself break the response path.
    pub validate_responses: bool,
}

impl SplitterConfig {
    /// A small-capacity configuration suited to local development and
    /// unit tests, where a slow consumer should surface backpressure
    /// quickly rather than absorb it.
    #[must_use]
    pub fn development() -> Self {
        Self {
            management_queue_capacity: 32,
            network_queue_capacity: 32,
            instance_id: "gatewayd-dev".to_string(),
            validate_responses: true,
        }
    }

    /// A production-sized configuration: same queue capacities as the
    /// reference implementation, response validation left to the
    /// deployment to enable once schemas are known-good.
    #[must_use]
    pub fn production() -> Self {
        Self {
            management_queue_capacity: 32,
            network_queue_capacity: 32,
            instance_id: "gatewayd".to_string(),
            validate_responses: false,
        }
    }

    /// Validates the configuration, returning a [`ConfigError`] on the
    /// first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.management_queue_capacity == 0 {
            return Err(ConfigError::InvalidCapacity("management_queue_capacity"));
        }
        if self.network_queue_capacity == 0 {
            return Err(ConfigError::InvalidCapacity("network_queue_capacity"));
        }
        if self.instance_id.trim().is_empty() {
            return Err(ConfigError::EmptyInstanceId);
        }
        Ok(())
    }
}

/// Errors from an invalid [`SplitterConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A queue capacity field was zero.
    #[error("{0} must be greater than zero")]
    InvalidCapacity(&'static str),
    /// `instance_id` was empty or whitespace-only.
    #[error("instance_id must not be empty")]
    EmptyInstanceId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_preset_is_valid() {
        SplitterConfig::development().validate().unwrap();
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = SplitterConfig::development();
        config.network_queue_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCapacity(_))));
    }
}
