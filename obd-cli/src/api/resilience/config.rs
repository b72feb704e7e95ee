//! Resilience configuration with builder pattern
//!
//! Groups retry policy, per-request timeout and cross-entity concurrency
//! under one config with sane defaults.

use super::retry::RetryConfig;
use std::time::Duration;

/// Global resilience configuration for registry requests
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    /// Upper bound for a single sub-resource request
    pub request_timeout: Duration,
    /// Entities fetched at the same time during a batch (merges stay ordered)
    pub entity_concurrency: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            entity_concurrency: 1,
        }
    }
}

impl ResilienceConfig {
    /// Create a new builder for ResilienceConfig
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Gentle on the registry: one entity at a time, long timeout, few retries
    pub fn conservative() -> Self {
        Self {
            retry: RetryConfig::conservative(),
            request_timeout: Duration::from_secs(60),
            entity_concurrency: 1,
        }
    }

    /// Faster turnaround for development runs
    pub fn development() -> Self {
        Self {
            retry: RetryConfig::aggressive(),
            request_timeout: Duration::from_secs(10),
            entity_concurrency: 4,
        }
    }

    /// No retries, short timeout (for testing)
    pub fn disabled() -> Self {
        Self {
            retry: RetryConfig::disabled(),
            request_timeout: Duration::from_secs(5),
            entity_concurrency: 1,
        }
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    /// Configure retry behavior
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set max attempts per request (1 disables retries)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    /// Set base backoff delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    /// Enable/disable retry jitter
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.retry.jitter = enabled;
        self
    }

    /// Set per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set how many entities may be fetched concurrently (minimum 1)
    pub fn entity_concurrency(mut self, concurrency: usize) -> Self {
        self.config.entity_concurrency = concurrency.max(1);
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResilienceConfig::default();

        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.entity_concurrency, 1);
    }

    #[test]
    fn test_conservative_config() {
        let config = ResilienceConfig::conservative();

        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.entity_concurrency, 1);
    }

    #[test]
    fn test_development_config() {
        let config = ResilienceConfig::development();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.entity_concurrency, 4);
    }

    #[test]
    fn test_disabled_config() {
        let config = ResilienceConfig::disabled();

        assert_eq!(config.retry.max_attempts, 1);
        assert!(!config.retry.jitter);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ResilienceConfig::builder()
            .max_attempts(5)
            .base_delay(Duration::from_millis(50))
            .jitter(false)
            .request_timeout(Duration::from_secs(3))
            .entity_concurrency(0)
            .build();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(50));
        assert!(!config.retry.jitter);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.entity_concurrency, 1);
    }
}
