//! Production resilience features
//!
//! Retry policy with backoff and the per-request timeout / concurrency
//! settings that keep one slow sub-resource from stalling a batch.

pub mod config;
pub mod retry;

pub use config::{ResilienceConfig, ResilienceConfigBuilder};
pub use retry::{RetryConfig, RetryPolicy};
