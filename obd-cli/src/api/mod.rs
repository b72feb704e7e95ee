//! Ontario Builder Directory API module
//!
//! Transport, endpoint sets and data types for the public builder registry.
//! Everything above this layer only sees [`RegistrySource`] and [`Payload`].

pub mod client;
pub mod endpoints;
pub mod models;
pub mod resilience;
pub mod search;

pub use client::{DEFAULT_USER_AGENT, RegistryClient, RegistrySource};
pub use endpoints::{DEFAULT_BASE_URL, Endpoint, EndpointSet};
pub use models::{DetailBundle, EntityId, EntityKind, Payload, Row};
pub use resilience::{ResilienceConfig, RetryConfig, RetryPolicy};
pub use search::SearchCriteria;
