//! Per-entity fan-out over sub-resource endpoints
//!
//! Every sub-resource of one entity is requested concurrently and joined.
//! The join itself never decides what a failure means: [`DetailFetcher::fetch_outcomes`]
//! hands back one tagged result per sub-resource and the callers pick a policy.

use futures::future::{join_all, try_join_all};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Instant;

use crate::api::{DetailBundle, Endpoint, EndpointSet, EntityId, EntityKind, Payload, RegistrySource};
use crate::error::FetchError;

/// Result of one sub-resource request
#[derive(Debug, Clone)]
pub struct ResourceOutcome {
    pub key: String,
    pub result: Result<Payload, FetchError>,
}

/// Best-effort bundle: whatever succeeded plus the keys that did not
#[derive(Debug, Clone)]
pub struct PartialBundle {
    pub bundle: DetailBundle,
    pub failures: Vec<(String, FetchError)>,
}

impl PartialBundle {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fetches every sub-resource of an entity kind for one entity ID
#[derive(Clone)]
pub struct DetailFetcher {
    source: Arc<dyn RegistrySource>,
    endpoints: EndpointSet,
}

impl std::fmt::Debug for DetailFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetailFetcher")
            .field("kind", &self.endpoints.kind)
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

impl DetailFetcher {
    pub fn new(source: Arc<dyn RegistrySource>, endpoints: EndpointSet) -> Self {
        Self { source, endpoints }
    }

    pub fn kind(&self) -> EntityKind {
        self.endpoints.kind
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    async fn fetch_one(&self, endpoint: &Endpoint, id: &EntityId) -> Result<Payload, FetchError> {
        self.source.fetch_resource(&endpoint.url, id).await
    }

    /// Fan out to all endpoints and wait for every one of them.
    ///
    /// Outcomes come back in endpoint declaration order.
    pub async fn fetch_outcomes(&self, id: &EntityId) -> Vec<ResourceOutcome> {
        debug!(
            "Fetching {} sub-resources for {} {}",
            self.endpoints.len(),
            self.kind(),
            id
        );

        let tasks = self.endpoints.iter().map(|endpoint| async move {
            ResourceOutcome {
                key: endpoint.key.clone(),
                result: self.fetch_one(endpoint, id).await,
            }
        });

        join_all(tasks).await
    }

    /// Fail-fast fetch: the first failing sub-resource fails the whole entity.
    ///
    /// Requests still in flight at that point are dropped, so a hung endpoint
    /// cannot hold the call open once another one has failed. No partial
    /// bundle is ever returned.
    pub async fn fetch_detail(&self, id: &EntityId) -> Result<DetailBundle, FetchError> {
        let started = Instant::now();

        let tasks = self.endpoints.iter().map(|endpoint| async move {
            self.fetch_one(endpoint, id)
                .await
                .map(|payload| (endpoint.key.clone(), payload))
        });

        let entries = try_join_all(tasks).await?;

        let mut bundle = DetailBundle::new(id.clone(), self.kind());
        for (key, payload) in entries {
            bundle.insert(key, payload);
        }

        debug!(
            "Fetched {} {} ({} sub-resources) in {:.0}ms",
            self.kind(),
            id,
            bundle.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );

        Ok(bundle)
    }

    /// Best-effort fetch: keep every sub-resource that succeeded
    pub async fn fetch_partial(&self, id: &EntityId) -> PartialBundle {
        let mut bundle = DetailBundle::new(id.clone(), self.kind());
        let mut failures = Vec::new();

        for outcome in self.fetch_outcomes(id).await {
            match outcome.result {
                Ok(payload) => bundle.insert(outcome.key, payload),
                Err(err) => {
                    warn!("{} {}: sub-resource '{}' failed: {}", self.kind(), id, outcome.key, err);
                    failures.push((outcome.key, err));
                }
            }
        }

        PartialBundle { bundle, failures }
    }
}
