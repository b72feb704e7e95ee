//! In-memory registry used by unit tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{Endpoint, EndpointSet, EntityId, EntityKind, Payload, RegistrySource};
use crate::error::FetchError;

/// Endpoint set whose URLs are `mem://<key>`
pub(crate) fn mem_endpoints(kind: EntityKind, keys: &[&str]) -> EndpointSet {
    EndpointSet::new(
        kind,
        keys.iter()
            .map(|key| Endpoint {
                key: (*key).to_string(),
                url: format!("mem://{}", key),
            })
            .collect(),
    )
}

type Slot = (String, String);

/// Scripted answers per (sub-resource key, entity id).
///
/// Unscripted pairs answer with an empty payload.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    responses: HashMap<Slot, Result<Payload, FetchError>>,
    delays: HashMap<Slot, Duration>,
    failing_ids: Vec<String>,
    completed: Mutex<HashMap<Slot, usize>>,
    finished_at: Mutex<HashMap<Slot, tokio::time::Instant>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn slot(key: &str, id: &str) -> Slot {
        (key.to_string(), id.to_string())
    }

    pub(crate) fn respond(mut self, key: &str, id: &str, body: Value) -> Self {
        let payload = Payload::from_json(body).expect("scripted body must be an object or array");
        self.responses.insert(Self::slot(key, id), Ok(payload));
        self
    }

    pub(crate) fn fail(mut self, key: &str, id: &str, err: FetchError) -> Self {
        self.responses.insert(Self::slot(key, id), Err(err));
        self
    }

    /// Every sub-resource of `id` fails with a network error
    pub(crate) fn fail_entity(mut self, id: &str) -> Self {
        self.failing_ids.push(id.to_string());
        self
    }

    pub(crate) fn delay(mut self, key: &str, id: &str, delay: Duration) -> Self {
        self.delays.insert(Self::slot(key, id), delay);
        self
    }

    /// How many requests for this slot ran to completion
    pub(crate) fn completed(&self, key: &str, id: &str) -> usize {
        self.completed
            .lock()
            .unwrap()
            .get(&Self::slot(key, id))
            .copied()
            .unwrap_or(0)
    }

    /// When the last request for this slot finished
    pub(crate) fn finished_at(&self, key: &str, id: &str) -> Option<tokio::time::Instant> {
        self.finished_at
            .lock()
            .unwrap()
            .get(&Self::slot(key, id))
            .copied()
    }
}

#[async_trait]
impl RegistrySource for ScriptedSource {
    async fn fetch_resource(&self, url: &str, id: &EntityId) -> Result<Payload, FetchError> {
        let key = url.trim_start_matches("mem://");
        let slot = Self::slot(key, id.as_str());

        if let Some(delay) = self.delays.get(&slot) {
            tokio::time::sleep(*delay).await;
        }

        *self.completed.lock().unwrap().entry(slot.clone()).or_insert(0) += 1;
        self.finished_at
            .lock()
            .unwrap()
            .insert(slot.clone(), tokio::time::Instant::now());

        if self.failing_ids.iter().any(|f| f == id.as_str()) {
            return Err(FetchError::network(url, "scripted outage"));
        }

        self.responses
            .get(&slot)
            .cloned()
            .unwrap_or(Ok(Payload::Empty))
    }
}
