//! Cross-entity batch aggregation
//!
//! Runs the detail fetch for each entity ID, tags every row with the ID it came
//! from and merges everything into one [`AggregatedDataset`]. One entity failing
//! never stops the batch.
//!
//! Fetches may overlap when `concurrency > 1`, but results are consumed in input
//! order by a single loop, so the dataset has exactly one writer and rows for a
//! key always appear in entity order, then payload order.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{error, info};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::api::{DetailBundle, EntityId, EntityKind, Payload, Row};
use crate::error::FetchError;
use crate::fetcher::DetailFetcher;

/// Field added to every aggregated row
pub const SOURCE_ID_FIELD: &str = "source_id";

/// Field holding list elements that were not objects
pub const WRAPPED_VALUE_FIELD: &str = "value";

/// Sub-resource key -> rows from many entities, keys in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedDataset {
    tables: Vec<(String, Vec<Row>)>,
}

impl AggregatedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag one entity's bundle. Empty payloads produce no entry.
    pub fn from_bundle(bundle: DetailBundle) -> Self {
        let id = bundle.entity_id.clone();
        let mut fragment = Self::new();

        for (key, payload) in bundle.into_entries() {
            let rows: Vec<Row> = match payload {
                Payload::Empty => continue,
                Payload::Record(row) => vec![tag_row(row, &id)],
                Payload::List(items) => items
                    .into_iter()
                    .map(|item| tag_row(into_row(item), &id))
                    .collect(),
            };
            fragment.append(&key, rows);
        }

        fragment
    }

    /// Append rows to a key; nothing happens for an empty batch of rows
    pub fn append(&mut self, key: &str, rows: Vec<Row>) {
        if rows.is_empty() {
            return;
        }
        match self.tables.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => existing.extend(rows),
            None => self.tables.push((key.to_string(), rows)),
        }
    }

    /// Merge another dataset after this one
    pub fn extend(&mut self, other: AggregatedDataset) {
        for (key, rows) in other.tables {
            self.append(&key, rows);
        }
    }

    pub fn get(&self, key: &str) -> Option<&[Row]> {
        self.tables
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, rows)| rows.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Row])> {
        self.tables.iter().map(|(k, rows)| (k.as_str(), rows.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(k, _)| k.as_str())
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|(_, rows)| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn into_row(item: Value) -> Row {
    match item {
        Value::Object(row) => row,
        other => {
            let mut row = Map::new();
            row.insert(WRAPPED_VALUE_FIELD.to_string(), other);
            row
        }
    }
}

fn tag_row(mut row: Row, id: &EntityId) -> Row {
    row.insert(
        SOURCE_ID_FIELD.to_string(),
        Value::String(id.as_str().to_string()),
    );
    row
}

/// Batch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// An entity whose fetch failed
#[derive(Debug, Clone)]
pub struct EntityFailure {
    pub id: EntityId,
    pub error: FetchError,
}

/// Everything a batch run produced
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub kind: EntityKind,
    pub dataset: AggregatedDataset,
    pub summary: BatchSummary,
    pub failures: Vec<EntityFailure>,
}

/// Hook into a batch as each entity finishes
#[async_trait]
pub trait MergeObserver: Send {
    /// Called after `id`'s rows were merged; `fragment` holds just that entity's rows
    async fn entity_merged(&mut self, id: &EntityId, fragment: &AggregatedDataset);

    async fn entity_failed(&mut self, _id: &EntityId, _error: &FetchError) {}
}

struct NoopObserver;

#[async_trait]
impl MergeObserver for NoopObserver {
    async fn entity_merged(&mut self, _id: &EntityId, _fragment: &AggregatedDataset) {}
}

/// A spawned entity fetch, aborted if dropped before completion
struct FetchTask(JoinHandle<Result<DetailBundle, FetchError>>);

impl FetchTask {
    async fn join(mut self, id: &EntityId) -> Result<DetailBundle, FetchError> {
        match (&mut self.0).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(FetchError::network(
                id.as_str(),
                format!("fetch task did not finish: {}", err),
            )),
        }
    }
}

impl Drop for FetchTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drives a [`DetailFetcher`] over a list of entity IDs
#[derive(Debug, Clone)]
pub struct Aggregator {
    fetcher: DetailFetcher,
    concurrency: usize,
}

impl Aggregator {
    pub fn new(fetcher: DetailFetcher) -> Self {
        Self {
            fetcher,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` entity fetches in flight (minimum 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.fetcher.kind()
    }

    pub async fn run(&self, ids: &[EntityId]) -> BatchReport {
        self.run_observed(ids, &mut NoopObserver).await
    }

    pub async fn run_observed(
        &self,
        ids: &[EntityId],
        observer: &mut dyn MergeObserver,
    ) -> BatchReport {
        let kind = self.kind();
        let total = ids.len();

        let mut dataset = AggregatedDataset::new();
        let mut summary = BatchSummary::default();
        let mut failures = Vec::new();

        let mut results = stream::iter(ids.iter().enumerate())
            .map(|(idx, id)| {
                info!("Processing {} ID {} ({}/{})...", kind, id, idx + 1, total);
                let fetcher = self.fetcher.clone();
                let task_id = id.clone();
                // Spawned so in-flight fetches keep running while the observer works
                let handle = FetchTask(tokio::spawn(async move {
                    fetcher.fetch_detail(&task_id).await
                }));
                async move { (id, handle.join(id).await) }
            })
            .buffered(self.concurrency);

        while let Some((id, result)) = results.next().await {
            summary.attempted += 1;

            match result {
                Ok(bundle) => {
                    let fragment = AggregatedDataset::from_bundle(bundle);
                    observer.entity_merged(id, &fragment).await;
                    dataset.extend(fragment);
                    summary.succeeded += 1;
                }
                Err(err) => {
                    error!("Error processing {} ID {}: {}", kind, id, err);
                    observer.entity_failed(id, &err).await;
                    failures.push(EntityFailure {
                        id: id.clone(),
                        error: err,
                    });
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Completed processing {} {} IDs: {} succeeded, {} failed, {} rows across {} sub-resources",
            summary.attempted,
            kind,
            summary.succeeded,
            summary.failed,
            dataset.total_rows(),
            dataset.tables.len()
        );

        BatchReport {
            kind,
            dataset,
            summary,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedSource, mem_endpoints};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn ids(raw: &[&str]) -> Vec<EntityId> {
        raw.iter().map(|id| EntityId::from(*id)).collect()
    }

    fn source_ids(rows: &[Row]) -> Vec<&str> {
        rows.iter()
            .map(|row| row[SOURCE_ID_FIELD].as_str().unwrap())
            .collect()
    }

    fn aggregator(source: ScriptedSource, keys: &[&str]) -> Aggregator {
        Aggregator::new(DetailFetcher::new(
            Arc::new(source),
            mem_endpoints(EntityKind::Builder, keys),
        ))
    }

    #[tokio::test]
    async fn test_failed_entity_is_isolated() {
        let source = ScriptedSource::new()
            .respond("members", "A", json!([{"name": "a1"}]))
            .respond("members", "B", json!([{"name": "b1"}]))
            .respond("members", "C", json!([{"name": "c1"}, {"name": "c2"}]))
            .fail_entity("B");

        let report = aggregator(source, &["summary", "members"])
            .run(&ids(&["A", "B", "C"]))
            .await;

        assert_eq!(
            report.summary,
            BatchSummary {
                attempted: 3,
                succeeded: 2,
                failed: 1
            }
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id.as_str(), "B");

        let members = report.dataset.get("members").unwrap();
        assert_eq!(source_ids(members), vec!["A", "C", "C"]);
    }

    #[tokio::test]
    async fn test_source_id_overwrites_existing_field() {
        let source = ScriptedSource::new()
            .respond("summary", "B7", json!({"name": "Acme", "source_id": "registry"}))
            .respond("properties", "B7", json!([{"lot": 1, "source_id": 99}]));

        let report = aggregator(source, &["summary", "properties"])
            .run(&ids(&["B7"]))
            .await;

        for (_, rows) in report.dataset.iter() {
            for row in rows {
                assert_eq!(row[SOURCE_ID_FIELD], json!("B7"));
            }
        }
        assert_eq!(report.dataset.get("summary").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rows_follow_entity_then_payload_order() {
        let source = ScriptedSource::new()
            .respond("enrolments", "A", json!([{"n": 1}, {"n": 2}]))
            .respond("enrolments", "B", json!([{"n": 3}]));

        let report = aggregator(source, &["enrolments"])
            .run(&ids(&["A", "B"]))
            .await;

        let rows = report.dataset.get("enrolments").unwrap();
        let order: Vec<i64> = rows.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(source_ids(rows), vec!["A", "A", "B"]);
    }

    #[tokio::test]
    async fn test_empty_payloads_create_no_entries() {
        let source = ScriptedSource::new().respond("summary", "A", json!({"name": "Acme"}));

        let report = aggregator(source, &["summary", "convictions", "conditions"])
            .run(&ids(&["A", "B"]))
            .await;

        let keys: Vec<&str> = report.dataset.keys().collect();
        assert_eq!(keys, vec!["summary"]);
        assert_eq!(report.summary.succeeded, 2);
    }

    #[tokio::test]
    async fn test_non_object_list_items_are_wrapped() {
        let source = ScriptedSource::new().respond("conditions", "A", json!(["no building permits", 7]));

        let report = aggregator(source, &["conditions"]).run(&ids(&["A"])).await;

        let rows = report.dataset.get("conditions").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][WRAPPED_VALUE_FIELD], json!("no building permits"));
        assert_eq!(rows[1][WRAPPED_VALUE_FIELD], json!(7));
        assert_eq!(rows[1][SOURCE_ID_FIELD], json!("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_keep_merge_order() {
        let source = ScriptedSource::new()
            .respond("members", "A", json!([{"who": "a"}]))
            .respond("members", "B", json!([{"who": "b"}]))
            .respond("members", "C", json!([{"who": "c"}]))
            .delay("members", "A", Duration::from_millis(500))
            .delay("members", "B", Duration::from_millis(100))
            .delay("members", "C", Duration::from_millis(300));

        let started = tokio::time::Instant::now();
        let report = aggregator(source, &["members"])
            .with_concurrency(3)
            .run(&ids(&["A", "B", "C"]))
            .await;

        assert!(started.elapsed() < Duration::from_millis(900));
        let rows = report.dataset.get("members").unwrap();
        assert_eq!(source_ids(rows), vec!["A", "B", "C"]);
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    #[async_trait]
    impl MergeObserver for Recorder {
        async fn entity_merged(&mut self, id: &EntityId, fragment: &AggregatedDataset) {
            self.events.push(format!("ok:{}:{}", id, fragment.total_rows()));
        }

        async fn entity_failed(&mut self, id: &EntityId, _error: &FetchError) {
            self.events.push(format!("failed:{}", id));
        }
    }

    #[tokio::test]
    async fn test_observer_sees_each_entity_in_order() {
        let source = ScriptedSource::new()
            .respond("members", "X", json!([{"a": 1}, {"a": 2}]))
            .fail_entity("Y")
            .respond("members", "Z", json!({"a": 3}));

        let mut recorder = Recorder::default();
        aggregator(source, &["members"])
            .run_observed(&ids(&["X", "Y", "Z"]), &mut recorder)
            .await;

        assert_eq!(recorder.events, vec!["ok:X:2", "failed:Y", "ok:Z:1"]);
    }
    struct SlowWriter;

    #[async_trait]
    impl MergeObserver for SlowWriter {
        async fn entity_merged(&mut self, _id: &EntityId, _fragment: &AggregatedDataset) {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_in_flight_progress_during_slow_merge() {
        let source = Arc::new(
            ScriptedSource::new()
                .respond("members", "A", json!([{"who": "a"}]))
                .respond("members", "B", json!([{"who": "b"}]))
                .delay("members", "A", Duration::from_secs(1))
                .delay("members", "B", Duration::from_secs(5)),
        );
        let aggregator = Aggregator::new(DetailFetcher::new(
            source.clone(),
            mem_endpoints(EntityKind::Builder, &["members"]),
        ))
        .with_concurrency(2);

        let started = tokio::time::Instant::now();
        let report = aggregator
            .run_observed(&ids(&["A", "B"]), &mut SlowWriter)
            .await;

        let b_done = source.finished_at("members", "B").unwrap();
        assert!(b_done.duration_since(started) < Duration::from_secs(6));
        assert_eq!(source_ids(report.dataset.get("members").unwrap()), vec!["A", "B"]);
    }
}
