//! Ontario Builder Directory harvester
//!
//! Fetches every sub-resource of a builder or umbrella organization
//! concurrently, merges many entities into one tagged dataset and exports the
//! result as CSV, XLSX or SQLite.

pub mod aggregate;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod fetcher;

#[cfg(test)]
mod testing;

pub use aggregate::{AggregatedDataset, Aggregator, BatchReport, BatchSummary, MergeObserver};
pub use config::HarvestConfig;
pub use error::{ExportError, FetchError};
pub use fetcher::DetailFetcher;
