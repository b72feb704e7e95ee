//! `master`: batch many entities into one set of master artifacts

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;
use std::sync::Arc;

use super::{print_export_report, sink_for};
use crate::aggregate::{Aggregator, BatchReport};
use crate::api::{EntityId, EntityKind};
use crate::cli::{MasterArgs, OutputFormat};
use crate::config::HarvestConfig;
use crate::export::{ExportTarget, SqliteStore, sections_from_dataset};
use crate::fetcher::DetailFetcher;

pub async fn handle_master_command(args: MasterArgs, config: &HarvestConfig, output_dir: &Path) -> Result<()> {
    let kind: EntityKind = args.kind.into();

    let mut raw_ids = args.ids.clone();
    if let Some(path) = &args.ids_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ID file: {}", path.display()))?;
        raw_ids.extend(content.lines().map(String::from));
    }
    let ids = parse_ids(&raw_ids);
    if ids.is_empty() {
        anyhow::bail!("No entity IDs given");
    }

    let concurrency = args
        .concurrency
        .unwrap_or(config.resilience_config().entity_concurrency);
    let client = config.client()?;
    let aggregator = Aggregator::new(DetailFetcher::new(Arc::new(client), config.endpoints(kind)))
        .with_concurrency(concurrency);

    println!(
        "Processing {} {} IDs ({} at a time)",
        ids.len(),
        kind,
        concurrency.max(1)
    );

    let base = args.db_name.clone().unwrap_or_else(|| kind.label().to_string());

    let (batch, export) = match args.format {
        OutputFormat::Sqlite => {
            let run = SqliteStore::new(output_dir, base)
                .run_master(&aggregator, &ids)
                .await?;
            (run.batch, run.export)
        }
        format => {
            let batch = aggregator.run(&ids).await;
            let export = sink_for(format, output_dir, &base)
                .export(&ExportTarget::Master(kind), &sections_from_dataset(&batch.dataset))
                .await?;
            (batch, export)
        }
    };

    print_batch_summary(&batch);
    print_export_report(&export);
    Ok(())
}

/// Trimmed, non-empty IDs in input order
fn parse_ids(raw: &[String]) -> Vec<EntityId> {
    raw.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(EntityId::from)
        .collect()
}

fn print_batch_summary(batch: &BatchReport) {
    let summary = &batch.summary;
    println!();
    println!(
        "{} attempted, {} succeeded, {} failed",
        summary.attempted,
        summary.succeeded.to_string().green(),
        if summary.failed > 0 {
            summary.failed.to_string().red()
        } else {
            summary.failed.to_string().normal()
        }
    );

    for failure in &batch.failures {
        println!("  {} {}: {}", "✗".red(), failure.id, failure.error);
    }
}
