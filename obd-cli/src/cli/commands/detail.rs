//! `builder` / `umbrella`: fetch one entity and export it

use anyhow::{Context, Result};
use colored::*;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::{print_export_report, sink_for};
use crate::api::{DetailBundle, EntityId, EntityKind};
use crate::cli::{DetailArgs, OutputFormat};
use crate::config::HarvestConfig;
use crate::export::{ExportTarget, sections_from_bundle};
use crate::fetcher::DetailFetcher;

pub async fn handle_detail_command(
    kind: EntityKind,
    args: DetailArgs,
    config: &HarvestConfig,
    output_dir: &Path,
) -> Result<()> {
    let client = config.client()?;
    let fetcher = DetailFetcher::new(Arc::new(client), config.endpoints(kind));
    let id = EntityId::new(args.id.trim());
    if id.as_str().is_empty() {
        anyhow::bail!("Entity ID must not be empty");
    }

    println!("Fetching {} {}...", kind, id.as_str().cyan());
    let start = Instant::now();

    let bundle = fetcher
        .fetch_detail(&id)
        .await
        .with_context(|| format!("Failed to fetch {} {}", kind, id))?;

    println!(
        "Fetched {} sub-resources in {:.2}s",
        bundle.len(),
        start.elapsed().as_secs_f64()
    );

    if args.print {
        let json = serde_json::to_string_pretty(&bundle_json(&bundle))
            .context("Failed to format JSON output")?;
        println!("{}", json);
        return Ok(());
    }

    let base = args.base.unwrap_or_else(|| default_base(kind, args.format));
    let sink = sink_for(args.format, output_dir, &base);
    let report = sink
        .export(&ExportTarget::Entity(id), &sections_from_bundle(&bundle))
        .await?;

    print_export_report(&report);
    Ok(())
}

fn default_base(kind: EntityKind, format: OutputFormat) -> String {
    match format {
        OutputFormat::Sqlite => format!("{}_database", kind.label()),
        OutputFormat::Csv | OutputFormat::Xlsx => format!("{}_details", kind.label()),
    }
}

fn bundle_json(bundle: &DetailBundle) -> Value {
    let map: Map<String, Value> = bundle
        .iter()
        .map(|(key, payload)| (key.to_string(), payload.to_json()))
        .collect();
    Value::Object(map)
}
