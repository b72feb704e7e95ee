//! Command handlers

pub mod detail;
pub mod master;
pub mod search;

use anyhow::Result;
use colored::*;
use std::path::{Path, PathBuf};

use super::{Cli, Commands, OutputFormat};
use crate::api::EntityKind;
use crate::config::HarvestConfig;
use crate::export::{CsvExporter, ExcelExporter, ExportReport, ExportSink, SqliteStore};

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = HarvestConfig::load(cli.config.as_deref())?;
    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output.directory.clone());

    match cli.command {
        Commands::Builder(args) => {
            detail::handle_detail_command(EntityKind::Builder, args, &config, &output_dir).await
        }
        Commands::Umbrella(args) => {
            detail::handle_detail_command(EntityKind::Umbrella, args, &config, &output_dir).await
        }
        Commands::Master(args) => master::handle_master_command(args, &config, &output_dir).await,
        Commands::Search(args) => search::handle_search_command(args, &config, &output_dir).await,
    }
}

pub(crate) fn sink_for(format: OutputFormat, directory: &Path, base: &str) -> Box<dyn ExportSink> {
    let directory = PathBuf::from(directory);
    match format {
        OutputFormat::Csv => Box::new(CsvExporter::new(directory, base)),
        OutputFormat::Xlsx => Box::new(ExcelExporter::new(directory, base)),
        OutputFormat::Sqlite => Box::new(SqliteStore::new(directory, base)),
    }
}

pub(crate) fn print_export_report(report: &ExportReport) {
    if report.artifacts.is_empty() && report.written.is_empty() {
        println!("{}", "No data was collected to save".yellow());
    }

    for (key, rows) in &report.written {
        println!("  {} {} ({} records)", "✓".green(), key, rows);
    }
    for key in &report.skipped {
        println!("  {} {} (no data)", "-".dimmed(), key.dimmed());
    }
    for err in &report.errors {
        println!("  {} {}", "✗".red(), err);
    }
    for path in &report.artifacts {
        println!("Saved to: {}", path.display().to_string().bright_green());
    }
}
