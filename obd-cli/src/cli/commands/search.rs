//! `search`: query the builder directory

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;

use super::{print_export_report, sink_for};
use crate::api::SearchCriteria;
use crate::cli::SearchArgs;
use crate::config::HarvestConfig;
use crate::export::{ExportTarget, search_section};

const SEARCH_BASE: &str = "builder_search";

pub async fn handle_search_command(args: SearchArgs, config: &HarvestConfig, output_dir: &Path) -> Result<()> {
    let criteria = criteria_from_args(&args);
    let client = config.client()?;

    let rows = client
        .search_builders(&criteria)
        .await
        .context("Builder search failed")?;

    println!("Found {} builders on page {}", rows.len().to_string().cyan(), criteria.page.max(1));

    match args.format {
        Some(format) => {
            let target = ExportTarget::Labeled(format!("page{}", criteria.page.max(1)));
            let report = sink_for(format, output_dir, SEARCH_BASE)
                .export(&target, &[search_section(&rows)])
                .await?;
            print_export_report(&report);
        }
        None => {
            let json = serde_json::to_string_pretty(&rows).context("Failed to format JSON output")?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn criteria_from_args(args: &SearchArgs) -> SearchCriteria {
    SearchCriteria {
        builder_name: args.name.clone(),
        builder_location: args.location.clone(),
        builder_num: args.number.clone(),
        officer_director: args.officer.clone(),
        umbrella_co: args.umbrella.clone(),
        licence_status: args.licence_status.clone(),
        years_active: args.years_active.clone(),
        page: args.page,
    }
}
