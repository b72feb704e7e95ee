//! Command-line surface

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::api::EntityKind;

/// Harvest builder and umbrella records from the Ontario Builder Directory
#[derive(Parser, Debug)]
#[command(name = "obd-cli")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/obd-cli/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for exported files (overrides the config file)
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every sub-resource of one builder
    Builder(DetailArgs),

    /// Fetch every sub-resource of one umbrella organization
    Umbrella(DetailArgs),

    /// Fetch many entities and merge them into master artifacts
    Master(MasterArgs),

    /// Search the builder directory
    Search(SearchArgs),
}

#[derive(clap::Args, Debug)]
pub struct DetailArgs {
    /// Entity ID
    pub id: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Base name for artifacts (defaults to `<kind>_details`, or `<kind>_database` for sqlite)
    #[arg(long)]
    pub base: Option<String>,

    /// Print the fetched payloads as JSON instead of exporting
    #[arg(long)]
    pub print: bool,
}

#[derive(clap::Args, Debug)]
pub struct MasterArgs {
    /// Entity kind of every ID
    #[arg(short, long, value_enum)]
    pub kind: KindArg,

    /// Entity IDs, processed in the given order
    #[arg(required_unless_present = "ids_file")]
    pub ids: Vec<String>,

    /// File with one entity ID per line
    #[arg(long)]
    pub ids_file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Sqlite)]
    pub format: OutputFormat,

    /// Base name of the master database (defaults to the kind)
    #[arg(long)]
    pub db_name: Option<String>,

    /// Entities fetched at the same time (overrides the config file)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    /// Builder licence number
    #[arg(long)]
    pub number: Option<String>,

    #[arg(long)]
    pub officer: Option<String>,

    /// Umbrella company name
    #[arg(long)]
    pub umbrella: Option<String>,

    #[arg(long)]
    pub licence_status: Option<String>,

    #[arg(long)]
    pub years_active: Option<String>,

    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Export results instead of printing them
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Xlsx,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Builder,
    Umbrella,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Builder => EntityKind::Builder,
            KindArg::Umbrella => EntityKind::Umbrella,
        }
    }
}
