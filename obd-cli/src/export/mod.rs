//! Export sinks for detail bundles and aggregated datasets
//!
//! Three interchangeable outputs share the same rules: empty sub-resources
//! produce no artifact, and a failure on one sub-resource is reported without
//! stopping the others.

pub mod csv_exporter;
pub mod excel_exporter;
pub mod sqlite_store;
pub mod table;

pub use csv_exporter::CsvExporter;
pub use excel_exporter::ExcelExporter;
pub use sqlite_store::{SqliteStore, WriteMode};
pub use table::{
    SEARCH_RESULTS_KEY, Section, SectionData, Table, search_section, sections_from_bundle,
    sections_from_dataset,
};

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::api::{EntityId, EntityKind};
use crate::error::ExportError;

/// Maximum sheet name length accepted by spreadsheet formats
pub const MAX_SECTION_NAME_LEN: usize = 31;

/// Label used in place of an entity ID for batch artifacts
pub const MASTER_LABEL: &str = "master";

/// What an export is for: one entity, a batch run, or a free-form label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    Entity(EntityId),
    Master(EntityKind),
    Labeled(String),
}

impl ExportTarget {
    /// The `{ID}` part of artifact names
    pub fn label(&self) -> &str {
        match self {
            ExportTarget::Entity(id) => id.as_str(),
            ExportTarget::Master(_) => MASTER_LABEL,
            ExportTarget::Labeled(label) => label,
        }
    }
}

/// Outcome of one export call
#[derive(Debug, Default)]
pub struct ExportReport {
    /// Files created or updated
    pub artifacts: Vec<PathBuf>,
    /// (sub-resource key, rows written)
    pub written: Vec<(String, usize)>,
    /// Keys skipped because they had no rows
    pub skipped: Vec<String>,
    pub errors: Vec<ExportError>,
}

impl ExportReport {
    pub fn rows_written(&self) -> usize {
        self.written.iter().map(|(_, n)| n).sum()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub(crate) fn record_error(&mut self, err: ExportError) {
        log::error!("Error saving {}: {}", err.key(), err);
        self.errors.push(err);
    }

    pub(crate) fn add_artifact(&mut self, path: PathBuf) {
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path);
        }
    }
}

/// A destination for exported sections
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Write every non-empty section. Per-section failures land in the report;
    /// an `Err` means the sink could not run at all.
    async fn export(&self, target: &ExportTarget, sections: &[Section<'_>]) -> Result<ExportReport>;
}

/// Replace every non-alphanumeric character with an underscore
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Spreadsheet section name for a key: forbidden characters replaced, cut to 31 characters
pub fn section_name(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .take(MAX_SECTION_NAME_LEN)
        .collect()
}

/// `{dir}/{base}_{label}.{ext}`
pub fn artifact_path(dir: &Path, base: &str, target: &ExportTarget, ext: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", base, target.label(), ext))
}

/// `{dir}/{base}_{label}_{key}.{ext}` with the key sanitized
pub fn section_path(dir: &Path, base: &str, target: &ExportTarget, key: &str, ext: &str) -> PathBuf {
    dir.join(format!(
        "{}_{}_{}.{}",
        base,
        target.label(),
        sanitize_identifier(key),
        ext
    ))
}
