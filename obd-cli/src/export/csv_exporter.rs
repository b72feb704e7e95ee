//! CSV export: one file per sub-resource

use anyhow::{Context, Result};
use async_trait::async_trait;
use csv::Writer;
use std::path::{Path, PathBuf};

use super::table::{Table, cell_text};
use super::{ExportReport, ExportSink, ExportTarget, Section, section_path};
use crate::error::ExportError;

/// Writes `{base}_{label}_{key}.csv` files into a directory
#[derive(Debug, Clone)]
pub struct CsvExporter {
    directory: PathBuf,
    base: String,
}

impl CsvExporter {
    pub fn new(directory: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            base: base.into(),
        }
    }

    /// Write every non-empty section, isolating per-section failures
    pub fn write_sections(&self, target: &ExportTarget, sections: &[Section<'_>]) -> Result<ExportReport> {
        std::fs::create_dir_all(&self.directory).with_context(|| {
            format!("Failed to create output directory: {}", self.directory.display())
        })?;

        let mut report = ExportReport::default();

        for section in sections {
            if section.is_empty() {
                report.skipped.push(section.key.to_string());
                continue;
            }

            let table = match section.to_table() {
                Ok(table) if table.is_empty() => {
                    report.skipped.push(section.key.to_string());
                    continue;
                }
                Ok(table) => table,
                Err(err) => {
                    report.record_error(err);
                    continue;
                }
            };

            let path = section_path(&self.directory, &self.base, target, section.key, "csv");
            match write_table(&path, &table) {
                Ok(()) => {
                    log::info!(
                        "Saved {} data ({} records) to {}",
                        section.key,
                        table.rows.len(),
                        path.display()
                    );
                    report.written.push((section.key.to_string(), table.rows.len()));
                    report.add_artifact(path);
                }
                Err(err) => report.record_error(ExportError::persistence(section.key, err)),
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl ExportSink for CsvExporter {
    async fn export(&self, target: &ExportTarget, sections: &[Section<'_>]) -> Result<ExportReport> {
        self.write_sections(target, sections)
    }
}

fn write_table(path: &Path, table: &Table) -> Result<()> {
    let mut wtr = Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

    wtr.write_record(&table.columns)
        .context("Failed to write CSV header")?;

    for (idx, row) in table.rows.iter().enumerate() {
        wtr.write_record(row.iter().map(cell_text))
            .with_context(|| format!("Failed to write row {}", idx + 1))?;
    }

    wtr.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregatedDataset;
    use crate::api::{DetailBundle, EntityKind, Payload};
    use crate::export::{sections_from_bundle, sections_from_dataset};
    use serde_json::json;

    fn read_csv(path: &Path) -> Vec<Vec<String>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        rdr.records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    fn bundle() -> DetailBundle {
        let mut bundle = DetailBundle::new("B42".into(), EntityKind::Builder);
        bundle.insert(
            "summary",
            Payload::from_json(json!({"name": "Acme Homes", "licensed": true})).unwrap(),
        );
        bundle.insert("convictions", Payload::Empty);
        bundle.insert("conditions", Payload::List(vec![json!("not a row")]));
        bundle.insert(
            "condo-Projects",
            Payload::from_json(json!([
                {"project": "Tower A", "units": 120},
                {"project": "Tower B", "phase": 2}
            ]))
            .unwrap(),
        );
        bundle
    }

    #[test]
    fn test_single_entity_files() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path(), "builder_details");
        let bundle = bundle();

        let report = exporter
            .write_sections(&ExportTarget::Entity("B42".into()), &sections_from_bundle(&bundle))
            .unwrap();

        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(report.skipped, vec!["convictions"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].key(), "conditions");

        let summary = dir.path().join("builder_details_B42_summary.csv");
        assert_eq!(
            read_csv(&summary),
            vec![
                vec!["name".to_string(), "licensed".to_string()],
                vec!["Acme Homes".to_string(), "true".to_string()],
            ]
        );

        let condos = read_csv(&dir.path().join("builder_details_B42_condo_Projects.csv"));
        assert_eq!(condos[0], vec!["project", "units", "phase"]);
        assert_eq!(condos[2], vec!["Tower B", "", "2"]);
        assert!(!dir.path().join("builder_details_B42_convictions.csv").exists());
    }

    #[tokio::test]
    async fn test_master_files_through_sink_trait() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path().join("nested"), "umbrella");

        let mut dataset = AggregatedDataset::new();
        let mut rows = vec![];
        for id in ["U1", "U2"] {
            let mut row = serde_json::Map::new();
            row.insert("name".into(), json!(format!("member of {}", id)));
            row.insert("source_id".into(), json!(id));
            rows.push(row);
        }
        dataset.append("members", rows);

        let sink: &dyn ExportSink = &exporter;
        let report = sink
            .export(
                &ExportTarget::Master(EntityKind::Umbrella),
                &sections_from_dataset(&dataset),
            )
            .await
            .unwrap();

        assert_eq!(report.rows_written(), 2);
        let path = dir.path().join("nested").join("umbrella_master_members.csv");
        let lines = read_csv(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], vec!["member of U2", "U2"]);
    }
}
