//! Excel export: one workbook, one sheet per sub-resource
//!
//! Sheet names are the sub-resource key cut to 31 characters. A sheet is only
//! added to the workbook once all of its cells were written, so a failing
//! sub-resource leaves no half-written sheet behind.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;

use super::table::Table;
use super::{ExportReport, ExportSink, ExportTarget, Section, artifact_path, section_name};
use crate::error::ExportError;

/// Writes `{base}_{label}.xlsx`
#[derive(Debug, Clone)]
pub struct ExcelExporter {
    directory: PathBuf,
    base: String,
}

impl ExcelExporter {
    pub fn new(directory: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            base: base.into(),
        }
    }

    pub fn write_workbook(&self, target: &ExportTarget, sections: &[Section<'_>]) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        let mut workbook = Workbook::new();
        let mut used_names: HashSet<String> = HashSet::new();

        let header_format = Format::new()
            .set_bold()
            .set_background_color(Color::RGB(0x4472C4))
            .set_font_color(Color::White);

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

            let sheet_name = section_name(section.key);
            // Excel compares sheet names case-insensitively
            if !used_names.insert(sheet_name.to_lowercase()) {
                report.record_error(ExportError::conversion(
                    section.key,
                    format!("sheet name '{}' is already used by another sub-resource", sheet_name),
                ));
                continue;
            }

            match build_sheet(&sheet_name, &table, &header_format) {
                Ok(sheet) => {
                    workbook.push_worksheet(sheet);
                    log::info!(
                        "Saved {} data ({} records) to sheet '{}'",
                        section.key,
                        table.rows.len(),
                        sheet_name
                    );
                    report.written.push((section.key.to_string(), table.rows.len()));
                }
                Err(err) => {
                    used_names.remove(&sheet_name.to_lowercase());
                    report.record_error(ExportError::persistence(section.key, err));
                }
            }
        }

        if report.written.is_empty() {
            log::warn!("No data was collected to save to Excel");
            return Ok(report);
        }

        std::fs::create_dir_all(&self.directory).with_context(|| {
            format!("Failed to create output directory: {}", self.directory.display())
        })?;

        let path = artifact_path(&self.directory, &self.base, target, "xlsx");
        workbook
            .save(&path)
            .with_context(|| format!("Failed to save Excel file to {:?}", path))?;

        log::info!("Excel file saved as: {}", path.display());
        report.add_artifact(path);
        Ok(report)
    }
}

#[async_trait]
impl ExportSink for ExcelExporter {
    async fn export(&self, target: &ExportTarget, sections: &[Section<'_>]) -> Result<ExportReport> {
        self.write_workbook(target, sections)
    }
}

fn build_sheet(name: &str, table: &Table, header_format: &Format) -> Result<Worksheet, XlsxError> {
    let mut sheet = Worksheet::new();
    sheet.set_name(name)?;

    for (col, column) in table.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, column, header_format)?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        let row_num = (row_idx + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            write_value(&mut sheet, row_num, col as u16, value)?;
        }
    }

    sheet.autofit();
    Ok(sheet)
}

fn write_value(ws: &mut Worksheet, row: u32, col: u16, value: &Value) -> Result<(), XlsxError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            ws.write_boolean(row, col, *b)?;
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) => {
                ws.write_number(row, col, f)?;
            }
            None => {
                ws.write_string(row, col, n.to_string())?;
            }
        },
        Value::String(s) => {
            ws.write_string(row, col, s)?;
        }
        Value::Array(_) | Value::Object(_) => {
            ws.write_string(row, col, value.to_string())?;
        }
    }
    Ok(())
}
