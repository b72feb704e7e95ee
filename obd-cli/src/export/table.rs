//! Flattening payloads into rectangular tables
//!
//! Rows from the registry do not share a field set, so columns are the union
//! of every row's fields in first-seen order; a row lacking a column gets null.

use serde_json::Value;

use crate::aggregate::AggregatedDataset;
use crate::api::models::json_type_name;
use crate::api::{DetailBundle, Payload, Row};
use crate::error::ExportError;

/// Key used when exporting a search result list
pub const SEARCH_RESULTS_KEY: &str = "Search_Results";

/// Raw data for one sub-resource
#[derive(Debug, Clone, Copy)]
pub enum SectionData<'a> {
    Payload(&'a Payload),
    Rows(&'a [Row]),
}

/// One exportable sub-resource
#[derive(Debug, Clone, Copy)]
pub struct Section<'a> {
    pub key: &'a str,
    pub data: SectionData<'a>,
}

impl<'a> Section<'a> {
    pub fn is_empty(&self) -> bool {
        match self.data {
            SectionData::Payload(payload) => payload.is_empty(),
            SectionData::Rows(rows) => rows.is_empty(),
        }
    }

    /// Flatten into a table; fails if a list element is not an object
    pub fn to_table(&self) -> Result<Table, ExportError> {
        match self.data {
            SectionData::Rows(rows) => Ok(Table::from_rows(rows.iter())),
            SectionData::Payload(Payload::Empty) => Ok(Table::default()),
            SectionData::Payload(Payload::Record(row)) => Ok(Table::from_rows(std::iter::once(row))),
            SectionData::Payload(Payload::List(items)) => {
                let mut rows = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    match item {
                        Value::Object(row) => rows.push(row),
                        other => {
                            return Err(ExportError::conversion(
                                self.key,
                                format!("element {} is a {}, expected an object", idx, json_type_name(other)),
                            ));
                        }
                    }
                }
                Ok(Table::from_rows(rows.into_iter()))
            }
        }
    }
}

/// Sections of a single entity's bundle, in fetch order
pub fn sections_from_bundle(bundle: &DetailBundle) -> Vec<Section<'_>> {
    bundle
        .iter()
        .map(|(key, payload)| Section {
            key,
            data: SectionData::Payload(payload),
        })
        .collect()
}

/// Sections of an aggregated dataset
pub fn sections_from_dataset(dataset: &AggregatedDataset) -> Vec<Section<'_>> {
    dataset
        .iter()
        .map(|(key, rows)| Section {
            key,
            data: SectionData::Rows(rows),
        })
        .collect()
}

/// Single section wrapping search results
pub fn search_section(rows: &[Row]) -> Section<'_> {
    Section {
        key: SEARCH_RESULTS_KEY,
        data: SectionData::Rows(rows),
    }
}

/// Column-unioned table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn from_rows<'r>(rows: impl Iterator<Item = &'r Row>) -> Self {
        let rows: Vec<&Row> = rows.collect();

        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for field in row.keys() {
                if !columns.iter().any(|c| c == field) {
                    columns.push(field.clone());
                }
            }
        }

        let cells = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| row.get(col).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self {
            columns,
            rows: cells,
        }
    }

    /// No columns or no rows: nothing to write
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows.is_empty()
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| &row[idx])
    }
}

/// Text rendering of a cell for text-based formats; null is an empty string
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
