//! SQLite export: one table per sub-resource in a shared database file
//!
//! Single-entity saves replace each table's contents. Master runs append
//! across runs and keep a `source_ids` tracking table: every ID is inserted
//! unprocessed when the batch starts and flipped to processed once its rows
//! are stored. A failed ID stays unprocessed, and later runs never touch an
//! earlier run's rows.
//!
//! The pool is opened once per export call and closed before returning,
//! whether the export succeeded or not.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use super::table::Table;
use super::{ExportReport, ExportSink, ExportTarget, Section, artifact_path, sanitize_identifier};
use crate::aggregate::{Aggregator, AggregatedDataset, BatchReport, MergeObserver, SOURCE_ID_FIELD};
use crate::api::{EntityId, EntityKind};
use crate::error::{ExportError, FetchError};

/// Name of the batch tracking table
pub const TRACKING_TABLE: &str = "source_ids";

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// How existing tables are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Drop and recreate the table
    Replace,
    /// Create if missing, add new columns, append rows
    Append,
}

/// Result of a master run: the batch itself plus what was persisted
#[derive(Debug)]
pub struct MasterRun {
    pub batch: BatchReport,
    pub export: ExportReport,
}

/// Writes `{base}_{label}.db` databases
#[derive(Debug, Clone)]
pub struct SqliteStore {
    directory: PathBuf,
    base: String,
}

impl SqliteStore {
    pub fn new(directory: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            base: base.into(),
        }
    }

    pub fn database_path(&self, target: &ExportTarget) -> PathBuf {
        artifact_path(&self.directory, &self.base, target, "db")
    }

    async fn open(&self, path: &Path) -> Result<SqlitePool> {
        std::fs::create_dir_all(&self.directory).with_context(|| {
            format!("Failed to create output directory: {}", self.directory.display())
        })?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))
    }

    /// Write sections as tables named after their (prefixed, sanitized) keys
    pub async fn write_sections(
        &self,
        target: &ExportTarget,
        sections: &[Section<'_>],
        mode: WriteMode,
        table_prefix: Option<&str>,
    ) -> Result<ExportReport> {
        let path = self.database_path(target);
        let pool = self.open(&path).await?;

        let mut report = ExportReport::default();
        for section in sections {
            let table_name = match table_prefix {
                Some(prefix) => sanitize_identifier(&format!("{}_{}", prefix, section.key)),
                None => sanitize_identifier(section.key),
            };
            write_section(&pool, section, &table_name, mode, &mut report).await;
        }

        pool.close().await;

        if !report.written.is_empty() {
            log::info!("SQLite database saved as: {}", path.display());
            report.add_artifact(path);
        }
        Ok(report)
    }

    /// Run a batch and persist each entity's rows as soon as it is merged.
    ///
    /// Tables are `{kind}_{key}` in append mode.
    pub async fn run_master(&self, aggregator: &Aggregator, ids: &[EntityId]) -> Result<MasterRun> {
        let kind = aggregator.kind();
        let path = self.database_path(&ExportTarget::Master(kind));
        let pool = self.open(&path).await?;

        let result = run_master_on(&pool, aggregator, ids).await;
        pool.close().await;

        let mut run = result?;
        run.export.add_artifact(path.clone());
        log::info!("Master database saved as: {}", path.display());
        Ok(run)
    }
}

#[async_trait]
impl ExportSink for SqliteStore {
    async fn export(&self, target: &ExportTarget, sections: &[Section<'_>]) -> Result<ExportReport> {
        match target {
            ExportTarget::Master(kind) => {
                self.write_sections(target, sections, WriteMode::Append, Some(kind.label()))
                    .await
            }
            ExportTarget::Entity(_) | ExportTarget::Labeled(_) => {
                self.write_sections(target, sections, WriteMode::Replace, None)
                    .await
            }
        }
    }
}

async fn run_master_on(pool: &SqlitePool, aggregator: &Aggregator, ids: &[EntityId]) -> Result<MasterRun> {
    let kind = aggregator.kind();
    let pending = register_batch(pool, kind, ids).await?;

    let mut writer = MasterWriter {
        pool,
        kind,
        pending,
        report: ExportReport::default(),
    };
    let batch = aggregator.run_observed(ids, &mut writer).await;

    Ok(MasterRun {
        batch,
        export: writer.report,
    })
}

/// Insert one unprocessed tracking row per ID.
///
/// Returns the rowids inserted for this run, per ID in input order, so only
/// this run's rows are ever marked processed.
async fn register_batch(
    pool: &SqlitePool,
    kind: EntityKind,
    ids: &[EntityId],
) -> Result<HashMap<EntityId, VecDeque<i64>>> {
    let mut tx = pool.begin().await.context("Failed to start transaction")?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (id TEXT NOT NULL, processed INTEGER NOT NULL DEFAULT 0, type TEXT NOT NULL, queued_at TEXT)",
        TRACKING_TABLE
    ))
    .execute(&mut *tx)
    .await
    .context("Failed to create tracking table")?;

    let queued_at = chrono::Utc::now().to_rfc3339();
    let mut pending: HashMap<EntityId, VecDeque<i64>> = HashMap::new();
    for id in ids {
        let inserted = sqlx::query(&format!(
            "INSERT INTO {} (id, processed, type, queued_at) VALUES (?, 0, ?, ?)",
            TRACKING_TABLE
        ))
        .bind(id.as_str())
        .bind(kind.label())
        .bind(&queued_at)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to register ID {}", id))?;

        pending
            .entry(id.clone())
            .or_default()
            .push_back(inserted.last_insert_rowid());
    }

    tx.commit().await.context("Failed to commit tracking rows")?;
    Ok(pending)
}

struct MasterWriter<'p> {
    pool: &'p SqlitePool,
    kind: EntityKind,
    /// Tracking rowids of this run not yet resolved
    pending: HashMap<EntityId, VecDeque<i64>>,
    report: ExportReport,
}

impl MasterWriter<'_> {
    fn next_tracking_row(&mut self, id: &EntityId) -> Option<i64> {
        self.pending.get_mut(id).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl MergeObserver for MasterWriter<'_> {
    async fn entity_merged(&mut self, id: &EntityId, fragment: &AggregatedDataset) {
        let errors_before = self.report.errors.len();
        for section in super::sections_from_dataset(fragment) {
            let table_name = sanitize_identifier(&format!("{}_{}", self.kind.label(), section.key));
            write_section(self.pool, &section, &table_name, WriteMode::Append, &mut self.report).await;
        }

        let Some(rowid) = self.next_tracking_row(id) else {
            return;
        };

        // Rows that never reached the store do not count as processed
        if self.report.errors.len() > errors_before {
            log::warn!(
                "{} ID {} left unprocessed in {}: not every sub-resource was stored",
                self.kind,
                id,
                TRACKING_TABLE
            );
            return;
        }

        let marked = sqlx::query(&format!(
            "UPDATE {} SET processed = 1 WHERE rowid = ?",
            TRACKING_TABLE
        ))
        .bind(rowid)
        .execute(self.pool)
        .await;

        if let Err(err) = marked {
            self.report.record_error(ExportError::persistence(TRACKING_TABLE, err));
        }
    }

    async fn entity_failed(&mut self, id: &EntityId, _error: &FetchError) {
        self.next_tracking_row(id);
        log::warn!("{} ID {} left unprocessed in {}", self.kind, id, TRACKING_TABLE);
    }
}

/// Convert and write one section, recording the outcome in `report`
async fn write_section(
    pool: &SqlitePool,
    section: &Section<'_>,
    table_name: &str,
    mode: WriteMode,
    report: &mut ExportReport,
) {
    if section.is_empty() {
        report.skipped.push(section.key.to_string());
        return;
    }

    let table = match section.to_table() {
        Ok(table) if table.is_empty() => {
            report.skipped.push(section.key.to_string());
            return;
        }
        Ok(table) => table,
        Err(err) => {
            report.record_error(err);
            return;
        }
    };

    match write_table(pool, table_name, &table, mode).await {
        Ok(count) => {
            log::info!("Saved {} data ({} records) to table '{}'", section.key, count, table_name);
            report.written.push((section.key.to_string(), count));
        }
        Err(err) => report.record_error(ExportError::persistence(section.key, err)),
    }
}

/// Write a table inside one transaction
pub async fn write_table(pool: &SqlitePool, table_name: &str, table: &Table, mode: WriteMode) -> Result<usize> {
    let mut tx = pool.begin().await.context("Failed to start transaction")?;
    let quoted = quote_ident(table_name);

    if mode == WriteMode::Replace {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to drop table {}", table_name))?;
    }

    let columns = sql_columns(&table.columns);
    let column_defs: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            format!(
                "{} {}",
                quote_ident(column),
                column_affinity(table.column_values(idx))
            )
        })
        .collect();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quoted,
        column_defs.join(", ")
    ))
    .execute(&mut *tx)
    .await
    .with_context(|| format!("Failed to create table {}", table_name))?;

    if mode == WriteMode::Append {
        widen_table(&mut tx, table_name, &columns, table).await?;
    }

    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quoted,
        column_list.join(", "),
        placeholders
    );

    for (idx, row) in table.rows.iter().enumerate() {
        let mut query = sqlx::query(&insert_sql);
        for value in row {
            query = bind_value(query, value);
        }
        query
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert row {} into {}", idx + 1, table_name))?;
    }

    tx.commit()
        .await
        .with_context(|| format!("Failed to commit table {}", table_name))?;

    Ok(table.rows.len())
}

/// Add columns the table does not have yet
async fn widen_table(
    tx: &mut Transaction<'_, Sqlite>,
    table_name: &str,
    columns: &[String],
    table: &Table,
) -> Result<()> {
    let existing: Vec<String> = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table_name)))
        .fetch_all(&mut **tx)
        .await
        .with_context(|| format!("Failed to read columns of {}", table_name))?
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<Result<_, _>>()?;

    for (idx, column) in columns.iter().enumerate() {
        if existing.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            continue;
        }

        log::debug!("Adding column '{}' to table '{}'", column, table_name);
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table_name),
            quote_ident(column),
            column_affinity(table.column_values(idx))
        ))
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to add column {} to {}", column, table_name))?;
    }

    Ok(())
}

/// Column names that are unique ignoring ASCII case, as SQLite requires.
///
/// In a group of names that differ only in case, `source_id` keeps its name,
/// otherwise the first one does; the rest get a numeric suffix.
fn sql_columns(columns: &[String]) -> Vec<String> {
    let keeper = |name: &str| {
        let lower = name.to_ascii_lowercase();
        columns
            .iter()
            .find(|c| c.as_str() == SOURCE_ID_FIELD && lower == SOURCE_ID_FIELD)
            .or_else(|| columns.iter().find(|c| c.to_ascii_lowercase() == lower))
            .map(String::as_str)
            == Some(name)
    };

    let mut taken: HashSet<String> = columns.iter().map(|c| c.to_ascii_lowercase()).collect();
    columns
        .iter()
        .map(|column| {
            if keeper(column) {
                return column.clone();
            }
            let mut n = 2;
            loop {
                let candidate = format!("{}_{}", column, n);
                if taken.insert(candidate.to_ascii_lowercase()) {
                    log::debug!("Column '{}' clashes ignoring case, stored as '{}'", column, candidate);
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

/// SQLite affinity from the first non-null value in a column
fn column_affinity<'v>(mut values: impl Iterator<Item = &'v Value>) -> &'static str {
    match values.find(|v| !v.is_null()) {
        Some(Value::Bool(_)) => "INTEGER",
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => "INTEGER",
        Some(Value::Number(_)) => "REAL",
        _ => "TEXT",
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
