//! In-memory data source
//!
//! Evaluates the same `Select` model as `PgDataSource` against tables held
//! in memory. Tests and local fixtures use it in place of a live database;
//! it reports missing tables and columns the way PostgreSQL does so schema
//! drift paths can be exercised.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use super::{DataSource, Row, Select, SortOrder};
use crate::error::DataSourceError;

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Default)]
pub struct MemoryDataSource {
    label: String,
    tables: RwLock<BTreeMap<String, Table>>,
    queries: AtomicUsize,
    failure: RwLock<Option<DataSourceError>>,
}

impl MemoryDataSource {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Declare a table and its columns. Existing rows are discarded.
    pub fn create_table(&self, table: &str, columns: &[&str]) -> &Self {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.insert(
            table.to_string(),
            Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    /// Append one row given as a JSON object. Unknown keys are ignored and
    /// missing columns are stored as NULL.
    pub fn insert(&self, table: &str, row: Value) -> &Self {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        if let Some(t) = tables.get_mut(table) {
            let mut stored = Row::new();
            for column in &t.columns {
                stored.insert(column.clone(), row.get(column).cloned().unwrap_or(Value::Null));
            }
            t.rows.push(stored);
        }
        self
    }

    /// Make every subsequent query fail with `err`.
    pub fn fail_with(&self, err: DataSourceError) {
        *self.failure.write().unwrap_or_else(|e| e.into_inner()) = Some(err);
    }

    /// Number of queries executed so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check_column(table: &str, t: &Table, column: &str) -> Result<(), DataSourceError> {
        if t.columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(DataSourceError::UndefinedColumn(format!(
                "column \"{}\" does not exist in \"{}\"",
                column, table
            )))
        }
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_all(&self, select: &Select) -> Result<Vec<Row>, DataSourceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.failure.read().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(err);
        }

        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let name = select.table.as_str();
        let table = tables.get(name).ok_or_else(|| {
            DataSourceError::UndefinedTable(format!("relation \"{}\" does not exist", name))
        })?;

        let referenced = select
            .columns
            .iter()
            .chain(select.filters.iter().map(|(c, _)| c))
            .chain(select.order_by.iter().map(|(c, _)| c));
        for column in referenced {
            Self::check_column(name, table, column.as_str())?;
        }

        let mut rows: Vec<Row> = table
            .rows
            .iter()
            .filter(|row| {
                select.filters.iter().all(|(column, value)| {
                    row.get(column.as_str())
                        .map(|cell| value.matches(cell))
                        .unwrap_or(false)
                })
            })
            .cloned()
            .collect();

        for (column, order) in select.order_by.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare_cells(a.get(column.as_str()), b.get(column.as_str()));
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        let mut projected: Vec<Row> = rows
            .into_iter()
            .map(|row| {
                select
                    .columns
                    .iter()
                    .map(|c| {
                        let key = c.as_str().to_string();
                        let value = row.get(c.as_str()).cloned().unwrap_or(Value::Null);
                        (key, value)
                    })
                    .collect()
            })
            .collect();

        if select.distinct {
            let mut seen = HashSet::new();
            projected.retain(|row| seen.insert(Value::Object(row.clone()).to_string()));
        }

        Ok(projected)
    }

    async fn ping(&self) -> Result<(), DataSourceError> {
        match self.failure.read().unwrap_or_else(|e| e.into_inner()).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        // NULLs sort last, as in PostgreSQL ascending order.
        (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
        (Some(Value::Null) | None, _) => Ordering::Greater,
        (_, Some(Value::Null) | None) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
