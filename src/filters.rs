//! Dropdown filter data
//!
//! Option lists for each hierarchy level and the list of years available
//! across the KPI tables.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::database::{integral_value, DataSource, Ident, Row, Select, SortOrder, SqlValue};
use crate::error::{QueryError, QueryResult};
use crate::hierarchy::{parse_integer, Hierarchy};
use crate::kpi::{FilterSet, YEAR_COLUMN};
use crate::validator::HierarchyValidator;

/// One entry of a level dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoOption {
    pub id: i64,
    pub name: String,
}

#[derive(Clone)]
pub struct FilterService {
    hierarchy: Arc<Hierarchy>,
    validator: HierarchyValidator,
    geo_source: Arc<dyn DataSource>,
    kpi_source: Arc<dyn DataSource>,
    year_tables: Vec<Ident>,
}

impl FilterService {
    pub fn new(
        hierarchy: Arc<Hierarchy>,
        validator: HierarchyValidator,
        geo_source: Arc<dyn DataSource>,
        kpi_source: Arc<dyn DataSource>,
        year_tables: Vec<Ident>,
    ) -> Self {
        Self {
            hierarchy,
            validator,
            geo_source,
            kpi_source,
            year_tables,
        }
    }

    /// Options for the level whose slug is `slug`, sorted by name.
    ///
    /// The root level lists everything. Any other level requires its parent
    /// level's parameter, which must name an existing parent row.
    #[instrument(skip(self, filters))]
    pub async fn list_level(&self, slug: &str, filters: &FilterSet) -> QueryResult<Vec<GeoOption>> {
        let (depth, level) = self
            .hierarchy
            .by_slug(slug)
            .ok_or_else(|| QueryError::UnknownMetric {
                what: "filter level",
                name: slug.to_string(),
            })?;

        let mut select = Select::new(level.table)
            .columns([level.id_column, level.name_column])
            .order_by(level.name_column, SortOrder::Asc);

        if let (Some(parent), Some(parent_column)) = (self.hierarchy.parent_of(depth), level.parent_column) {
            let raw = filters
                .get(parent.param)
                .ok_or_else(|| QueryError::missing(parent.param))?;
            let node = self
                .validator
                .validate(parent, Some(raw), None)
                .await?
                .ok_or_else(|| QueryError::missing(parent.param))?;
            select = select.filter(parent_column, SqlValue::Int(node.id));
        }

        let rows = self.geo_source.fetch_all(&select).await?;
        Ok(rows
            .iter()
            .filter_map(|row| to_option(row, level.id_column, level.name_column))
            .collect())
    }

    /// Distinct years across every KPI table, newest first.
    #[instrument(skip(self))]
    pub async fn list_years(&self) -> QueryResult<Vec<String>> {
        let mut years = BTreeSet::new();

        for table in &self.year_tables {
            let select = Select::new(*table).distinct().column(YEAR_COLUMN);
            let rows = self.kpi_source.fetch_all(&select).await.map_err(|source| {
                if source.is_schema_drift() {
                    warn!(table = %table, "Year column lookup failed: {}", source);
                    QueryError::SchemaMismatch {
                        tables_checked: self.year_tables.iter().map(|t| t.to_string()).collect(),
                        source,
                    }
                } else {
                    QueryError::DataSource(source)
                }
            })?;

            years.extend(rows.iter().filter_map(|row| year_of(row.get(YEAR_COLUMN.as_str()))));
        }

        Ok(years.into_iter().rev().map(|y| y.to_string()).collect())
    }
}

fn to_option(row: &Row, id_column: Ident, name_column: Ident) -> Option<GeoOption> {
    let id = match row.get(id_column.as_str())? {
        Value::Number(n) => integral_value(n)?,
        _ => return None,
    };
    let name = match row.get(name_column.as_str()) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Some(GeoOption { id, name })
}

fn year_of(cell: Option<&Value>) -> Option<i64> {
    match cell? {
        Value::Number(n) => integral_value(n),
        Value::String(s) => parse_integer(s.trim()),
        _ => None,
    }
}
