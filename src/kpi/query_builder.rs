//! KPI query construction
//!
//! Turns a request's filter set into a single parameter-bound select against
//! a catalog table. Geographic filters are validated root-first through the
//! `HierarchyValidator`, each level constrained by the level above it, so an
//! inconsistent combination fails before the KPI table is read.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::catalog::{AnchorPolicy, KpiDefinition, Shape, YEAR_COLUMN};
use crate::database::{DataSource, Row, Select, SortOrder, SqlValue};
use crate::error::{QueryError, QueryResult};
use crate::hierarchy::{parse_integer, Hierarchy};
use crate::validator::HierarchyValidator;

pub const YEAR_PARAM: &str = "year";

/// Request-scoped filters taken from the query string.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    params: HashMap<String, String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: HashMap<String, String>) -> Self {
        Self { params }
    }

    pub fn with(mut self, param: &str, value: impl Into<String>) -> Self {
        self.params.insert(param.to_string(), value.into());
        self
    }

    /// A parameter's raw value; empty strings count as absent.
    pub fn get(&self, param: &str) -> Option<&str> {
        self.params
            .get(param)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// The mandatory `year` filter, parsed.
    pub fn year(&self) -> QueryResult<i64> {
        let raw = self
            .get(YEAR_PARAM)
            .ok_or_else(|| QueryError::missing(YEAR_PARAM))?;
        parse_integer(raw).ok_or_else(|| QueryError::InvalidYearFormat {
            raw: raw.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub value: Value,
}

/// Query result, serialized as a bare JSON array either way.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KpiRows {
    Series(Vec<SeriesPoint>),
    Raw(Vec<Row>),
}

impl KpiRows {
    pub fn len(&self) -> usize {
        match self {
            Self::Series(points) => points.len(),
            Self::Raw(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct KpiQueryBuilder {
    hierarchy: Arc<Hierarchy>,
    validator: HierarchyValidator,
    kpi_source: Arc<dyn DataSource>,
}

impl KpiQueryBuilder {
    pub fn new(
        hierarchy: Arc<Hierarchy>,
        validator: HierarchyValidator,
        kpi_source: Arc<dyn DataSource>,
    ) -> Self {
        Self {
            hierarchy,
            validator,
            kpi_source,
        }
    }

    /// Validate `filters` and build the select for `metric` without running it.
    pub async fn prepare(&self, metric: &KpiDefinition, filters: &FilterSet) -> QueryResult<Select> {
        let year = filters.year()?;
        self.check_anchor(metric.anchor, filters)?;

        let mut select = Select::new(metric.table)
            .columns(metric.columns.iter().copied())
            .filter(YEAR_COLUMN, SqlValue::Int(year));

        let mut parent_raw: Option<&str> = None;
        for level in self.hierarchy.levels() {
            let raw = filters.get(level.param);
            if let Some(node) = self.validator.validate(level, raw, parent_raw).await? {
                select = select.filter(level.id_column, SqlValue::Int(node.id));
            }
            parent_raw = raw;
        }

        if let Some(column) = metric.order_by {
            select = select.order_by(column, SortOrder::Asc);
        }

        Ok(select)
    }

    /// Validate, query and shape one KPI request.
    #[instrument(skip(self, metric, filters), fields(metric = metric.slug))]
    pub async fn build_and_run(&self, metric: &KpiDefinition, filters: &FilterSet) -> QueryResult<KpiRows> {
        let select = self.prepare(metric, filters).await?;
        let year = filters.year()?;

        let rows = self.kpi_source.fetch_all(&select).await?;
        debug!(rows = rows.len(), "KPI query returned");

        Ok(shape_rows(metric.shape, year, rows))
    }

    fn check_anchor(&self, policy: AnchorPolicy, filters: &FilterSet) -> QueryResult<()> {
        let root = self.hierarchy.root().param;
        let leaf = self.hierarchy.leaf().param;

        let missing = match policy {
            AnchorPolicy::None => None,
            AnchorPolicy::Root => filters.get(root).is_none().then(|| root.to_string()),
            AnchorPolicy::Leaf => filters.get(leaf).is_none().then(|| leaf.to_string()),
            AnchorPolicy::RootOrLeaf => (filters.get(root).is_none() && filters.get(leaf).is_none())
                .then(|| format!("{} or {}", root, leaf)),
        };

        match missing {
            Some(param) => Err(QueryError::MissingRequiredFilter { param }),
            None => Ok(()),
        }
    }
}

/// Map raw rows onto the metric's presentation shape.
pub fn shape_rows(shape: Shape, year: i64, rows: Vec<Row>) -> KpiRows {
    match shape {
        Shape::Raw => KpiRows::Raw(rows),
        Shape::PeriodSeries { period, value } => KpiRows::Series(
            rows.into_iter()
                .map(|row| SeriesPoint {
                    label: format!("{} {}", cell_text(row.get(period.as_str())), year),
                    value: row.get(value.as_str()).cloned().unwrap_or(Value::Null),
                })
                .collect(),
        ),
        Shape::CategorySeries { category, value } => KpiRows::Series(
            rows.into_iter()
                .map(|row| SeriesPoint {
                    label: cell_text(row.get(category.as_str())),
                    value: row.get(value.as_str()).cloned().unwrap_or(Value::Null),
                })
                .collect(),
        ),
    }
}

fn cell_text(cell: Option<&Value>) -> String {
    match cell {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Ident, MemoryDataSource};
    use crate::error::ErrorKind;
    use crate::kpi::KpiCatalog;
    use serde_json::json;

    fn geo() -> Arc<MemoryDataSource> {
        let source = MemoryDataSource::new("primary");
        source
            .create_table("Circle", &["CircleID", "CircleName"])
            .insert("Circle", json!({"CircleID": 1, "CircleName": "Indore"}))
            .create_table("Division", &["DivisionID", "DivisionName", "CircleID"])
            .insert("Division", json!({"DivisionID": 10, "DivisionName": "Dewas", "CircleID": 1}))
            .create_table("Subdivision", &["SubdivisionID", "SubdivisionName", "DivisionID"])
            .insert("Subdivision", json!({"SubdivisionID": 7, "SubdivisionName": "Sonkatch", "DivisionID": 10}))
            .insert("Subdivision", json!({"SubdivisionID": 8, "SubdivisionName": "Bagli", "DivisionID": 10}))
            .create_table("Section", &["SectionID", "SectionName", "SubdivisionID"])
            .insert("Section", json!({"SectionID": 42, "SectionName": "Sonkatch Town", "SubdivisionID": 7}));
        Arc::new(source)
    }

    fn kpi() -> Arc<MemoryDataSource> {
        let source = MemoryDataSource::new("kpi");
        source.create_table(
            "kpi_billing_efficiency",
            &["Month", "MonthNo", "Year", "BillingEfficiency", "CircleID", "DivisionID", "SubdivisionID", "SectionID"],
        );
        for (month, no, value) in [("May", 5, 88.1), ("April", 4, 91.5), ("June", 6, 79.0)] {
            source.insert(
                "kpi_billing_efficiency",
                json!({"Month": month, "MonthNo": no, "Year": 2023, "BillingEfficiency": value,
                       "CircleID": 1, "DivisionID": 10, "SubdivisionID": 7, "SectionID": 42}),
            );
        }
        source.insert(
            "kpi_billing_efficiency",
            json!({"Month": "April", "MonthNo": 4, "Year": 2022, "BillingEfficiency": 70.0,
                   "CircleID": 1, "DivisionID": 10, "SubdivisionID": 7, "SectionID": 42}),
        );
        Arc::new(source)
    }

    fn builder(geo: Arc<MemoryDataSource>, kpi: Arc<MemoryDataSource>) -> KpiQueryBuilder {
        KpiQueryBuilder::new(
            Arc::new(Hierarchy::circle()),
            HierarchyValidator::new(geo),
            kpi,
        )
    }

    fn billing() -> KpiDefinition {
        KpiCatalog::standard().get("billing-efficiency").cloned().unwrap()
    }

    #[tokio::test]
    async fn section_and_year_returns_monthly_series() {
        let builder = builder(geo(), kpi());
        let filters = FilterSet::new().with("sectionId", "42").with("year", "2023");

        let rows = builder.build_and_run(&billing(), &filters).await.unwrap();
        match rows {
            KpiRows::Series(points) => {
                let labels: Vec<_> = points.iter().map(|p| p.label.as_str()).collect();
                assert_eq!(labels, ["April 2023", "May 2023", "June 2023"]);
                assert_eq!(points[0].value, json!(91.5));
            }
            other => panic!("Expected Series, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_year_is_rejected_first() {
        let geo = geo();
        let kpi = kpi();
        let builder = builder(geo.clone(), kpi.clone());

        let err = builder
            .build_and_run(&billing(), &FilterSet::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredFilter);
        assert!(err.to_string().contains("year"));
        assert_eq!(geo.query_count() + kpi.query_count(), 0);
    }

    #[tokio::test]
    async fn malformed_year_is_rejected() {
        let builder = builder(geo(), kpi());
        let filters = FilterSet::new().with("circleId", "1").with("year", "abcd");

        let err = builder.build_and_run(&billing(), &filters).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidYearFormat);
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn anchor_is_required() {
        let builder = builder(geo(), kpi());
        let filters = FilterSet::new().with("divisionId", "10").with("year", "2023");

        let err = builder.build_and_run(&billing(), &filters).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredFilter);
        assert!(err.to_string().contains("circleId or sectionId"));
    }

    #[tokio::test]
    async fn inconsistent_hierarchy_never_reaches_kpi_table() {
        let kpi = kpi();
        let builder = builder(geo(), kpi.clone());
        let filters = FilterSet::new()
            .with("circleId", "1")
            .with("subdivisionId", "8")
            .with("sectionId", "42")
            .with("year", "2023");

        let err = builder.build_and_run(&billing(), &filters).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HierarchyMismatch);
        assert_eq!(
            err.to_string(),
            "Invalid SectionID: 42 does not exist or does not belong to SubdivisionID: 8."
        );
        assert_eq!(kpi.query_count(), 0);
    }

    #[tokio::test]
    async fn validation_short_circuits_in_hierarchy_order() {
        let geo = geo();
        let builder = builder(geo.clone(), kpi());
        let filters = FilterSet::new()
            .with("circleId", "99")
            .with("sectionId", "abc")
            .with("year", "2023");

        let err = builder.build_and_run(&billing(), &filters).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(geo.query_count(), 1);
    }

    #[tokio::test]
    async fn skipped_levels_still_constrain_the_kpi_rows() {
        let geo = geo();
        geo.insert("Section", json!({"SectionID": 99, "SectionName": "Khategaon", "SubdivisionID": 70}));
        let kpi = kpi();
        kpi.insert(
            "kpi_billing_efficiency",
            json!({"Month": "April", "MonthNo": 4, "Year": 2023, "BillingEfficiency": 60.0,
                   "CircleID": 2, "DivisionID": 20, "SubdivisionID": 70, "SectionID": 99}),
        );
        let builder = builder(geo, kpi);
        let filters = FilterSet::new()
            .with("circleId", "1")
            .with("sectionId", "99")
            .with("year", "2023");

        // No division or subdivision given, so the section is not checked
        // against the circle; both still filter the KPI table.
        let select = builder.prepare(&billing(), &filters).await.unwrap();
        let filter_columns: Vec<_> = select.filters.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(filter_columns, ["Year", "CircleID", "SectionID"]);

        let rows = builder.build_and_run(&billing(), &filters).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn prepared_select_binds_every_validated_level() {
        let builder = builder(geo(), kpi());
        let filters = FilterSet::new()
            .with("circleId", "1")
            .with("divisionId", "10")
            .with("year", "2023");

        let select = builder.prepare(&billing(), &filters).await.unwrap();
        let filter_columns: Vec<_> = select.filters.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(filter_columns, ["Year", "CircleID", "DivisionID"]);
        assert_eq!(
            select.to_query_builder().sql(),
            r#"SELECT "Month", "Year", "BillingEfficiency" FROM "kpi_billing_efficiency" WHERE "Year" = $1 AND "CircleID" = $2 AND "DivisionID" = $3 ORDER BY "MonthNo" ASC"#
        );
    }

    #[test]
    fn category_and_raw_shapes() {
        let row: Row = json!({"ConsumerCategory": "Domestic", "SalesMU": 120.5})
            .as_object()
            .cloned()
            .unwrap();
        let shaped = shape_rows(
            Shape::CategorySeries {
                category: Ident::new("ConsumerCategory"),
                value: Ident::new("SalesMU"),
            },
            2023,
            vec![row.clone()],
        );
        assert_eq!(
            serde_json::to_value(&shaped).unwrap(),
            json!([{"label": "Domestic", "value": 120.5}])
        );

        let raw = shape_rows(Shape::Raw, 2023, vec![row]);
        assert_eq!(
            serde_json::to_value(&raw).unwrap(),
            json!([{"ConsumerCategory": "Domestic", "SalesMU": 120.5}])
        );
    }
}
