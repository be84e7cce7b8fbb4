//! KPI metrics: the catalog of allow-listed tables and the query builder
//! that validates request filters against the hierarchy before reading them.

pub mod catalog;
pub mod query_builder;

pub use catalog::{AnchorPolicy, KpiCatalog, KpiDefinition, KpiSummary, Shape, YEAR_COLUMN};
pub use query_builder::{shape_rows, FilterSet, KpiQueryBuilder, KpiRows, SeriesPoint, YEAR_PARAM};
