//! Parameter-bound SELECT statements over allow-listed identifiers
//!
//! Table and column names are `Ident`s, which can only be built from
//! `&'static str` literals compiled into the binary. Every request-derived
//! value travels as a `SqlValue` and is rendered as a `$n` placeholder, so
//! request input never reaches the SQL text.

use std::fmt;

use sqlx::{Postgres, QueryBuilder};

/// A table or column name from the code-defined allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(&'static str);

impl Ident {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    fn push_quoted(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push('"');
        builder.push(self.0);
        builder.push('"');
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A bound parameter value. Request input only ever reaches SQL as a parsed
/// integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
}

impl SqlValue {
    /// Loose equality against a decoded cell, used by the in-memory adapter.
    pub fn matches(&self, cell: &serde_json::Value) -> bool {
        match (self, cell) {
            (Self::Int(expected), serde_json::Value::Number(n)) => integral_value(n) == Some(*expected),
            _ => false,
        }
    }
}

/// Integer value of a decoded number, accepting whole floats (NUMERIC
/// columns decode as `f64`).
pub fn integral_value(n: &serde_json::Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// `SELECT [DISTINCT] cols FROM table WHERE col = $n AND ... ORDER BY ...`
#[derive(Debug, Clone)]
pub struct Select {
    pub table: Ident,
    pub columns: Vec<Ident>,
    pub filters: Vec<(Ident, SqlValue)>,
    pub order_by: Vec<(Ident, SortOrder)>,
    pub distinct: bool,
}

impl Select {
    pub fn new(table: Ident) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            distinct: false,
        }
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = Ident>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn column(mut self, column: Ident) -> Self {
        self.columns.push(column);
        self
    }

    pub fn filter(mut self, column: Ident, value: SqlValue) -> Self {
        self.filters.push((column, value));
        self
    }

    pub fn order_by(mut self, column: Ident, order: SortOrder) -> Self {
        self.order_by.push((column, order));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Render into a PostgreSQL query builder with every filter value bound.
    pub fn to_query_builder(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT ");
        if self.distinct {
            builder.push("DISTINCT ");
        }

        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            column.push_quoted(&mut builder);
        }

        builder.push(" FROM ");
        self.table.push_quoted(&mut builder);

        for (i, (column, value)) in self.filters.iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            column.push_quoted(&mut builder);
            builder.push(" = ");
            match value {
                SqlValue::Int(v) => builder.push_bind(*v),
            };
        }

        for (i, (column, order)) in self.order_by.iter().enumerate() {
            builder.push(if i == 0 { " ORDER BY " } else { ", " });
            column.push_quoted(&mut builder);
            builder.push(match order {
                SortOrder::Asc => " ASC",
                SortOrder::Desc => " DESC",
            });
        }

        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KPI: Ident = Ident::new("kpi_billing_efficiency");
    const MONTH: Ident = Ident::new("Month");
    const VALUE: Ident = Ident::new("BillingEfficiency");
    const YEAR: Ident = Ident::new("Year");
    const SECTION: Ident = Ident::new("SectionID");

    #[test]
    fn renders_placeholders_in_filter_order() {
        let select = Select::new(KPI)
            .columns([MONTH, VALUE])
            .filter(YEAR, SqlValue::Int(2023))
            .filter(SECTION, SqlValue::Int(42))
            .order_by(MONTH, SortOrder::Asc);

        let builder = select.to_query_builder();
        assert_eq!(
            builder.sql(),
            r#"SELECT "Month", "BillingEfficiency" FROM "kpi_billing_efficiency" WHERE "Year" = $1 AND "SectionID" = $2 ORDER BY "Month" ASC"#
        );
    }

    #[test]
    fn distinct_without_filters() {
        let select = Select::new(KPI)
            .distinct()
            .column(YEAR)
            .order_by(YEAR, SortOrder::Desc);

        assert_eq!(
            select.to_query_builder().sql(),
            r#"SELECT DISTINCT "Year" FROM "kpi_billing_efficiency" ORDER BY "Year" DESC"#
        );
    }

    #[test]
    fn value_matching_is_type_aware() {
        assert!(SqlValue::Int(5).matches(&serde_json::json!(5)));
        assert!(!SqlValue::Int(5).matches(&serde_json::json!("5")));
        assert!(SqlValue::Int(5).matches(&serde_json::json!(5.0)));
        assert!(!SqlValue::Int(5).matches(&serde_json::json!(5.5)));
        assert!(!SqlValue::Int(5).matches(&serde_json::Value::Null));
    }

    #[test]
    fn whole_floats_are_integral() {
        let n = |v: serde_json::Value| match v {
            serde_json::Value::Number(n) => n,
            other => panic!("Expected number, got {:?}", other),
        };
        assert_eq!(integral_value(&n(serde_json::json!(2023))), Some(2023));
        assert_eq!(integral_value(&n(serde_json::json!(2023.0))), Some(2023));
        assert_eq!(integral_value(&n(serde_json::json!(-4.0))), Some(-4));
        assert_eq!(integral_value(&n(serde_json::json!(2023.5))), None);
        assert_eq!(integral_value(&n(serde_json::json!(1e300))), None);
    }
}
