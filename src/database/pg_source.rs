//! PostgreSQL data source
//!
//! Executes `Select` statements through a pooled `sqlx` connection with an
//! explicit per-query timeout, then decodes each row into JSON by the
//! column's PostgreSQL type.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row as _, TypeInfo};
use tracing::{debug, error};

use super::{DataSource, Row, Select};
use crate::error::DataSourceError;

#[derive(Clone)]
pub struct PgDataSource {
    label: &'static str,
    pool: PgPool,
    query_timeout: Duration,
}

impl PgDataSource {
    pub fn new(label: &'static str, pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            label,
            pool,
            query_timeout,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, DataSourceError>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(DataSourceError::from),
            Err(_) => Err(DataSourceError::Timeout {
                after_ms: u64::try_from(self.query_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[async_trait]
impl DataSource for PgDataSource {
    fn label(&self) -> &str {
        self.label
    }

    async fn fetch_all(&self, select: &Select) -> Result<Vec<Row>, DataSourceError> {
        let mut builder = select.to_query_builder();
        debug!(store = self.label, sql = builder.sql(), "Executing query");

        let rows = self
            .with_timeout(builder.build().fetch_all(&self.pool))
            .await
            .map_err(|e| {
                error!(store = self.label, table = %select.table, "Query failed: {}", e);
                e
            })?;

        rows.iter().map(decode_row).collect()
    }

    async fn ping(&self) -> Result<(), DataSourceError> {
        self.with_timeout(sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }
}

fn decode_row(row: &PgRow) -> Result<Row, DataSourceError> {
    let mut out = Row::new();
    for column in row.columns() {
        let value = decode_cell(row, column.ordinal(), column.type_info().name())?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_cell(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, DataSourceError> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| float_value(f64::from(v))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(float_value),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(idx)?
            .map(|v| v.to_f64().map(float_value).unwrap_or(Value::Null)),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)?
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)?
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
            .map(|v| Value::String(v.to_rfc3339())),
        _ => row.try_get::<Option<String>, _>(idx)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}
