//! Error types for the KPI dashboard backend
//!
//! Two layers: `DataSourceError` describes what went wrong talking to a
//! relational store, `QueryError` is what the validator, query builder and
//! filter service hand back to callers. The 400-vs-500 decision is made
//! from `QueryError::kind()`, never from message text.

use thiserror::Error;

/// Failures raised by a data-source adapter.
///
/// Messages are built by the adapter itself and never carry connection
/// strings or credentials.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("undefined table: {0}")]
    UndefinedTable(String),

    #[error("undefined column: {0}")]
    UndefinedColumn(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },
}

impl DataSourceError {
    /// True when the failure means the queried table lacks an expected column
    /// (or the table itself is missing).
    pub fn is_schema_drift(&self) -> bool {
        matches!(self, Self::UndefinedColumn(_) | Self::UndefinedTable(_))
    }
}

impl From<sqlx::Error> for DataSourceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("42703") => Self::UndefinedColumn(db_err.message().to_string()),
                Some("42P01") => Self::UndefinedTable(db_err.message().to_string()),
                _ => Self::Query(db_err.message().to_string()),
            },
            sqlx::Error::PoolTimedOut => Self::Connection("timed out acquiring a pooled connection".into()),
            sqlx::Error::PoolClosed => Self::Connection("connection pool is closed".into()),
            sqlx::Error::Io(e) => Self::Connection(e.to_string()),
            sqlx::Error::Tls(e) => Self::Connection(e.to_string()),
            // Configuration errors may echo the connection string back.
            sqlx::Error::Configuration(_) => Self::Connection("invalid connection configuration".into()),
            sqlx::Error::ColumnDecode { index, source } => Self::Decode {
                column: index,
                message: source.to_string(),
            },
            sqlx::Error::ColumnNotFound(column) => Self::UndefinedColumn(column),
            other => Self::Query(other.to_string()),
        }
    }
}

/// Structural classification of a `QueryError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidIdFormat,
    InvalidYearFormat,
    MissingRequiredFilter,
    NotFound,
    HierarchyMismatch,
    UnknownMetric,
    SchemaMismatch,
    DataSource,
}

impl ErrorKind {
    /// Client-caused kinds are rejected before any KPI query runs.
    pub fn is_client_error(self) -> bool {
        !matches!(self, Self::SchemaMismatch | Self::DataSource)
    }
}

/// Errors returned by the hierarchy validator, KPI query builder and
/// filter service.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid {column} format: '{raw}' is not an integer.")]
    InvalidIdFormat { column: String, raw: String },

    #[error("Invalid year format: '{raw}' is not an integer.")]
    InvalidYearFormat { raw: String },

    #[error("Missing required parameter: {param}.")]
    MissingRequiredFilter { param: String },

    #[error("Invalid {column}: {id} does not exist.")]
    NotFound { column: String, id: i64 },

    #[error("Invalid {column}: {id} does not exist or does not belong to {parent_column}: {parent_id}.")]
    HierarchyMismatch {
        column: String,
        id: i64,
        parent_column: String,
        parent_id: i64,
    },

    #[error("Unknown {what}: '{name}'.")]
    UnknownMetric { what: &'static str, name: String },

    #[error("Year column missing from one or more KPI tables: {source}")]
    SchemaMismatch {
        tables_checked: Vec<String>,
        #[source]
        source: DataSourceError,
    },

    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdFormat { .. } => ErrorKind::InvalidIdFormat,
            Self::InvalidYearFormat { .. } => ErrorKind::InvalidYearFormat,
            Self::MissingRequiredFilter { .. } => ErrorKind::MissingRequiredFilter,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::HierarchyMismatch { .. } => ErrorKind::HierarchyMismatch,
            Self::UnknownMetric { .. } => ErrorKind::UnknownMetric,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::DataSource(_) => ErrorKind::DataSource,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::UnknownMetric => 404,
            kind if kind.is_client_error() => 400,
            _ => 500,
        }
    }

    pub(crate) fn missing(param: &str) -> Self {
        Self::MissingRequiredFilter {
            param: param.to_string(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
