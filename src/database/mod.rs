//! Data-source handles and connection lifecycle
//!
//! The validator, KPI query builder and filter service never touch a pool
//! directly. They receive an `Arc<dyn DataSource>` at construction time;
//! `DatabaseManager` owns the PostgreSQL pools behind those handles and
//! closes them on shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::error::DataSourceError;

pub mod memory_source;
pub mod pg_source;
pub mod sql;

pub use memory_source::MemoryDataSource;
pub use pg_source::PgDataSource;
pub use sql::{integral_value, Ident, Select, SortOrder, SqlValue};

/// One decoded result row, keyed by column name in projection order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A relational store that executes allow-listed, parameter-bound selects.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short label used in logs ("primary", "kpi", ...).
    fn label(&self) -> &str;

    async fn fetch_all(&self, select: &Select) -> Result<Vec<Row>, DataSourceError>;

    /// Round-trip check used by the health endpoint.
    async fn ping(&self) -> Result<(), DataSourceError>;
}

/// Pool settings shared by every store this process opens.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub kpi_database_url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub query_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            kpi_database_url: None,
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(15),
            idle_timeout: Some(Duration::from_secs(600)),  // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
        }
    }
}

/// Owns the primary pool and, when configured, a separate KPI pool.
pub struct DatabaseManager {
    primary: Arc<PgDataSource>,
    kpi: Option<Arc<PgDataSource>>,
}

impl DatabaseManager {
    /// Open every configured pool. Fails if any store is unreachable.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, DataSourceError> {
        let primary = Self::connect("primary", &config.database_url, config).await?;

        let kpi = match &config.kpi_database_url {
            Some(url) => Some(Self::connect("kpi", url, config).await?),
            None => {
                info!("KPI_DATABASE_URL not set, KPI tables are read from the primary store");
                None
            }
        };

        Ok(Self {
            primary: Arc::new(primary),
            kpi: kpi.map(Arc::new),
        })
    }

    async fn connect(
        label: &'static str,
        url: &str,
        config: &DatabaseConfig,
    ) -> Result<PgDataSource, DataSourceError> {
        info!("Connecting to {} database: {}", label, mask_database_url(url));

        let mut pool_options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout);

        if let Some(idle_timeout) = config.idle_timeout {
            pool_options = pool_options.idle_timeout(idle_timeout);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            pool_options = pool_options.max_lifetime(max_lifetime);
        }

        let pool = pool_options.connect(url).await.map_err(|e| {
            let err = DataSourceError::from(e);
            warn!("Failed to connect to {} database: {}", label, err);
            err
        })?;

        info!("{} connection pool created successfully", label);
        Ok(PgDataSource::new(label, pool, config.query_timeout))
    }

    /// Store holding the geographic hierarchy tables.
    pub fn primary(&self) -> Arc<dyn DataSource> {
        self.primary.clone()
    }

    /// Store holding the KPI tables; the primary store when no separate
    /// KPI database is configured.
    pub fn kpi(&self) -> Arc<dyn DataSource> {
        match &self.kpi {
            Some(kpi) => kpi.clone(),
            None => self.primary.clone(),
        }
    }

    /// Close every pool, waiting for checked-out connections to return.
    pub async fn close(self) {
        info!("Closing database connection pools");
        self.primary.close().await;
        if let Some(kpi) = self.kpi {
            kpi.close().await;
        }
    }
}

/// Mask sensitive information in a database URL for logging
///
/// URLs get their password replaced. Key/value connection strings
/// (`host=db password=...`) get the `password` value replaced; anything
/// else is masked entirely.
pub fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut masked = parsed.clone();
        if parsed.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else {
        mask_key_value_pairs(url).unwrap_or_else(|| "***".to_string())
    }
}

fn mask_key_value_pairs(conn: &str) -> Option<String> {
    let mut pairs = Vec::new();
    for pair in conn.split_whitespace() {
        let (key, value) = pair.split_once('=')?;
        if key.is_empty() || value.starts_with('\'') {
            return None;
        }
        if key.eq_ignore_ascii_case("password") {
            pairs.push(format!("{}=***", key));
        } else {
            pairs.push(pair.to_string());
        }
    }
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join(" "))
    }
}
