//! Process configuration
//!
//! Everything comes from environment variables (a `.env` file is loaded by
//! the binary before this runs):
//!
//!   DATABASE_URL                  - primary store holding the geographic tables (required)
//!   KPI_DATABASE_URL              - separate KPI store (default: primary)
//!   PORT                          - listen port (default: 3000)
//!   BIND_HOST                     - listen host (default: 0.0.0.0)
//!   DATABASE_POOL_SIZE            - max connections per pool (default: 10)
//!   DATABASE_CONNECT_TIMEOUT_SECS - pool acquire timeout (default: 30)
//!   DATABASE_QUERY_TIMEOUT_SECS   - per-query timeout (default: 15)
//!   GEO_HIERARCHY                 - `circle` or `district` (default: circle)

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::database::DatabaseConfig;
use crate::hierarchy::HierarchyKind;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub bind_host: String,
    pub port: u16,
    pub hierarchy: HierarchyKind,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Build from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let mut database = DatabaseConfig::new(database_url);
        database.kpi_database_url = get("KPI_DATABASE_URL").map(str::to_string);
        database.max_connections = parse_or(get("DATABASE_POOL_SIZE"), "DATABASE_POOL_SIZE", 10u32)?;
        database.connection_timeout =
            seconds_or(get("DATABASE_CONNECT_TIMEOUT_SECS"), "DATABASE_CONNECT_TIMEOUT_SECS", 30)?;
        database.query_timeout =
            seconds_or(get("DATABASE_QUERY_TIMEOUT_SECS"), "DATABASE_QUERY_TIMEOUT_SECS", 15)?;

        if database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "DATABASE_POOL_SIZE",
                reason: "must be at least 1".into(),
            });
        }

        let hierarchy = match get("GEO_HIERARCHY") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                name: "GEO_HIERARCHY",
                reason,
            })?,
            None => HierarchyKind::Circle,
        };

        Ok(Self {
            database,
            bind_host: get("BIND_HOST").unwrap_or("0.0.0.0").to_string(),
            port: parse_or(get("PORT"), "PORT", 3000u16)?,
            hierarchy,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

fn parse_or<T>(raw: Option<&str>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn seconds_or(raw: Option<&str>, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs = parse_or(raw, name, default)?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}
