//! KPI dashboard backend
//!
//! Read-only REST service over a four-level geographic hierarchy and a set
//! of utility KPI tables:
//!
//! - `hierarchy` - level definitions (Circle > Division > Subdivision > Section)
//! - `validator` - existence and parent-membership checks for filter IDs
//! - `kpi` - metric catalog and the parameter-bound query builder
//! - `filters` - dropdown option lists and the years filter
//! - `database` - `DataSource` seam, PostgreSQL pools and SQL rendering
//! - `api` - axum routes and error mapping

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod filters;
pub mod hierarchy;
pub mod kpi;
pub mod validator;

pub use error::{DataSourceError, ErrorKind, QueryError, QueryResult};
