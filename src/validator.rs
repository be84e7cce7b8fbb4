//! Hierarchy validation
//!
//! Confirms that a requested geographic ID exists and, when a parent ID is
//! supplied, that it hangs under that parent. One read query per call, no
//! caching and no retries.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::database::{DataSource, Select, SqlValue};
use crate::error::{QueryError, QueryResult};
use crate::hierarchy::{parse_integer, Level};

/// A node that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedNode {
    pub id: i64,
    pub name: String,
}

#[derive(Clone)]
pub struct HierarchyValidator {
    source: Arc<dyn DataSource>,
}

impl HierarchyValidator {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    /// Validate `id` against `level`, constrained by `parent_id` when given.
    ///
    /// An absent or empty `id` means the filter was not requested and yields
    /// `Ok(None)` without touching the database. The parent constraint is
    /// only applied when `level` has a parent column.
    #[instrument(skip(self, level), fields(table = %level.table))]
    pub async fn validate(
        &self,
        level: &Level,
        id: Option<&str>,
        parent_id: Option<&str>,
    ) -> QueryResult<Option<ValidatedNode>> {
        let Some(raw) = id.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        let id = parse_id(level.id_column.as_str(), raw)?;

        let parent = match (level.parent_column, parent_id.filter(|s| !s.is_empty())) {
            (Some(column), Some(raw_parent)) => Some((column, parse_id(column.as_str(), raw_parent)?)),
            _ => None,
        };

        let mut select = Select::new(level.table)
            .column(level.name_column)
            .filter(level.id_column, SqlValue::Int(id));
        if let Some((column, parent_id)) = parent {
            select = select.filter(column, SqlValue::Int(parent_id));
        }

        let rows = self.source.fetch_all(&select).await?;

        let Some(row) = rows.into_iter().next() else {
            debug!(id, ?parent, "Hierarchy validation rejected");
            return Err(match parent {
                Some((parent_column, parent_id)) => QueryError::HierarchyMismatch {
                    column: level.id_column.to_string(),
                    id,
                    parent_column: parent_column.to_string(),
                    parent_id,
                },
                None => QueryError::NotFound {
                    column: level.id_column.to_string(),
                    id,
                },
            });
        };

        let name = match row.get(level.name_column.as_str()) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Ok(Some(ValidatedNode { id, name }))
    }
}

pub(crate) fn parse_id(column: &str, raw: &str) -> QueryResult<i64> {
    parse_integer(raw).ok_or_else(|| QueryError::InvalidIdFormat {
        column: column.to_string(),
        raw: raw.to_string(),
    })
}
