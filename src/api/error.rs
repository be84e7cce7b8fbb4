//! HTTP mapping for `QueryError`
//!
//! Client-caused failures become `400 {error}` (`404` for unknown metrics
//! and levels). Server-side failures become `500 {error, details}`, with
//! `tablesChecked` added for schema drift.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error};

use crate::error::{DataSourceError, QueryError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_checked: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError(pub QueryError);

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self(err)
    }
}

impl From<DataSourceError> for ApiError {
    fn from(err: DataSourceError) -> Self {
        Self(QueryError::DataSource(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn body(&self) -> ErrorBody {
        match &self.0 {
            QueryError::SchemaMismatch {
                tables_checked,
                source,
            } => ErrorBody {
                error: "Year column missing from one or more KPI tables".into(),
                details: Some(source.to_string()),
                tables_checked: Some(tables_checked.clone()),
            },
            QueryError::DataSource(source) => ErrorBody {
                error: "Failed to query data source".into(),
                details: Some(source.to_string()),
                tables_checked: None,
            },
            other => ErrorBody {
                error: other.to_string(),
                details: None,
                tables_checked: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {}", self.0);
        } else {
            debug!(status = status.as_u16(), "Request rejected: {}", self.0);
        }
        (status, Json(self.body())).into_response()
    }
}
