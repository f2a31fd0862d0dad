//! 探索引擎的错误类型

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::infra::source::SourceError;
use crate::models::schema::TableId;

pub type Result<T> = std::result::Result<T, ExplorerError>;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Table not found: {0}")]
    TableNotFound(TableId),

    #[error("Metadata unavailable for {target}: {source}")]
    MetadataUnavailable {
        target: String,
        #[source]
        source: SourceError,
    },

    #[error("Invalid aggregation input: {0}")]
    InvalidAggregationInput(String),

    #[error("Query failed: table={table}, operation={operation}: {source}")]
    QueryExecution {
        table: TableId,
        operation: &'static str,
        #[source]
        source: SourceError,
    },

    #[error("Export failed: {0}")]
    ExportIo(#[from] std::io::Error),

    #[error("No table selected")]
    NoTableSelected,

    #[error("Invalid filter on {column}: {reason}")]
    InvalidFilter { column: String, reason: String },

    #[error("Invalid row limit `{0}` (expected 5, 20, 50, 100 or all)")]
    InvalidRowLimit(String),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),
}

impl ExplorerError {
    pub fn metadata(target: impl ToString, source: SourceError) -> Self {
        Self::MetadataUnavailable {
            target: target.to_string(),
            source,
        }
    }

    pub fn query(table: &TableId, operation: &'static str, source: SourceError) -> Self {
        Self::QueryExecution {
            table: table.clone(),
            operation,
            source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SchemaNotFound(_) => "schema_not_found",
            Self::TableNotFound(_) => "table_not_found",
            Self::MetadataUnavailable { .. } => "metadata_unavailable",
            Self::InvalidAggregationInput(_) => "invalid_aggregation_input",
            Self::QueryExecution { .. } => "query_execution",
            Self::ExportIo(_) => "export_io",
            Self::NoTableSelected => "no_table_selected",
            Self::InvalidFilter { .. } => "invalid_filter",
            Self::InvalidRowLimit(_) => "invalid_row_limit",
            Self::SessionNotFound(_) => "session_not_found",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SchemaNotFound(_) | Self::TableNotFound(_) | Self::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidAggregationInput(_) | Self::InvalidFilter { .. } | Self::InvalidRowLimit(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NoTableSelected => StatusCode::CONFLICT,
            Self::MetadataUnavailable { .. } | Self::QueryExecution { .. } => StatusCode::BAD_GATEWAY,
            Self::ExportIo(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ExplorerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("请求失败: {}", self);
        }
        (
            status,
            Json(json!({ "error": self.to_string(), "kind": self.kind() })),
        )
            .into_response()
    }
}
