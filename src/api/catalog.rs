use crate::ax_state::AppState;
use crate::core::inspector;
use crate::error::ExplorerError;
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// 可浏览的 schema 列表 (已排除系统 schema)
pub async fn list_schemas(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ExplorerError> {
    let schemas = inspector::list_schemas(&state.warehouse, &state.excluded_schemas).await?;
    info!("列出 schema: {} 个", schemas.len());
    Ok(Json(json!({ "status": "success", "schemas": schemas })))
}

pub async fn list_tables(
    State(state): State<Arc<AppState>>,
    Path(schema): Path<String>,
) -> Result<Json<Value>, ExplorerError> {
    let tables = inspector::list_tables(&state.warehouse, &schema).await?;
    Ok(Json(json!({ "status": "success", "schema": schema, "tables": tables })))
}
