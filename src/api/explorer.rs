use crate::ax_state::AppState;
use crate::error::Result;
use crate::models::context::{RowsParams, SelectTableRequest, SummaryParams};
use crate::models::filter::Selection;
use crate::models::query::AggregateRequest;
use crate::models::schema::TableId;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// 新建会话前顺带清理空闲会话
pub async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let evicted = state.evict_idle(Instant::now());
    if evicted > 0 {
        info!("清理空闲会话 {} 个", evicted);
    }
    let id = state.open_session();
    info!("新建探索会话: {}", id);
    (StatusCode::CREATED, Json(json!({ "session_id": id })))
}

pub async fn drop_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.close_session(id)?;
    info!("会话已关闭: {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// 选表: 重建列描述与筛选控件，筛选状态清空
pub async fn select_table(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectTableRequest>,
) -> Result<Json<Value>> {
    let handle = state.session(id)?;
    let mut session = handle.lock().await;
    let table = TableId::new(payload.schema, payload.table);
    let panel = session.select_table(&state.warehouse, table).await?;
    Ok(Json(json!({ "status": "success", "panel": panel })))
}

pub async fn get_filters(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Value>> {
    let handle = state.session(id)?;
    let session = handle.lock().await;
    let panel = session.panel()?;
    let predicate = session.predicate()?;
    Ok(Json(json!({ "status": "success", "panel": panel, "predicate": predicate })))
}

pub async fn set_filter(
    State(state): State<Arc<AppState>>,
    Path((id, column)): Path<(Uuid, String)>,
    Json(selection): Json<Selection>,
) -> Result<Json<Value>> {
    let handle = state.session(id)?;
    let mut session = handle.lock().await;
    session.set_filter(&column, selection)?;
    let panel = session.panel()?;
    Ok(Json(json!({ "status": "success", "state": panel.state })))
}

pub async fn clear_filter(
    State(state): State<Arc<AppState>>,
    Path((id, column)): Path<(Uuid, String)>,
) -> Result<Json<Value>> {
    let handle = state.session(id)?;
    let mut session = handle.lock().await;
    let removed = session.clear_filter(&column)?;
    Ok(Json(json!({ "status": "success", "removed": removed })))
}

pub async fn clear_filters(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Value>> {
    let handle = state.session(id)?;
    let mut session = handle.lock().await;
    session.clear_filters()?;
    Ok(Json(json!({ "status": "success" })))
}

/// 过滤后的行 + "共 X 行中显示 Y 行" 所需的计数
pub async fn rows(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<RowsParams>,
) -> Result<Json<Value>> {
    let limit = params.row_limit()?;
    let handle = state.session(id)?;
    let mut session = handle.lock().await;
    let result = session.rows(&state.warehouse, limit).await?;
    let counts = session.row_counts(&state.warehouse).await?;
    let panel = session.panel()?;
    Ok(Json(json!({
        "status": "success",
        "table": panel.table,
        "columns": result.columns,
        "data": result.to_records(),
        "meta": {
            "row_count": result.len(),
            "filtered_count": counts.filtered,
            "total_count": counts.total,
            "active_filters": panel.state.len(),
        }
    })))
}

pub async fn aggregate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AggregateRequest>,
) -> Result<Json<Value>> {
    let handle = state.session(id)?;
    let mut session = handle.lock().await;
    let result = session.aggregate(&state.warehouse, request).await?;
    Ok(Json(json!({ "status": "success", "result": result })))
}

pub async fn charts(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Value>> {
    let handle = state.session(id)?;
    let session = handle.lock().await;
    let candidates = session.chart_candidates(&state.warehouse).await?;
    Ok(Json(json!({ "status": "success", "candidates": candidates })))
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<Value>> {
    let handle = state.session(id)?;
    let session = handle.lock().await;
    let summaries = session.summary(&state.warehouse, &params.column_list()).await?;
    Ok(Json(json!({ "status": "success", "summaries": summaries })))
}

/// 以附件形式下载当前过滤结果
pub async fn export(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Response> {
    let handle = state.session(id)?;
    let mut session = handle.lock().await;
    let artifact = session.export(&state.warehouse).await?;
    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}
