pub mod catalog;
pub mod explorer;

use crate::ax_state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/schemas", get(catalog::list_schemas))
        .route("/api/schemas/{schema}/tables", get(catalog::list_tables))
        .route("/api/sessions", post(explorer::create_session))
        .route("/api/sessions/{id}", delete(explorer::drop_session))
        .route("/api/sessions/{id}/table", post(explorer::select_table))
        .route(
            "/api/sessions/{id}/filters",
            get(explorer::get_filters).delete(explorer::clear_filters),
        )
        .route(
            "/api/sessions/{id}/filters/{column}",
            put(explorer::set_filter).delete(explorer::clear_filter),
        )
        .route("/api/sessions/{id}/rows", get(explorer::rows))
        .route("/api/sessions/{id}/aggregate", post(explorer::aggregate))
        .route("/api/sessions/{id}/charts", get(explorer::charts))
        .route("/api/sessions/{id}/summary", get(explorer::summary))
        .route("/api/sessions/{id}/export", get(explorer::export))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::widgets::FilterPolicy;
    use crate::infra::demo::higher_ed_warehouse;
    use crate::infra::Warehouse;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(
            Warehouse::Memory(higher_ed_warehouse()),
            FilterPolicy::default(),
            vec!["advising".to_string()],
        ))
    }

    async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header(header::CONTENT_TYPE, "application/json");
        }
        let request = request
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(state: &Arc<AppState>, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let (status, bytes) = send(state, method, uri, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn new_session(state: &Arc<AppState>) -> String {
        let (status, body) = send_json(state, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn catalog_lists_schemas_and_tables() {
        let state = test_state();
        let (status, body) = send_json(&state, "GET", "/api/schemas", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["schemas"], serde_json::json!(["finance", "student"]));

        let (status, body) = send_json(&state, "GET", "/api/schemas/finance/tables", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tables"], serde_json::json!(["billing", "financial_aid"]));

        let (status, body) = send_json(&state, "GET", "/api/schemas/hr/tables", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "schema_not_found");
    }

    #[tokio::test]
    async fn filter_then_read_rows() {
        let state = test_state();
        let id = new_session(&state).await;

        let (status, body) = send_json(
            &state,
            "POST",
            &format!("/api/sessions/{}/table", id),
            Some(r#"{"schema":"finance","table":"financial_aid"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let filters = body["panel"]["filters"].as_array().unwrap();
        assert!(filters.iter().any(|f| f["column"]["name"] == "status" && f["widget"] == "MULTISELECT"));

        let (status, _) = send_json(
            &state,
            "PUT",
            &format!("/api/sessions/{}/filters/status", id),
            Some(r#"{"kind":"values","values":["Disbursed"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send_json(&state, "GET", &format!("/api/sessions/{}/rows?limit=5", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let data = body["data"].as_array().unwrap();
        assert!(data.len() <= 5);
        assert!(data.iter().all(|r| r["status"] == "Disbursed"));
        assert_eq!(body["meta"]["total_count"], 50);
        assert_eq!(body["meta"]["active_filters"], 1);
    }

    #[tokio::test]
    async fn export_is_an_attachment() {
        let state = test_state();
        let id = new_session(&state).await;
        send_json(
            &state,
            "POST",
            &format!("/api/sessions/{}/table", id),
            Some(r#"{"schema":"finance","table":"billing"}"#),
        )
        .await;

        let request = Request::builder()
            .uri(format!("/api/sessions/{}/export", id))
            .body(Body::empty())
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"finance_billing_export.csv\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("billing_id,student_id,term,amount_due,payment_status,due_date\n"));
        assert_eq!(text.lines().count(), 41);
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let state = test_state();
        let id = new_session(&state).await;

        let (status, body) = send_json(&state, "GET", &format!("/api/sessions/{}/rows", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "no_table_selected");

        send_json(
            &state,
            "POST",
            &format!("/api/sessions/{}/table", id),
            Some(r#"{"schema":"student","table":"sis"}"#),
        )
        .await;
        let (status, body) = send_json(
            &state,
            "POST",
            &format!("/api/sessions/{}/aggregate", id),
            Some(r#"{"group_column":"gpa"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_aggregation_input");

        let (status, body) = send_json(&state, "GET", &format!("/api/sessions/{}/rows?limit=7", id), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_row_limit");

        let (status, _) = send_json(&state, "DELETE", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send_json(&state, "GET", &format!("/api/sessions/{}/filters", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "session_not_found");
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let state = Arc::new(
            AppState::new(
                Warehouse::Memory(higher_ed_warehouse()),
                FilterPolicy::default(),
                Vec::new(),
            )
            .with_session_ttl(Duration::from_secs(60)),
        );
        let idle = new_session(&state).await;
        let active = new_session(&state).await;

        let now = Instant::now();
        let active_id: uuid::Uuid = active.parse().unwrap();
        state.sessions.get_mut(&active_id).unwrap().last_access = now + Duration::from_secs(30);
        assert_eq!(state.evict_idle(now + Duration::from_secs(70)), 1);
        assert_eq!(state.sessions.len(), 1);

        let (status, body) = send_json(&state, "GET", &format!("/api/sessions/{}/filters", idle), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "session_not_found");
        let (status, body) = send_json(&state, "GET", &format!("/api/sessions/{}/filters", active), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "no_table_selected");

        // 访问会刷新空闲计时
        assert_eq!(state.evict_idle(Instant::now() + Duration::from_secs(59)), 0);
        assert_eq!(state.evict_idle(Instant::now() + Duration::from_secs(61)), 1);
        assert!(state.sessions.is_empty());
    }

    #[tokio::test]
    async fn sessions_do_not_share_state() {
        let state = test_state();
        let a = new_session(&state).await;
        let b = new_session(&state).await;
        for id in [&a, &b] {
            send_json(
                &state,
                "POST",
                &format!("/api/sessions/{}/table", id),
                Some(r#"{"schema":"finance","table":"billing"}"#),
            )
            .await;
        }
        send_json(
            &state,
            "PUT",
            &format!("/api/sessions/{}/filters/payment_status", a),
            Some(r#"{"kind":"values","values":["Paid"]}"#),
        )
        .await;

        let (_, body_a) = send_json(&state, "GET", &format!("/api/sessions/{}/rows?limit=all", a), None).await;
        let (_, body_b) = send_json(&state, "GET", &format!("/api/sessions/{}/rows?limit=all", b), None).await;
        assert_eq!(body_a["meta"]["filtered_count"], 10);
        assert_eq!(body_b["meta"]["filtered_count"], 40);
    }

    #[tokio::test]
    async fn aggregate_and_charts() {
        let state = test_state();
        let id = new_session(&state).await;
        send_json(
            &state,
            "POST",
            &format!("/api/sessions/{}/table", id),
            Some(r#"{"schema":"student","table":"sis"}"#),
        )
        .await;

        let (status, body) = send_json(
            &state,
            "POST",
            &format!("/api/sessions/{}/aggregate", id),
            Some(r#"{"group_column":"department","metric_column":"gpa","metric_fn":"AVG"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["points"].as_array().unwrap().len(), 6);
        assert_eq!(body["result"]["status"], "ready");

        let (status, body) = send_json(&state, "GET", &format!("/api/sessions/{}/charts", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["candidates"]["numeric"], serde_json::json!(["gpa"]));

        let (status, body) =
            send_json(&state, "GET", &format!("/api/sessions/{}/summary?columns=gpa", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summaries"][0]["column"], "gpa");
    }
}
