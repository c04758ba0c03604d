use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::{error::ApiResult, response::success, routes::AppState};

pub async fn health_check(State(state): State<AppState>) -> Response {
    let (status, database) = match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!("存储健康检查失败: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    let body = Json(json!({
        "status": if status.is_success() { "ok" } else { "error" },
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "pinger",
        "version": env!("CARGO_PKG_VERSION")
    }));
    (status, body).into_response()
}

/// 全局执行统计
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let stats = state.store.execution_stats().await?;
    Ok(success(stats))
}

/// Prometheus 文本格式指标
pub async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
