use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use pinger_core::traits::TaskStore;
use pinger_dispatcher::TickEngine;
use std::sync::Arc;

use crate::handlers::{
    cron::{trigger_cron, trigger_cron_authorized},
    system::{get_stats, health_check, render_metrics},
    tasks::{execute_task, list_task_logs},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TickEngine>,
    pub store: Arc<dyn TaskStore>,
    /// POST /api/cron 校验的 Bearer 密钥
    pub cron_secret: Option<String>,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        // 外部定时触发
        .route(
            "/api/cron",
            get(trigger_cron).post(trigger_cron_authorized),
        )
        .route("/api/tasks/{id}/execute", post(execute_task))
        .route("/api/tasks/{id}/logs", get(list_task_logs))
        .route("/api/stats", get(get_stats))
        .with_state(state)
}
