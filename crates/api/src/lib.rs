//! # Pinger API
//!
//! 基于 Axum 的触发与诊断接口。
//!
//! ## API 端点
//!
//! - `GET /api/cron`、`POST /api/cron` - 触发一次 tick，`?wait=true` 时同步返回汇总
//! - `POST /api/tasks/{id}/execute` - 立即执行任务
//! - `GET /api/tasks/{id}/logs?limit=` - 最近的执行日志
//! - `GET /api/stats` - 全局执行统计
//! - `GET /health` - 服务与存储健康检查
//! - `GET /metrics` - Prometheus 指标
//!
//! ## 错误响应
//!
//! ```json
//! {
//!   "error": {
//!     "message": "任务 ID 42 不存在",
//!     "type": "TASK_NOT_FOUND",
//!     "code": 404,
//!     "timestamp": "2024-01-01T00:00:00Z"
//!   }
//! }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, cors_enabled: bool) -> Router {
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if cors_enabled {
        router.layer(cors_layer())
    } else {
        router
    }
}
