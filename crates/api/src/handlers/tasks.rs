use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use pinger_core::{models::TaskLog, SchedulerError};
use pinger_dispatcher::ManualExecution;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    response::{success, success_with_message},
    routes::AppState,
};

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct LogQueryParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManualExecutionResponse {
    pub task_id: i64,
    pub executed: bool,
    pub log: Option<TaskLog>,
}

/// 立即执行任务
pub async fn execute_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let response = match state.engine.execute_now(id).await? {
        ManualExecution::Executed(log) => success_with_message(
            ManualExecutionResponse {
                task_id: id,
                executed: true,
                log: Some(log),
            },
            format!("任务 {} 已执行", id),
        ),
        ManualExecution::Skipped(task) => success_with_message(
            ManualExecutionResponse {
                task_id: task.id,
                executed: false,
                log: None,
            },
            format!("任务 {} 未启用，已跳过", task.id),
        ),
    };
    Ok(response)
}

/// 获取任务最近的执行日志
pub async fn list_task_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<LogQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    if !(1..=MAX_LOG_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit 必须在 1 到 {} 之间",
            MAX_LOG_LIMIT
        )));
    }

    state
        .store
        .get_task(id)
        .await?
        .ok_or(SchedulerError::TaskNotFound { id })?;

    let logs = state.store.list_logs(id, limit).await?;
    Ok(success(logs))
}
