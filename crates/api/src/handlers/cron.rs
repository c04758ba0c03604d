use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct CronParams {
    /// 为 true 时同步执行并返回 tick 汇总
    #[serde(default)]
    pub wait: bool,
}

/// 异步触发的即时确认
#[derive(Debug, Serialize, Deserialize)]
pub struct CronAck {
    pub success: bool,
    pub message: String,
    pub tick_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// 触发一次 tick
pub async fn trigger_cron(
    State(state): State<AppState>,
    Query(params): Query<CronParams>,
) -> ApiResult<Response> {
    start_tick(state, params).await
}

/// 带密钥校验的触发入口
///
/// 只有携带了 Bearer 令牌且与配置的密钥不一致时才拒绝。
pub async fn trigger_cron_authorized(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CronParams>,
) -> ApiResult<Response> {
    authorize(&headers, state.cron_secret.as_deref())?;
    start_tick(state, params).await
}

fn authorize(headers: &HeaderMap, secret: Option<&str>) -> ApiResult<()> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if token != secret => Err(ApiError::Unauthorized),
        _ => Ok(()),
    }
}

async fn start_tick(state: AppState, params: CronParams) -> ApiResult<Response> {
    let tick_id = Uuid::new_v4();

    if params.wait {
        let summary = state.engine.run_tick_with_id(tick_id, Utc::now()).await?;
        return Ok(success(summary).into_response());
    }

    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(e) = engine.run_tick_with_id(tick_id, Utc::now()).await {
            error!("后台 tick {} 执行失败: {}", tick_id, e);
        }
    });
    info!("已在后台启动 tick {}", tick_id);

    Ok(Json(CronAck {
        success: true,
        message: "Cron job started".to_string(),
        tick_id,
        timestamp: Utc::now(),
    })
    .into_response())
}
