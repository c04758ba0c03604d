use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task_log::TaskLogStatus;

/// 单次HTTP探测的结果
///
/// 由执行器产生，执行器不会返回错误，所有失败都折叠到结果中。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub status: TaskLogStatus,
    pub http_status_code: Option<i32>,
    pub response_time_ms: Option<i64>,
    pub response_size: Option<i64>,
    pub error_message: Option<String>,
    pub response_headers: Option<HashMap<String, String>>,
    pub response_body: Option<String>,
}

impl ExecutionResult {
    pub fn success(http_status_code: i32, response_time_ms: i64) -> Self {
        Self {
            status: TaskLogStatus::Success,
            http_status_code: Some(http_status_code),
            response_time_ms: Some(response_time_ms),
            response_size: None,
            error_message: None,
            response_headers: None,
            response_body: None,
        }
    }

    pub fn failed(
        http_status_code: Option<i32>,
        response_time_ms: Option<i64>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            status: TaskLogStatus::Failed,
            http_status_code,
            response_time_ms,
            response_size: None,
            error_message: Some(error_message.into()),
            response_headers: None,
            response_body: None,
        }
    }

    pub fn timeout(response_time_ms: i64, error_message: impl Into<String>) -> Self {
        Self {
            status: TaskLogStatus::Timeout,
            http_status_code: None,
            response_time_ms: Some(response_time_ms),
            response_size: None,
            error_message: Some(error_message.into()),
            response_headers: None,
            response_body: None,
        }
    }

    pub fn with_response(
        mut self,
        response_size: i64,
        response_headers: HashMap<String, String>,
        response_body: Option<String>,
    ) -> Self {
        self.response_size = Some(response_size);
        self.response_headers = Some(response_headers);
        self.response_body = response_body;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// 执行完成后对任务调度状态的更新
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingUpdate {
    pub last_executed_at: DateTime<Utc>,
    pub next_execution_at: DateTime<Utc>,
    pub succeeded: bool,
    /// 为空时保持原有平均值不变
    pub avg_response_time: Option<i64>,
}

/// 一次 tick 的执行汇总
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickSummary {
    pub tick_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub due_count: usize,
    pub executed_count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// 被其他实例抢先认领的任务数量
    pub skipped: usize,
    /// 持久化失败或执行崩溃的任务数量
    pub errors: usize,
    pub duration_ms: i64,
}

impl TickSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            tick_id: Uuid::new_v4(),
            started_at,
            due_count: 0,
            executed_count: 0,
            succeeded: 0,
            failed: 0,
            timed_out: 0,
            skipped: 0,
            errors: 0,
            duration_ms: 0,
        }
    }

    /// 累计一次已完成执行的结果状态
    pub fn record_outcome(&mut self, status: TaskLogStatus) {
        self.executed_count += 1;
        match status {
            TaskLogStatus::Success => self.succeeded += 1,
            TaskLogStatus::Failed => self.failed += 1,
            TaskLogStatus::Timeout => self.timed_out += 1,
        }
    }
}

/// 全局执行统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionStats {
    pub total_tasks: i64,
    pub active_tasks: i64,
    pub total_executions: i64,
    pub successful_executions: i64,
    /// 成功率百分比，无执行记录时为0
    pub success_rate: f64,
    /// 所有带耗时日志的平均响应时间（毫秒）
    pub avg_response_time: Option<i64>,
}

impl ExecutionStats {
    pub fn compute_success_rate(successful: i64, total: i64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (successful as f64 / total as f64 * 10000.0).round() / 100.0
        }
    }
}

/// 响应时间的滚动平均，四舍五入到毫秒
///
/// 样本为空时返回 `None`。
pub fn rolling_average(samples: &[i64]) -> Option<i64> {
    if samples.is_empty() {
        return None;
    }
    let sum: i64 = samples.iter().sum();
    Some((sum as f64 / samples.len() as f64).round() as i64)
}
