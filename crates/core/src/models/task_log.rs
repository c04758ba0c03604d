use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::execution::ExecutionResult;
use super::task::Task;

/// 单次执行的结果状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskLogStatus {
    Success,
    Failed,
    Timeout,
}

impl TaskLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskLogStatus::Success => "success",
            TaskLogStatus::Failed => "failed",
            TaskLogStatus::Timeout => "timeout",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskLogStatus::Success)
    }
}

impl fmt::Display for TaskLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskLogStatus {
    type Err = crate::SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TaskLogStatus::Success),
            "failed" => Ok(TaskLogStatus::Failed),
            "timeout" => Ok(TaskLogStatus::Timeout),
            _ => Err(crate::SchedulerError::Serialization(format!(
                "未知的执行状态: {s}"
            ))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskLogStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskLogStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<TaskLogStatus>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskLogStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 执行日志
///
/// 每次尝试执行对应一条不可变记录，只追加不修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskLog {
    pub id: i64,
    pub task_id: i64,
    pub executed_at: DateTime<Utc>,
    pub status: TaskLogStatus,
    pub http_status_code: Option<i32>,
    pub response_time_ms: Option<i64>,
    pub response_size: Option<i64>,
    pub error_message: Option<String>,
    pub request_headers: Option<HashMap<String, String>>,
    pub response_headers: Option<HashMap<String, String>>,
    pub response_body: Option<String>,
}

impl TaskLog {
    /// 由执行结果构造日志，`id` 由存储层生成
    pub fn from_result(task: &Task, result: &ExecutionResult, executed_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            task_id: task.id,
            executed_at,
            status: result.status,
            http_status_code: result.http_status_code,
            response_time_ms: result.response_time_ms,
            response_size: result.response_size,
            error_message: result.error_message.clone(),
            request_headers: task.headers.clone(),
            response_headers: result.response_headers.clone(),
            response_body: result.response_body.clone(),
        }
    }
}
