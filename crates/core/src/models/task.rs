use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 探测任务定义
///
/// 用户注册的周期性HTTP探测，包含目标、调度配置、调度状态以及聚合统计。
///
/// # 字段说明
///
/// - `target_url` / `http_method` / `headers` / `body`: 请求目标
/// - `frequency_minutes`: 执行间隔（分钟），至少为1
/// - `timeout_seconds`: 单次请求超时（秒），实际超时受引擎上限约束
/// - `retry_attempts` / `retry_delay_seconds`: 声明的重试配置，引擎以下一次调度作为重试
/// - `last_executed_at` / `next_execution_at`: 调度状态，仅由执行引擎修改
/// - `success_count` / `failure_count` / `avg_response_time`: 聚合统计，仅由执行引擎修改
///
/// # 使用示例
///
/// ```rust
/// use pinger_core::models::{HttpMethod, Task};
///
/// let task = Task::new("首页探测".to_string(), "https://example.com/ok".to_string(), HttpMethod::Get)
///     .with_frequency_minutes(5)
///     .with_timeout_seconds(10);
/// assert!(task.next_execution_at.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub target_url: String,
    pub http_method: HttpMethod,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<String>,
    pub frequency_minutes: i32,
    pub timeout_seconds: i32,
    pub retry_attempts: i32,
    pub retry_delay_seconds: i32,
    pub is_enabled: bool,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub next_execution_at: Option<DateTime<Utc>>,
    pub success_count: i64,
    pub failure_count: i64,
    pub avg_response_time: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 创建新任务
    pub fn new(name: String, target_url: String, http_method: HttpMethod) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由存储层生成
            name,
            target_url,
            http_method,
            headers: None,
            body: None,
            frequency_minutes: 5,
            timeout_seconds: 30,
            retry_attempts: 0,
            retry_delay_seconds: 0,
            is_enabled: true,
            last_executed_at: None,
            next_execution_at: None,
            success_count: 0,
            failure_count: 0,
            avg_response_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_frequency_minutes(mut self, minutes: i32) -> Self {
        self.frequency_minutes = minutes;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: i32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// 检查任务在给定时间是否到期
    ///
    /// 未启用的任务永远不会到期；从未调度过（`next_execution_at` 为空）的任务立即到期。
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_enabled && self.next_execution_at.is_none_or(|next| next <= now)
    }

    /// 以 `now` 为锚点计算下一次执行时间
    pub fn next_execution_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::minutes(i64::from(self.frequency_minutes.max(1)))
    }

    /// 计算受引擎上限约束的实际超时
    pub fn effective_timeout(&self, engine_cap_seconds: u64) -> Duration {
        let requested = u64::try_from(self.timeout_seconds.max(1)).unwrap_or(1);
        Duration::from_secs(requested.min(engine_cap_seconds.max(1)))
    }

    /// 请求体仅在 POST/PUT 时附带
    pub fn request_body(&self) -> Option<&str> {
        if self.http_method.allows_body() {
            self.body.as_deref()
        } else {
            None
        }
    }

    /// 校验任务定义
    pub fn validate(&self) -> crate::Result<()> {
        if self.frequency_minutes < 1 {
            return Err(crate::SchedulerError::InvalidTaskParams(format!(
                "执行频率必须至少为1分钟: {}",
                self.frequency_minutes
            )));
        }
        if self.timeout_seconds < 1 {
            return Err(crate::SchedulerError::InvalidTaskParams(format!(
                "超时时间必须大于0: {}",
                self.timeout_seconds
            )));
        }
        if self.target_url.trim().is_empty() {
            return Err(crate::SchedulerError::InvalidTaskParams(
                "目标URL不能为空".to_string(),
            ));
        }
        Ok(())
    }
}

/// 支持的HTTP方法
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "DELETE")]
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn allows_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = crate::SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(crate::SchedulerError::InvalidTaskParams(format!(
                "不支持的HTTP方法: {s}"
            ))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for HttpMethod {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for HttpMethod {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<HttpMethod>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for HttpMethod {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}
