use serde::{Deserialize, Serialize};

/// 执行引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 内部定时触发间隔（秒）
    pub tick_interval_seconds: u64,
    /// 单个 tick 内的最大并发执行数
    pub max_concurrent_executions: usize,
    /// 单次请求超时上限（秒）
    pub max_request_timeout_seconds: u64,
    pub claim_enabled: bool,
    /// 认领租约时长（秒），应大于最大请求超时
    pub claim_lease_seconds: u64,
    /// 平均响应时间的滚动窗口大小
    pub avg_window_size: i64,
    /// 响应体截断长度（字符）
    pub response_body_limit: usize,
    pub user_agent: String,
    #[serde(default)]
    pub log_retention_days: Option<u32>,
    pub cleanup_interval_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
            max_concurrent_executions: 10,
            max_request_timeout_seconds: 30,
            claim_enabled: true,
            claim_lease_seconds: 120,
            avg_window_size: 10,
            response_body_limit: 1000,
            user_agent: "Cron-Job-Service/1.0".to_string(),
            log_retention_days: None,
            cleanup_interval_seconds: 3600,
        }
    }
}

impl EngineConfig {
    /// 验证引擎配置
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(anyhow::anyhow!("触发间隔必须大于0"));
        }

        if self.max_concurrent_executions == 0 {
            return Err(anyhow::anyhow!("最大并发执行数必须大于0"));
        }

        if self.max_request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时上限必须大于0"));
        }

        if self.claim_enabled && self.claim_lease_seconds <= self.max_request_timeout_seconds {
            return Err(anyhow::anyhow!(
                "认领租约时长({}秒)必须大于请求超时上限({}秒)",
                self.claim_lease_seconds,
                self.max_request_timeout_seconds
            ));
        }

        if self.avg_window_size <= 0 {
            return Err(anyhow::anyhow!("平均响应时间窗口必须大于0"));
        }

        if self.user_agent.trim().is_empty() {
            return Err(anyhow::anyhow!("User-Agent不能为空"));
        }

        if self.log_retention_days == Some(0) {
            return Err(anyhow::anyhow!("日志保留天数必须大于0"));
        }

        if self.cleanup_interval_seconds == 0 {
            return Err(anyhow::anyhow!("清理间隔必须大于0"));
        }

        Ok(())
    }
}
