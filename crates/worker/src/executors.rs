use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pinger_core::{
    models::{ExecutionResult, HttpMethod, Task},
    traits::TaskExecutor,
    EngineConfig,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::Url;
use tracing::{debug, error, info};

/// HTTP执行器配置
#[derive(Debug, Clone)]
pub struct HttpExecutorConfig {
    /// 默认User-Agent，任务头部可覆盖
    pub user_agent: String,
    /// 单次请求超时上限（秒）
    pub max_timeout_seconds: u64,
    /// 保留的响应体字符数
    pub response_body_limit: usize,
}

impl Default for HttpExecutorConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for HttpExecutorConfig {
    fn from(engine: &EngineConfig) -> Self {
        Self {
            user_agent: engine.user_agent.clone(),
            max_timeout_seconds: engine.max_request_timeout_seconds,
            response_body_limit: engine.response_body_limit,
        }
    }
}

/// HTTP任务执行器
///
/// 每次调用独立构建请求，共享的只有内部连接池。
pub struct HttpExecutor {
    client: reqwest::Client,
    config: HttpExecutorConfig,
}

impl HttpExecutor {
    pub fn new(config: HttpExecutorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &HttpExecutorConfig {
        &self.config
    }

    /// 校验URL并合并请求头，任何错误都发生在请求发出之前
    pub(crate) fn prepare(&self, task: &Task) -> Result<(Url, HeaderMap), String> {
        let url = Url::parse(&task.target_url)
            .map_err(|e| format!("无效的目标URL {}: {}", task.target_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("不支持的URL协议: {}", url.scheme()));
        }

        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&self.config.user_agent)
            .map_err(|e| format!("无效的User-Agent: {e}"))?;
        headers.insert(USER_AGENT, user_agent);

        if let Some(task_headers) = &task.headers {
            for (key, value) in task_headers {
                let name = HeaderName::from_bytes(key.as_bytes())
                    .map_err(|e| format!("无效的请求头名称 {key}: {e}"))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| format!("无效的请求头值 {key}: {e}"))?;
                headers.insert(name, value);
            }
        }

        Ok((url, headers))
    }

    fn build_request(
        &self,
        task: &Task,
        url: Url,
        headers: HeaderMap,
        timeout: Duration,
    ) -> reqwest::RequestBuilder {
        let mut request_builder = match task.http_method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
        };

        request_builder = request_builder.timeout(timeout).headers(headers);

        if let Some(body) = task.request_body() {
            request_builder = request_builder.body(body.to_string());
        }

        request_builder
    }

    pub(crate) fn truncate_body(&self, bytes: &[u8]) -> Option<String> {
        if bytes.is_empty() {
            return None;
        }
        Some(
            String::from_utf8_lossy(bytes)
                .chars()
                .take(self.config.response_body_limit)
                .collect(),
        )
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new(HttpExecutorConfig::default())
    }
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut collected: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

fn elapsed_ms(start: Instant) -> i64 {
    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl TaskExecutor for HttpExecutor {
    async fn execute(&self, task: &Task) -> ExecutionResult {
        let timeout = task.effective_timeout(self.config.max_timeout_seconds);

        let (url, headers) = match self.prepare(task) {
            Ok(prepared) => prepared,
            Err(message) => {
                error!("HTTP任务请求构建失败: task_id={}, error={}", task.id, message);
                return ExecutionResult::failed(None, None, message);
            }
        };

        info!(
            "执行HTTP任务: task_id={}, method={}, url={}, timeout={}s",
            task.id,
            task.http_method,
            task.target_url,
            timeout.as_secs()
        );

        let request = self.build_request(task, url, headers, timeout);
        let start_time = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let elapsed = elapsed_ms(start_time);
                if e.is_timeout() {
                    error!("HTTP任务超时: task_id={}, elapsed={}ms", task.id, elapsed);
                    return ExecutionResult::timeout(
                        elapsed,
                        format!("请求超时: {}秒内未收到响应", timeout.as_secs()),
                    );
                }
                error!("HTTP任务执行失败: task_id={}, error={}", task.id, e);
                return ExecutionResult::failed(None, Some(elapsed), format!("HTTP请求失败: {e}"));
            }
        };
        let response_time = elapsed_ms(start_time);

        let status = response.status();
        let status_code = i32::from(status.as_u16());
        let response_headers = collect_headers(response.headers());

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) if e.is_timeout() => {
                error!("读取响应体超时: task_id={}", task.id);
                return ExecutionResult::timeout(
                    elapsed_ms(start_time),
                    format!("请求超时: {}秒内未读完响应体", timeout.as_secs()),
                );
            }
            Err(e) => {
                error!("读取响应体失败: task_id={}, error={}", task.id, e);
                return ExecutionResult::failed(
                    Some(status_code),
                    Some(response_time),
                    format!("读取响应体失败: {e}"),
                );
            }
        };

        let size = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
        let body = self.truncate_body(&bytes);

        let result = if status.is_success() || status.is_redirection() {
            ExecutionResult::success(status_code, response_time)
        } else {
            ExecutionResult::failed(
                Some(status_code),
                Some(response_time),
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            )
        };

        debug!(
            "HTTP任务执行完成: task_id={}, status={}, duration={}ms, size={}",
            task.id, status_code, response_time, size
        );

        result.with_response(size, response_headers, body)
    }

    fn name(&self) -> &str {
        "http"
    }
}
