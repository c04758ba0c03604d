use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pinger_core::{traits::TaskStore, EngineConfig, SchedulerResult};
use tokio::time::interval;
use tracing::{info, warn};

use crate::observability::{MetricsCollector, StructuredLogger};

/// 日志保留配置
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// 清理间隔（秒）
    pub cleanup_interval_seconds: u64,
    /// 执行日志保留天数
    pub retention_days: u32,
}

impl RetentionConfig {
    /// 引擎未配置保留天数时返回 `None`，即不启用清理
    pub fn from_engine(engine: &EngineConfig) -> Option<Self> {
        engine.log_retention_days.map(|retention_days| Self {
            cleanup_interval_seconds: engine.cleanup_interval_seconds,
            retention_days,
        })
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.retention_days))
    }
}

/// 执行日志清理服务
///
/// 定期删除超过保留期的执行日志，防止日志表无限增长。
pub struct LogRetentionService {
    store: Arc<dyn TaskStore>,
    metrics: Arc<MetricsCollector>,
    config: RetentionConfig,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl LogRetentionService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        metrics: Arc<MetricsCollector>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            store,
            metrics,
            config,
            shutdown_tx: None,
            cleanup_handle: None,
        }
    }

    /// 启动后台清理循环
    pub fn start(&mut self) {
        info!(
            "启动日志清理服务: 保留{}天, 间隔{}秒",
            self.config.retention_days, self.config.cleanup_interval_seconds
        );

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut cleanup_interval =
                interval(std::time::Duration::from_secs(config.cleanup_interval_seconds));

            loop {
                tokio::select! {
                    _ = cleanup_interval.tick() => {
                        if let Err(e) = Self::perform_cleanup(&store, &metrics, &config, Utc::now()).await {
                            StructuredLogger::log_system_error("log_retention", "purge_logs", &e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("日志清理服务收到停止信号");
                        break;
                    }
                }
            }
        });

        self.cleanup_handle = Some(handle);
    }

    /// 停止后台清理循环
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.cleanup_handle.take() {
            if let Err(e) = handle.await {
                warn!("等待日志清理服务停止时出错: {}", e);
            }
        }

        info!("日志清理服务已停止");
    }

    /// 以给定时间为基准执行一次清理
    pub async fn purge_once(&self, now: DateTime<Utc>) -> SchedulerResult<u64> {
        Self::perform_cleanup(&self.store, &self.metrics, &self.config, now).await
    }

    async fn perform_cleanup(
        store: &Arc<dyn TaskStore>,
        metrics: &MetricsCollector,
        config: &RetentionConfig,
        now: DateTime<Utc>,
    ) -> SchedulerResult<u64> {
        let cutoff = config.cutoff(now);
        let purged = store.purge_logs_before(cutoff).await?;

        metrics.record_logs_purged(purged);
        StructuredLogger::log_logs_purged(cutoff, purged);
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::InMemoryTaskStore;
    use chrono::TimeZone;
    use pinger_core::models::{ExecutionResult, HttpMethod, Task, TaskLog};

    #[test]
    fn test_retention_disabled_without_days() {
        let engine = EngineConfig::default();
        assert!(RetentionConfig::from_engine(&engine).is_none());

        let engine = EngineConfig {
            log_retention_days: Some(7),
            ..EngineConfig::default()
        };
        let config = RetentionConfig::from_engine(&engine).unwrap();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.cleanup_interval_seconds, 3600);
    }

    #[tokio::test]
    async fn test_purge_once_removes_expired_logs() {
        let store = Arc::new(InMemoryTaskStore::new());
        let task = store
            .create_task(&Task::new(
                "retention".into(),
                "https://example.com".into(),
                HttpMethod::Get,
            ))
            .await
            .unwrap();

        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        for days_ago in [1, 6, 8, 30] {
            let log = TaskLog::from_result(
                &task,
                &ExecutionResult::success(200, 5),
                now - Duration::days(days_ago),
            );
            store.create_log(&log).await.unwrap();
        }

        let service = LogRetentionService::new(
            store.clone(),
            Arc::new(MetricsCollector::new()),
            RetentionConfig {
                cleanup_interval_seconds: 60,
                retention_days: 7,
            },
        );

        assert_eq!(service.purge_once(now).await.unwrap(), 2);
        assert_eq!(store.log_count().await, 2);
        assert_eq!(service.purge_once(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let mut service = LogRetentionService::new(
            store,
            Arc::new(MetricsCollector::new()),
            RetentionConfig {
                cleanup_interval_seconds: 3600,
                retention_days: 1,
            },
        );

        service.start();
        service.stop().await;
        assert!(service.cleanup_handle.is_none());
    }
}
