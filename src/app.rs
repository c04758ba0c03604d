use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use pinger_api::{create_app, AppState};
use pinger_core::{AppConfig, TickSummary};
use pinger_dispatcher::{EngineSettings, TickEngine};
use pinger_infrastructure::{
    DatabaseManager, LogRetentionService, MetricsCollector, RetentionConfig,
};
use pinger_worker::{HttpExecutor, HttpExecutorConfig};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行API服务器，由外部定时服务触发
    Api,
    /// 仅运行内部定时器
    Scheduler,
    /// 同时运行API服务器和内部定时器
    All,
    /// 执行一次 tick 后退出
    Once,
}

impl FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "api" => Ok(AppMode::Api),
            "scheduler" => Ok(AppMode::Scheduler),
            "all" => Ok(AppMode::All),
            "once" => Ok(AppMode::Once),
            other => Err(anyhow::anyhow!("不支持的运行模式: {other}")),
        }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    database: DatabaseManager,
    engine: Arc<TickEngine>,
    metrics: Arc<MetricsCollector>,
    metrics_handle: Option<PrometheusHandle>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(
        config: AppConfig,
        mode: AppMode,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        if mode == AppMode::Api && !config.api.enabled {
            return Err(anyhow::anyhow!("API模式被禁用，请检查配置"));
        }

        let database = DatabaseManager::new(&config.database)
            .await
            .context("初始化任务存储失败")?;

        let metrics = Arc::new(MetricsCollector::new());
        let executor = Arc::new(HttpExecutor::new(HttpExecutorConfig::from(&config.engine)));
        let engine = Arc::new(TickEngine::new(
            database.task_store(),
            executor,
            metrics.clone(),
            EngineSettings::from(&config.engine),
        ));

        Ok(Self {
            config,
            mode,
            database,
            engine,
            metrics,
            metrics_handle,
        })
    }

    pub fn engine(&self) -> Arc<TickEngine> {
        self.engine.clone()
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    /// 构建API路由
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            store: self.database.task_store(),
            cron_secret: self.config.api.cron_secret.clone(),
            metrics_handle: self.metrics_handle.clone(),
        };
        create_app(state, self.config.api.cors_enabled)
    }

    /// 运行应用程序直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        if self.mode == AppMode::Once {
            self.run_once().await?;
            self.database.close().await;
            return Ok(());
        }

        let mut retention = RetentionConfig::from_engine(&self.config.engine).map(|config| {
            LogRetentionService::new(self.database.task_store(), self.metrics.clone(), config)
        });
        if let Some(service) = retention.as_mut() {
            service.start();
        }

        let result = match self.mode {
            AppMode::Api => self.run_api(shutdown_rx).await,
            AppMode::Scheduler => {
                self.run_scheduler(shutdown_rx).await;
                Ok(())
            }
            AppMode::All if self.config.api.enabled => {
                let scheduler_rx = shutdown_rx.resubscribe();
                let (api, ()) =
                    tokio::join!(self.run_api(shutdown_rx), self.run_scheduler(scheduler_rx));
                api
            }
            AppMode::All => {
                info!("API已禁用，仅运行内部定时器");
                self.run_scheduler(shutdown_rx).await;
                Ok(())
            }
            AppMode::Once => Ok(()),
        };

        if let Some(service) = retention.as_mut() {
            service.stop().await;
        }
        self.database.close().await;
        result
    }

    /// 执行单次 tick
    pub async fn run_once(&self) -> Result<TickSummary> {
        let summary = self
            .engine
            .run_tick(Utc::now())
            .await
            .context("执行 tick 失败")?;
        info!(
            "单次执行完成: 到期 {} 个，执行 {} 个，成功 {} 个，失败 {} 个，超时 {} 个",
            summary.due_count,
            summary.executed_count,
            summary.succeeded,
            summary.failed,
            summary.timed_out
        );
        Ok(summary)
    }

    /// 内部定时器循环
    async fn run_scheduler(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let interval_seconds = self.config.engine.tick_interval_seconds;
        info!("启动内部定时器，间隔 {} 秒", interval_seconds);
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.engine.run_tick(Utc::now()).await {
                        error!("tick 执行失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("内部定时器收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 运行API服务器
    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let bind_address = &self.config.api.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", bind_address))?;

        info!("API服务器启动在 http://{}", bind_address);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }
}
