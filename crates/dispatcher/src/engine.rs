use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use pinger_core::{
    models::{ExecutionResult, Task, TaskLog, TaskLogStatus, TickSummary},
    traits::{TaskExecutor, TaskStore},
    EngineConfig, SchedulerError, SchedulerResult,
};
use pinger_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::recorder::ResultRecorder;
use crate::selector::DueTaskSelector;

/// 执行器自身超时之外额外给出的宽限时间
const EXECUTOR_GRACE_SECONDS: u64 = 5;

/// 持久化时刻的时间来源
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 引擎运行参数
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_concurrent_executions: usize,
    pub max_request_timeout_seconds: u64,
    pub claim_enabled: bool,
    pub claim_lease_seconds: u64,
    pub avg_window_size: i64,
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_concurrent_executions: config.max_concurrent_executions,
            max_request_timeout_seconds: config.max_request_timeout_seconds,
            claim_enabled: config.claim_enabled,
            claim_lease_seconds: config.claim_lease_seconds,
            avg_window_size: config.avg_window_size,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// 单个任务在一次 tick 中的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Recorded(TaskLogStatus),
    ClaimLost,
    ClaimFailed,
    PersistFailed(TaskLogStatus),
}

/// 手动执行的结果
#[derive(Debug, Clone)]
pub enum ManualExecution {
    Executed(TaskLog),
    /// 任务已禁用，未执行
    Skipped(Task),
}

/// 单任务处理流水线，可被克隆到各个并发执行单元中
#[derive(Clone)]
struct TaskPipeline {
    executor: Arc<dyn TaskExecutor>,
    selector: Arc<DueTaskSelector>,
    recorder: Arc<ResultRecorder>,
    metrics: Arc<MetricsCollector>,
    clock: Clock,
    max_request_timeout_seconds: u64,
}

impl TaskPipeline {
    /// 执行探测，超出执行器自身超时与宽限时间时强制判为超时
    async fn execute(&self, task: &Task) -> ExecutionResult {
        let budget = task.effective_timeout(self.max_request_timeout_seconds)
            + std::time::Duration::from_secs(EXECUTOR_GRACE_SECONDS);
        let started = Instant::now();

        match tokio::time::timeout(budget, self.executor.execute(task)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("执行器未在{}秒内返回: task_id={}", budget.as_secs(), task.id);
                ExecutionResult::timeout(
                    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
                    format!("执行器未在{}秒内返回", budget.as_secs()),
                )
            }
        }
    }

    async fn process(self, task: Task, now: DateTime<Utc>) -> TaskOutcome {
        match self.selector.try_claim(&task, now).await {
            Ok(true) => {}
            Ok(false) => {
                StructuredLogger::log_task_claim_lost(task.id, &task.name);
                self.metrics.record_claim_lost();
                return TaskOutcome::ClaimLost;
            }
            Err(e) => {
                StructuredLogger::log_system_error("dispatcher", "claim_task", &e);
                return TaskOutcome::ClaimFailed;
            }
        }

        let result = self.execute(&task).await;
        self.metrics
            .record_execution(result.status, result.response_time_ms);
        StructuredLogger::log_task_execution_complete(
            task.id,
            &task.name,
            result.status.as_str(),
            result.http_status_code,
            result.response_time_ms,
            result.error_message.as_deref(),
        );

        let persisted_at = (self.clock)();
        match self.recorder.record(&task, &result, persisted_at).await {
            Ok(_) => TaskOutcome::Recorded(result.status),
            Err(e) => {
                StructuredLogger::log_task_persist_failed(task.id, &task.name, &e);
                self.metrics.record_persist_failure();
                // 恢复认领前的调度时间，下一次 tick 重新选中该任务
                match self.selector.release(&task, now).await {
                    Ok(true) => {}
                    Ok(false) => warn!("任务 {} 的租约已被改写，未恢复调度时间", task.id),
                    Err(e) => StructuredLogger::log_system_error("dispatcher", "release_claim", &e),
                }
                TaskOutcome::PersistFailed(result.status)
            }
        }
    }
}

/// tick 执行引擎
///
/// 每次 tick 查询到期任务，在有限并发下逐个认领、执行并记录结果。
/// 单个任务的任何失败（包括执行器崩溃）都不会中断同一 tick 中的其他任务。
pub struct TickEngine {
    store: Arc<dyn TaskStore>,
    pipeline: TaskPipeline,
    semaphore: Arc<Semaphore>,
    settings: EngineSettings,
}

impl TickEngine {
    pub fn new(
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn TaskExecutor>,
        metrics: Arc<MetricsCollector>,
        settings: EngineSettings,
    ) -> Self {
        let claim_lease = settings
            .claim_enabled
            .then(|| Duration::seconds(i64::try_from(settings.claim_lease_seconds).unwrap_or(i64::MAX)));

        let pipeline = TaskPipeline {
            executor,
            selector: Arc::new(DueTaskSelector::new(store.clone(), claim_lease)),
            recorder: Arc::new(ResultRecorder::new(store.clone(), settings.avg_window_size)),
            metrics,
            clock: Arc::new(Utc::now),
            max_request_timeout_seconds: settings.max_request_timeout_seconds,
        };

        Self {
            store,
            pipeline,
            semaphore: Arc::new(Semaphore::new(settings.max_concurrent_executions.max(1))),
            settings,
        }
    }

    /// 替换记录执行结果时使用的时间来源，默认 `Utc::now`
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.pipeline.clock = Arc::new(clock);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// 执行一次 tick
    ///
    /// `now` 用于到期判断和认领；结果按执行完成后的时钟时间记录和重新调度。
    /// 只有查询到期任务失败时返回错误，单任务失败计入汇总。
    pub async fn run_tick(&self, now: DateTime<Utc>) -> SchedulerResult<TickSummary> {
        self.run_tick_with_id(Uuid::new_v4(), now).await
    }

    /// 以调用方给定的 tick_id 执行一次 tick
    #[instrument(skip(self), fields(tick_id = %tick_id, now = %now))]
    pub async fn run_tick_with_id(
        &self,
        tick_id: Uuid,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TickSummary> {
        let started = Instant::now();
        let mut summary = TickSummary::new(now);
        summary.tick_id = tick_id;

        let due_tasks = match self.pipeline.selector.find_due(now).await {
            Ok(tasks) => tasks,
            Err(e) => {
                StructuredLogger::log_system_error("dispatcher", "find_due_tasks", &e);
                return Err(e);
            }
        };
        summary.due_count = due_tasks.len();
        self.pipeline.metrics.update_due_tasks(due_tasks.len());
        StructuredLogger::log_tick_started(summary.tick_id, now, due_tasks.len());

        let mut join_set = JoinSet::new();
        for task in due_tasks {
            let pipeline = self.pipeline.clone();
            let semaphore = self.semaphore.clone();
            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TaskOutcome::ClaimFailed;
                };
                pipeline.process(task, now).await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(TaskOutcome::Recorded(status)) => summary.record_outcome(status),
                Ok(TaskOutcome::PersistFailed(status)) => {
                    summary.record_outcome(status);
                    summary.errors += 1;
                }
                Ok(TaskOutcome::ClaimLost) => summary.skipped += 1,
                Ok(TaskOutcome::ClaimFailed) => summary.errors += 1,
                Err(e) => {
                    StructuredLogger::log_system_error("dispatcher", "execute_task", &e);
                    summary.errors += 1;
                }
            }
        }

        summary.duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.pipeline.metrics.record_tick(&summary);
        StructuredLogger::log_tick_completed(&summary);
        Ok(summary)
    }

    /// 立即执行指定任务，不受调度时间和认领约束
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn execute_now(&self, task_id: i64) -> SchedulerResult<ManualExecution> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or(SchedulerError::TaskNotFound { id: task_id })?;

        if !task.is_enabled {
            info!("任务 {} 未启用，跳过手动执行", task.id);
            return Ok(ManualExecution::Skipped(task));
        }

        let result = self.pipeline.execute(&task).await;
        self.pipeline
            .metrics
            .record_execution(result.status, result.response_time_ms);
        StructuredLogger::log_task_execution_complete(
            task.id,
            &task.name,
            result.status.as_str(),
            result.http_status_code,
            result.response_time_ms,
            result.error_message.as_deref(),
        );

        let persisted_at = (self.pipeline.clock)();
        let log = self
            .pipeline
            .recorder
            .record(&task, &result, persisted_at)
            .await?;
        Ok(ManualExecution::Executed(log))
    }
}
