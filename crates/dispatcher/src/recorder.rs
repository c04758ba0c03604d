use std::sync::Arc;

use chrono::{DateTime, Utc};
use pinger_core::{
    models::{ExecutionResult, SchedulingUpdate, Task, TaskLog},
    rolling_average,
    traits::TaskStore,
    SchedulerResult,
};

/// 执行结果持久化与重新调度
///
/// 每次尝试写入一条日志，并无条件把下一次执行时间设为 `now + frequency_minutes`，
/// 失败的目标也按自身频率重试。
pub struct ResultRecorder {
    store: Arc<dyn TaskStore>,
    avg_window: i64,
}

impl ResultRecorder {
    pub fn new(store: Arc<dyn TaskStore>, avg_window: i64) -> Self {
        Self { store, avg_window }
    }

    /// 记录一次执行；失败时任务调度状态保持不变
    pub async fn record(
        &self,
        task: &Task,
        result: &ExecutionResult,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TaskLog> {
        let log = TaskLog::from_result(task, result, now);
        let next_execution_at = task.next_execution_after(now);
        let succeeded = result.is_success();

        let build_update = move |samples: &[i64]| SchedulingUpdate {
            last_executed_at: now,
            next_execution_at,
            succeeded,
            avg_response_time: rolling_average(samples),
        };

        self.store
            .record_execution(&log, self.avg_window, &build_update)
            .await
    }
}
