use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinger_core::{
    models::{ExecutionStats, SchedulingUpdate, Task, TaskLog, TaskLogStatus},
    traits::TaskStore,
    SchedulerError, SchedulerResult,
};
use tokio::sync::RwLock;
use tracing::debug;

/// 内存任务存储
///
/// 对应 `memory://` 数据库地址，进程退出后数据丢失。所有写操作在同一把锁内完成，
/// 因此 `record_execution` 与条件认领天然是原子的。
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    inner: RwLock<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    tasks: BTreeMap<i64, Task>,
    logs: Vec<TaskLog>,
    next_task_id: i64,
    next_log_id: i64,
}

impl StoreState {
    fn insert_log(&mut self, log: &TaskLog) -> SchedulerResult<TaskLog> {
        if !self.tasks.contains_key(&log.task_id) {
            return Err(SchedulerError::TaskNotFound { id: log.task_id });
        }
        self.next_log_id += 1;
        let mut saved = log.clone();
        saved.id = self.next_log_id;
        self.logs.push(saved.clone());
        Ok(saved)
    }

    /// 按执行时间倒序（同一时间按id倒序）排列的某任务日志
    fn logs_desc(&self, task_id: i64) -> Vec<&TaskLog> {
        let mut logs: Vec<&TaskLog> = self.logs.iter().filter(|l| l.task_id == task_id).collect();
        logs.sort_by(|a, b| {
            b.executed_at
                .cmp(&a.executed_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        logs
    }

    fn recent_response_times(&self, task_id: i64, limit: i64) -> Vec<i64> {
        self.logs_desc(task_id)
            .into_iter()
            .filter_map(|l| l.response_time_ms)
            .take(usize::try_from(limit).unwrap_or(0))
            .collect()
    }

    fn apply_update(&mut self, task_id: i64, update: &SchedulingUpdate) -> SchedulerResult<()> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(SchedulerError::TaskNotFound { id: task_id })?;

        task.last_executed_at = Some(update.last_executed_at);
        task.next_execution_at = Some(update.next_execution_at);
        if update.succeeded {
            task.success_count += 1;
        } else {
            task.failure_count += 1;
        }
        if update.avg_response_time.is_some() {
            task.avg_response_time = update.avg_response_time;
        }
        task.updated_at = Utc::now();
        Ok(())
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前保存的全部日志数量
    pub async fn log_count(&self) -> usize {
        self.inner.read().await.logs.len()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn find_due_tasks(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Task>> {
        let state = self.inner.read().await;
        let due: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| task.is_due(now))
            .cloned()
            .collect();
        debug!("查询到 {} 个到期任务", due.len());
        Ok(due)
    }

    async fn get_task(&self, id: i64) -> SchedulerResult<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn create_task(&self, task: &Task) -> SchedulerResult<Task> {
        task.validate()?;

        let mut state = self.inner.write().await;
        state.next_task_id += 1;
        let mut created = task.clone();
        created.id = state.next_task_id;
        state.tasks.insert(created.id, created.clone());
        Ok(created)
    }

    async fn delete_task(&self, id: i64) -> SchedulerResult<()> {
        let mut state = self.inner.write().await;
        if state.tasks.remove(&id).is_none() {
            return Err(SchedulerError::TaskNotFound { id });
        }
        state.logs.retain(|log| log.task_id != id);
        Ok(())
    }

    async fn create_log(&self, log: &TaskLog) -> SchedulerResult<TaskLog> {
        self.inner.write().await.insert_log(log)
    }

    async fn recent_response_times(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<i64>> {
        Ok(self.inner.read().await.recent_response_times(task_id, limit))
    }

    async fn update_task_scheduling(
        &self,
        task_id: i64,
        update: &SchedulingUpdate,
    ) -> SchedulerResult<()> {
        self.inner.write().await.apply_update(task_id, update)
    }

    async fn claim_task(
        &self,
        task_id: i64,
        expected_next: Option<DateTime<Utc>>,
        lease_until: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let mut state = self.inner.write().await;
        match state.tasks.get_mut(&task_id) {
            Some(task) if task.is_enabled && task.next_execution_at == expected_next => {
                task.next_execution_at = Some(lease_until);
                task.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_claim(
        &self,
        task_id: i64,
        lease_until: DateTime<Utc>,
        original_next: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        let mut state = self.inner.write().await;
        match state.tasks.get_mut(&task_id) {
            Some(task) if task.next_execution_at == Some(lease_until) => {
                task.next_execution_at = original_next;
                task.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_logs(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<TaskLog>> {
        let state = self.inner.read().await;
        Ok(state
            .logs_desc(task_id)
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn execution_stats(&self) -> SchedulerResult<ExecutionStats> {
        let state = self.inner.read().await;
        let total_executions = state.logs.len() as i64;
        let successful_executions = state
            .logs
            .iter()
            .filter(|l| l.status == TaskLogStatus::Success)
            .count() as i64;
        let times: Vec<i64> = state.logs.iter().filter_map(|l| l.response_time_ms).collect();

        Ok(ExecutionStats {
            total_tasks: state.tasks.len() as i64,
            active_tasks: state.tasks.values().filter(|t| t.is_enabled).count() as i64,
            total_executions,
            successful_executions,
            success_rate: ExecutionStats::compute_success_rate(
                successful_executions,
                total_executions,
            ),
            avg_response_time: pinger_core::rolling_average(&times),
        })
    }

    async fn purge_logs_before(&self, cutoff: DateTime<Utc>) -> SchedulerResult<u64> {
        let mut state = self.inner.write().await;
        let before = state.logs.len();
        state.logs.retain(|log| log.executed_at >= cutoff);
        Ok((before - state.logs.len()) as u64)
    }

    async fn health_check(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn record_execution(
        &self,
        log: &TaskLog,
        avg_window: i64,
        build_update: &(dyn for<'s> Fn(&'s [i64]) -> SchedulingUpdate + Send + Sync),
    ) -> SchedulerResult<TaskLog> {
        let mut state = self.inner.write().await;
        let saved = state.insert_log(log)?;
        let samples = state.recent_response_times(log.task_id, avg_window);
        let update = build_update(&samples);
        state.apply_update(log.task_id, &update)?;
        Ok(saved)
    }
}
