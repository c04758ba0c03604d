//! 任务存储接口
//!
//! 执行引擎与API层通过 [`TaskStore`] 访问任务和执行日志，具体实现位于
//! `pinger-infrastructure`（SQLite 与内存两种后端）。
//!
//! 调度状态与聚合统计只通过 [`TaskStore::update_task_scheduling`] 和
//! [`TaskStore::record_execution`] 修改，其他字段由任务管理操作维护。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ExecutionStats, SchedulingUpdate, Task, TaskLog};
use crate::SchedulerResult;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 查询到期任务：已启用且 `next_execution_at` 为空或不晚于 `now`
    async fn find_due_tasks(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Task>>;

    async fn get_task(&self, id: i64) -> SchedulerResult<Option<Task>>;

    async fn create_task(&self, task: &Task) -> SchedulerResult<Task>;

    async fn delete_task(&self, id: i64) -> SchedulerResult<()>;

    /// 追加一条执行日志，返回带生成 `id` 的记录
    async fn create_log(&self, log: &TaskLog) -> SchedulerResult<TaskLog>;

    /// 最近 `limit` 条带耗时日志的响应时间，按执行时间倒序
    async fn recent_response_times(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<i64>>;

    /// 更新调度状态并累加成功/失败计数
    async fn update_task_scheduling(
        &self,
        task_id: i64,
        update: &SchedulingUpdate,
    ) -> SchedulerResult<()>;

    /// 条件认领：仅当 `next_execution_at` 仍等于 `expected_next` 时将其推进到 `lease_until`
    ///
    /// 返回是否认领成功。
    async fn claim_task(
        &self,
        task_id: i64,
        expected_next: Option<DateTime<Utc>>,
        lease_until: DateTime<Utc>,
    ) -> SchedulerResult<bool>;

    /// 撤销认领：仅当 `next_execution_at` 仍为 `lease_until` 时恢复为 `original_next`
    ///
    /// 返回是否恢复成功。
    async fn release_claim(
        &self,
        task_id: i64,
        lease_until: DateTime<Utc>,
        original_next: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool>;

    async fn list_logs(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<TaskLog>>;

    async fn execution_stats(&self) -> SchedulerResult<ExecutionStats>;

    /// 删除早于 `cutoff` 的日志，返回删除数量
    async fn purge_logs_before(&self, cutoff: DateTime<Utc>) -> SchedulerResult<u64>;

    async fn health_check(&self) -> SchedulerResult<()>;

    /// 写入日志、重新计算平均响应时间并更新任务
    ///
    /// 默认实现按顺序执行，支持事务的后端应覆盖为原子操作。
    /// `build_update` 接收最近的响应时间样本并返回调度更新。
    async fn record_execution(
        &self,
        log: &TaskLog,
        avg_window: i64,
        build_update: &(dyn for<'s> Fn(&'s [i64]) -> SchedulingUpdate + Send + Sync),
    ) -> SchedulerResult<TaskLog> {
        let saved = self.create_log(log).await?;
        let samples = self.recent_response_times(log.task_id, avg_window).await?;
        let update = build_update(&samples);
        self.update_task_scheduling(log.task_id, &update).await?;
        Ok(saved)
    }
}
