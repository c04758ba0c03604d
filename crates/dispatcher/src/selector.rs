use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pinger_core::{models::Task, traits::TaskStore, SchedulerResult};
use tracing::debug;

/// 到期任务选择与认领
///
/// 认领通过条件更新把 `next_execution_at` 推进到租约截止时间，
/// 同一任务在租约期内不会被并发的 tick 重复执行。
pub struct DueTaskSelector {
    store: Arc<dyn TaskStore>,
    claim_lease: Option<Duration>,
}

impl DueTaskSelector {
    /// `claim_lease` 为空时不做认领
    pub fn new(store: Arc<dyn TaskStore>, claim_lease: Option<Duration>) -> Self {
        Self { store, claim_lease }
    }

    pub async fn find_due(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Task>> {
        self.store.find_due_tasks(now).await
    }

    /// 尝试认领任务，返回是否由当前调用者执行
    pub async fn try_claim(&self, task: &Task, now: DateTime<Utc>) -> SchedulerResult<bool> {
        let Some(lease) = self.claim_lease else {
            return Ok(true);
        };

        let claimed = self
            .store
            .claim_task(task.id, task.next_execution_at, now + lease)
            .await?;
        debug!("认领任务 {}: {}", task.id, claimed);
        Ok(claimed)
    }

    /// 撤销 `try_claim(task, now)` 建立的租约，恢复任务原有的 `next_execution_at`
    pub async fn release(&self, task: &Task, now: DateTime<Utc>) -> SchedulerResult<bool> {
        let Some(lease) = self.claim_lease else {
            return Ok(true);
        };

        let released = self
            .store
            .release_claim(task.id, now + lease, task.next_execution_at)
            .await?;
        debug!("撤销任务 {} 的认领: {}", task.id, released);
        Ok(released)
    }
}
