//! Test doubles for the store and executor traits
//!
//! `FlakyTaskStore` injects storage failures around a real store, the executors
//! return canned results without touching the network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinger_core::{
    models::{ExecutionResult, ExecutionStats, SchedulingUpdate, Task, TaskLog},
    traits::{TaskExecutor, TaskStore},
    SchedulerError, SchedulerResult,
};

/// Store wrapper that fails selected operations on demand
pub struct FlakyTaskStore {
    inner: Arc<dyn TaskStore>,
    fail_find: AtomicBool,
    fail_claims: AtomicBool,
    fail_record_for: Mutex<HashSet<i64>>,
}

impl FlakyTaskStore {
    pub fn new(inner: Arc<dyn TaskStore>) -> Self {
        Self {
            inner,
            fail_find: AtomicBool::new(false),
            fail_claims: AtomicBool::new(false),
            fail_record_for: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_find_due(&self, fail: bool) {
        self.fail_find.store(fail, Ordering::SeqCst);
    }

    pub fn fail_claims(&self, fail: bool) {
        self.fail_claims.store(fail, Ordering::SeqCst);
    }

    /// Make every write of an execution attempt for `task_id` fail
    pub fn fail_record_for(&self, task_id: i64) {
        self.fail_record_for.lock().unwrap().insert(task_id);
    }

    pub fn heal(&self) {
        self.fail_find.store(false, Ordering::SeqCst);
        self.fail_claims.store(false, Ordering::SeqCst);
        self.fail_record_for.lock().unwrap().clear();
    }

    fn should_fail_record(&self, task_id: i64) -> bool {
        self.fail_record_for.lock().unwrap().contains(&task_id)
    }

    fn injected(operation: &str) -> SchedulerError {
        SchedulerError::DatabaseOperation(format!("injected failure: {operation}"))
    }
}

#[async_trait]
impl TaskStore for FlakyTaskStore {
    async fn find_due_tasks(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Task>> {
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(Self::injected("find_due_tasks"));
        }
        self.inner.find_due_tasks(now).await
    }

    async fn get_task(&self, id: i64) -> SchedulerResult<Option<Task>> {
        self.inner.get_task(id).await
    }

    async fn create_task(&self, task: &Task) -> SchedulerResult<Task> {
        self.inner.create_task(task).await
    }

    async fn delete_task(&self, id: i64) -> SchedulerResult<()> {
        self.inner.delete_task(id).await
    }

    async fn create_log(&self, log: &TaskLog) -> SchedulerResult<TaskLog> {
        if self.should_fail_record(log.task_id) {
            return Err(Self::injected("create_log"));
        }
        self.inner.create_log(log).await
    }

    async fn recent_response_times(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<i64>> {
        self.inner.recent_response_times(task_id, limit).await
    }

    async fn update_task_scheduling(
        &self,
        task_id: i64,
        update: &SchedulingUpdate,
    ) -> SchedulerResult<()> {
        if self.should_fail_record(task_id) {
            return Err(Self::injected("update_task_scheduling"));
        }
        self.inner.update_task_scheduling(task_id, update).await
    }

    async fn claim_task(
        &self,
        task_id: i64,
        expected_next: Option<DateTime<Utc>>,
        lease_until: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(Self::injected("claim_task"));
        }
        self.inner
            .claim_task(task_id, expected_next, lease_until)
            .await
    }

    async fn release_claim(
        &self,
        task_id: i64,
        lease_until: DateTime<Utc>,
        original_next: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        self.inner
            .release_claim(task_id, lease_until, original_next)
            .await
    }

    async fn list_logs(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<TaskLog>> {
        self.inner.list_logs(task_id, limit).await
    }

    async fn execution_stats(&self) -> SchedulerResult<ExecutionStats> {
        self.inner.execution_stats().await
    }

    async fn purge_logs_before(&self, cutoff: DateTime<Utc>) -> SchedulerResult<u64> {
        self.inner.purge_logs_before(cutoff).await
    }

    async fn health_check(&self) -> SchedulerResult<()> {
        self.inner.health_check().await
    }

    async fn record_execution(
        &self,
        log: &TaskLog,
        avg_window: i64,
        build_update: &(dyn for<'s> Fn(&'s [i64]) -> SchedulingUpdate + Send + Sync),
    ) -> SchedulerResult<TaskLog> {
        if self.should_fail_record(log.task_id) {
            return Err(Self::injected("record_execution"));
        }
        self.inner
            .record_execution(log, avg_window, build_update)
            .await
    }
}

/// Executor returning canned results, optionally after a delay
///
/// Tracks call count and the peak number of concurrent invocations.
pub struct StaticExecutor {
    default_result: ExecutionResult,
    per_task: HashMap<i64, ExecutionResult>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticExecutor {
    pub fn new(default_result: ExecutionResult) -> Self {
        Self {
            default_result,
            per_task: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always succeed with HTTP 200 and the given response time
    pub fn success(response_time_ms: i64) -> Self {
        Self::new(ExecutionResult::success(200, response_time_ms))
    }

    pub fn with_result_for(mut self, task_id: i64, result: ExecutionResult) -> Self {
        self.per_task.insert(task_id, result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for StaticExecutor {
    async fn execute(&self, task: &Task) -> ExecutionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.per_task
            .get(&task.id)
            .cloned()
            .unwrap_or_else(|| self.default_result.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Executor that panics for selected tasks and succeeds for the rest
pub struct PanickingExecutor {
    panic_on: HashSet<i64>,
}

impl PanickingExecutor {
    pub fn new(panic_on: impl IntoIterator<Item = i64>) -> Self {
        Self {
            panic_on: panic_on.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TaskExecutor for PanickingExecutor {
    async fn execute(&self, task: &Task) -> ExecutionResult {
        if self.panic_on.contains(&task.id) {
            panic!("executor exploded for task {}", task.id);
        }
        ExecutionResult::success(200, 1)
    }

    fn name(&self) -> &str {
        "panicking"
    }
}
