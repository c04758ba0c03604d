use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinger_core::{
    models::{ExecutionStats, SchedulingUpdate, Task, TaskLog},
    traits::TaskStore,
    DatabaseConfig, SchedulerError, SchedulerResult,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::observability::StructuredLogger;

const TASK_COLUMNS: &str = "id, name, target_url, http_method, headers, body, frequency_minutes, \
     timeout_seconds, retry_attempts, retry_delay_seconds, is_enabled, last_executed_at, \
     next_execution_at, success_count, failure_count, avg_response_time, created_at, updated_at";

const LOG_COLUMNS: &str = "id, task_id, executed_at, status, http_status_code, response_time_ms, \
     response_size, error_message, request_headers, response_headers, response_body";

/// SQLite任务存储
///
/// 时间字段以文本保存，比较统一通过 `julianday()` 完成，兼容外部写入的不同时间格式。
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// 使用已迁移的连接池创建存储
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 按数据库配置建立连接池并运行迁移
    pub async fn connect(config: &DatabaseConfig) -> SchedulerResult<Self> {
        debug!("Creating SQLite task store at: {}", config.url);

        let in_memory = config.url.contains(":memory:");
        let mut connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // 内存数据库只存在于单个连接中，连接池必须固定为一个且不能回收
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(connect_options)
            .await?;

        Self::run_migrations(&pool).await?;

        debug!("Successfully created SQLite task store");
        Ok(Self { pool })
    }

    /// 创建进程内的临时数据库，主要用于测试
    pub async fn in_memory() -> SchedulerResult<Self> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 运行数据库迁移
    pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
        debug!("Running SQLite database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                target_url TEXT NOT NULL,
                http_method TEXT NOT NULL DEFAULT 'GET',
                headers TEXT,
                body TEXT,
                frequency_minutes INTEGER NOT NULL DEFAULT 5,
                timeout_seconds INTEGER NOT NULL DEFAULT 30,
                retry_attempts INTEGER NOT NULL DEFAULT 0,
                retry_delay_seconds INTEGER NOT NULL DEFAULT 0,
                is_enabled INTEGER NOT NULL DEFAULT 1,
                last_executed_at TEXT,
                next_execution_at TEXT,
                success_count INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                avg_response_time INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL,
                executed_at TEXT NOT NULL,
                status TEXT NOT NULL,
                http_status_code INTEGER,
                response_time_ms INTEGER,
                response_size INTEGER,
                error_message TEXT,
                request_headers TEXT,
                response_headers TEXT,
                response_body TEXT,
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_tasks_enabled_next ON tasks(is_enabled, next_execution_at)",
            "CREATE INDEX IF NOT EXISTS idx_task_logs_task_id ON task_logs(task_id)",
            "CREATE INDEX IF NOT EXISTS idx_task_logs_executed_at ON task_logs(executed_at)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql).execute(pool).await?;
        }

        debug!("Successfully completed SQLite database migrations");
        Ok(())
    }

    fn row_to_task(row: &SqliteRow) -> SchedulerResult<Task> {
        let headers: Option<String> = row.try_get("headers")?;

        Ok(Task {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            target_url: row.try_get("target_url")?,
            http_method: row.try_get("http_method")?,
            headers: decode_headers(headers)?,
            body: row.try_get("body")?,
            frequency_minutes: row.try_get("frequency_minutes")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            retry_attempts: row.try_get("retry_attempts")?,
            retry_delay_seconds: row.try_get("retry_delay_seconds")?,
            is_enabled: row.try_get("is_enabled")?,
            last_executed_at: row.try_get("last_executed_at")?,
            next_execution_at: row.try_get("next_execution_at")?,
            success_count: row.try_get("success_count")?,
            failure_count: row.try_get("failure_count")?,
            avg_response_time: row.try_get("avg_response_time")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_log(row: &SqliteRow) -> SchedulerResult<TaskLog> {
        let request_headers: Option<String> = row.try_get("request_headers")?;
        let response_headers: Option<String> = row.try_get("response_headers")?;

        Ok(TaskLog {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            executed_at: row.try_get("executed_at")?,
            status: row.try_get("status")?,
            http_status_code: row.try_get("http_status_code")?,
            response_time_ms: row.try_get("response_time_ms")?,
            response_size: row.try_get("response_size")?,
            error_message: row.try_get("error_message")?,
            request_headers: decode_headers(request_headers)?,
            response_headers: decode_headers(response_headers)?,
            response_body: row.try_get("response_body")?,
        })
    }

    async fn insert_log<'e, E>(executor: E, log: &TaskLog) -> SchedulerResult<TaskLog>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "INSERT INTO task_logs (task_id, executed_at, status, http_status_code, response_time_ms, \
             response_size, error_message, request_headers, response_headers, response_body) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {LOG_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(log.task_id)
            .bind(log.executed_at)
            .bind(log.status)
            .bind(log.http_status_code)
            .bind(log.response_time_ms)
            .bind(log.response_size)
            .bind(&log.error_message)
            .bind(encode_headers(&log.request_headers)?)
            .bind(encode_headers(&log.response_headers)?)
            .bind(&log.response_body)
            .fetch_one(executor)
            .await?;

        Self::row_to_log(&row)
    }

    async fn select_recent_response_times<'e, E>(
        executor: E,
        task_id: i64,
        limit: i64,
    ) -> SchedulerResult<Vec<i64>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let times = sqlx::query_scalar::<_, i64>(
            "SELECT response_time_ms FROM task_logs \
             WHERE task_id = ? AND response_time_ms IS NOT NULL \
             ORDER BY julianday(executed_at) DESC, id DESC LIMIT ?",
        )
        .bind(task_id)
        .bind(limit)
        .fetch_all(executor)
        .await?;

        Ok(times)
    }

    async fn apply_scheduling_update<'e, E>(
        executor: E,
        task_id: i64,
        update: &SchedulingUpdate,
    ) -> SchedulerResult<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let (success_inc, failure_inc) = if update.succeeded { (1, 0) } else { (0, 1) };

        let result = sqlx::query(
            "UPDATE tasks SET last_executed_at = ?, next_execution_at = ?, \
             success_count = success_count + ?, failure_count = failure_count + ?, \
             avg_response_time = COALESCE(?, avg_response_time), updated_at = ? \
             WHERE id = ?",
        )
        .bind(update.last_executed_at)
        .bind(update.next_execution_at)
        .bind(success_inc)
        .bind(failure_inc)
        .bind(update.avg_response_time)
        .bind(Utc::now())
        .bind(task_id)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound { id: task_id });
        }
        Ok(())
    }
}

fn encode_headers(headers: &Option<HashMap<String, String>>) -> SchedulerResult<Option<String>> {
    Ok(headers.as_ref().map(serde_json::to_string).transpose()?)
}

fn decode_headers(raw: Option<String>) -> SchedulerResult<Option<HashMap<String, String>>> {
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(json) => Ok(Some(serde_json::from_str(json)?)),
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    #[instrument(skip(self), fields(now = %now))]
    async fn find_due_tasks(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE is_enabled = 1 \
             AND (next_execution_at IS NULL OR julianday(next_execution_at) <= julianday(?)) \
             ORDER BY id"
        );

        let rows = sqlx::query(&sql).bind(now).fetch_all(&self.pool).await?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_task(row) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    let task_id: Option<i64> = row.try_get("id").ok();
                    warn!("跳过无法解析的任务记录: task_id={:?}", task_id);
                    StructuredLogger::log_system_error("task_store", "decode_task", &e);
                }
            }
        }

        debug!("查询到 {} 个到期任务", tasks.len());
        Ok(tasks)
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn get_task(&self, id: i64) -> SchedulerResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    #[instrument(skip(self, task), fields(task_name = %task.name))]
    async fn create_task(&self, task: &Task) -> SchedulerResult<Task> {
        task.validate()?;

        let sql = format!(
            "INSERT INTO tasks (name, target_url, http_method, headers, body, frequency_minutes, \
             timeout_seconds, retry_attempts, retry_delay_seconds, is_enabled, last_executed_at, \
             next_execution_at, success_count, failure_count, avg_response_time, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {TASK_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(&task.name)
            .bind(&task.target_url)
            .bind(task.http_method)
            .bind(encode_headers(&task.headers)?)
            .bind(&task.body)
            .bind(task.frequency_minutes)
            .bind(task.timeout_seconds)
            .bind(task.retry_attempts)
            .bind(task.retry_delay_seconds)
            .bind(task.is_enabled)
            .bind(task.last_executed_at)
            .bind(task.next_execution_at)
            .bind(task.success_count)
            .bind(task.failure_count)
            .bind(task.avg_response_time)
            .bind(task.created_at)
            .bind(task.updated_at)
            .fetch_one(&self.pool)
            .await?;

        let created = Self::row_to_task(&row)?;
        debug!("创建任务成功: ID {}, 名称: {}", created.id, created.name);
        Ok(created)
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn delete_task(&self, id: i64) -> SchedulerResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound { id });
        }
        Ok(())
    }

    #[instrument(skip(self, log), fields(task_id = %log.task_id, status = %log.status))]
    async fn create_log(&self, log: &TaskLog) -> SchedulerResult<TaskLog> {
        Self::insert_log(&self.pool, log).await
    }

    async fn recent_response_times(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<i64>> {
        Self::select_recent_response_times(&self.pool, task_id, limit).await
    }

    #[instrument(skip(self, update), fields(task_id = %task_id))]
    async fn update_task_scheduling(
        &self,
        task_id: i64,
        update: &SchedulingUpdate,
    ) -> SchedulerResult<()> {
        Self::apply_scheduling_update(&self.pool, task_id, update).await
    }

    #[instrument(skip(self), fields(task_id = %task_id))]
    async fn claim_task(
        &self,
        task_id: i64,
        expected_next: Option<DateTime<Utc>>,
        lease_until: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET next_execution_at = ?, updated_at = ? \
             WHERE id = ? AND is_enabled = 1 \
             AND julianday(next_execution_at) IS julianday(?)",
        )
        .bind(lease_until)
        .bind(Utc::now())
        .bind(task_id)
        .bind(expected_next)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(task_id = %task_id))]
    async fn release_claim(
        &self,
        task_id: i64,
        lease_until: DateTime<Utc>,
        original_next: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET next_execution_at = ?, updated_at = ? \
             WHERE id = ? AND julianday(next_execution_at) IS julianday(?)",
        )
        .bind(original_next)
        .bind(Utc::now())
        .bind(task_id)
        .bind(lease_until)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(task_id = %task_id))]
    async fn list_logs(&self, task_id: i64, limit: i64) -> SchedulerResult<Vec<TaskLog>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM task_logs WHERE task_id = ? \
             ORDER BY julianday(executed_at) DESC, id DESC LIMIT ?"
        );

        let rows = sqlx::query(&sql)
            .bind(task_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_log).collect()
    }

    async fn execution_stats(&self) -> SchedulerResult<ExecutionStats> {
        let task_row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(CASE WHEN is_enabled = 1 THEN 1 ELSE 0 END), 0) AS active FROM tasks",
        )
        .fetch_one(&self.pool)
        .await?;

        let log_row = sqlx::query(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0) AS successful, \
             AVG(response_time_ms) AS avg_time FROM task_logs",
        )
        .fetch_one(&self.pool)
        .await?;

        let total_executions: i64 = log_row.try_get("total")?;
        let successful_executions: i64 = log_row.try_get("successful")?;
        let avg_time: Option<f64> = log_row.try_get("avg_time")?;

        Ok(ExecutionStats {
            total_tasks: task_row.try_get("total")?,
            active_tasks: task_row.try_get("active")?,
            total_executions,
            successful_executions,
            success_rate: ExecutionStats::compute_success_rate(
                successful_executions,
                total_executions,
            ),
            avg_response_time: avg_time.map(|avg| avg.round() as i64),
        })
    }

    #[instrument(skip(self), fields(cutoff = %cutoff))]
    async fn purge_logs_before(&self, cutoff: DateTime<Utc>) -> SchedulerResult<u64> {
        let result =
            sqlx::query("DELETE FROM task_logs WHERE julianday(executed_at) < julianday(?)")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 单事务完成日志写入、平均值计算和任务更新
    #[instrument(skip(self, log, build_update), fields(task_id = %log.task_id))]
    async fn record_execution(
        &self,
        log: &TaskLog,
        avg_window: i64,
        build_update: &(dyn for<'s> Fn(&'s [i64]) -> SchedulingUpdate + Send + Sync),
    ) -> SchedulerResult<TaskLog> {
        let mut tx = self.pool.begin().await?;

        let saved = Self::insert_log(&mut *tx, log).await?;
        let samples = Self::select_recent_response_times(&mut *tx, log.task_id, avg_window).await?;
        let update = build_update(&samples);
        Self::apply_scheduling_update(&mut *tx, log.task_id, &update).await?;

        tx.commit().await?;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pinger_core::models::{ExecutionResult, HttpMethod, TaskLogStatus};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn sample_task(name: &str) -> Task {
        Task::new(
            name.to_string(),
            "https://example.com/health".to_string(),
            HttpMethod::Get,
        )
    }

    fn sample_log(task: &Task, executed_at: DateTime<Utc>, time_ms: Option<i64>) -> TaskLog {
        let mut result = ExecutionResult::success(200, time_ms.unwrap_or(0));
        result.response_time_ms = time_ms;
        TaskLog::from_result(task, &result, executed_at)
    }

    #[tokio::test]
    async fn test_create_and_get_task() {
        let store = SqliteTaskStore::in_memory().await.unwrap();

        let mut headers = HashMap::new();
        headers.insert("X-Api-Key".to_string(), "k".to_string());
        let task = sample_task("api").with_headers(headers.clone()).with_body("{}");

        let created = store.create_task(&task).await.unwrap();
        assert!(created.id > 0);

        let loaded = store.get_task(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "api");
        assert_eq!(loaded.headers, Some(headers));
        assert_eq!(loaded.body.as_deref(), Some("{}"));
        assert_eq!(loaded.http_method, HttpMethod::Get);
        assert!(loaded.next_execution_at.is_none());

        assert!(store.get_task(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_due_tasks_filters() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let now = at(12, 0);

        let mut never = sample_task("never-run");
        never.next_execution_at = None;
        let mut exact = sample_task("exact");
        exact.next_execution_at = Some(now);
        let mut future = sample_task("future");
        future.next_execution_at = Some(at(12, 1));
        let mut disabled = sample_task("disabled");
        disabled.is_enabled = false;
        disabled.next_execution_at = Some(at(11, 0));

        for task in [&never, &exact, &future, &disabled] {
            store.create_task(task).await.unwrap();
        }

        let due = store.find_due_tasks(now).await.unwrap();
        let names: Vec<_> = due.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["never-run", "exact"]);
    }

    #[tokio::test]
    async fn test_claim_task_is_conditional() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let mut task = sample_task("claim");
        task.next_execution_at = Some(at(11, 55));
        let task = store.create_task(&task).await.unwrap();

        let lease = at(12, 2);
        assert!(store
            .claim_task(task.id, Some(at(11, 55)), lease)
            .await
            .unwrap());
        assert!(
            !store
                .claim_task(task.id, Some(at(11, 55)), lease)
                .await
                .unwrap(),
            "第二次认领必须失败"
        );

        let loaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.next_execution_at, Some(lease));
    }

    #[tokio::test]
    async fn test_claim_task_with_null_next_execution() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let task = store.create_task(&sample_task("fresh")).await.unwrap();

        assert!(store.claim_task(task.id, None, at(12, 2)).await.unwrap());
        assert!(!store.claim_task(task.id, None, at(12, 2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_execution_updates_task_and_average() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let task = store.create_task(&sample_task("record")).await.unwrap();

        for (minute, time) in [(1, Some(100)), (2, None), (3, Some(200))] {
            let log = sample_log(&task, at(12, minute), time);
            store.create_log(&log).await.unwrap();
        }

        let log = sample_log(&task, at(12, 4), Some(301));
        let saved = store
            .record_execution(&log, 10, &|samples: &[i64]| SchedulingUpdate {
                last_executed_at: at(12, 4),
                next_execution_at: at(12, 9),
                succeeded: true,
                avg_response_time: pinger_core::rolling_average(samples),
            })
            .await
            .unwrap();
        assert!(saved.id > 0);

        let loaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.success_count, 1);
        assert_eq!(loaded.failure_count, 0);
        assert_eq!(loaded.last_executed_at, Some(at(12, 4)));
        assert_eq!(loaded.next_execution_at, Some(at(12, 9)));
        // (301 + 200 + 100) / 3 = 200.33
        assert_eq!(loaded.avg_response_time, Some(200));

        let recent = store.recent_response_times(task.id, 2).await.unwrap();
        assert_eq!(recent, vec![301, 200]);
    }

    #[tokio::test]
    async fn test_record_execution_rolls_back_for_missing_task() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let mut ghost = sample_task("ghost");
        ghost.id = 404;

        let log = sample_log(&ghost, at(12, 0), Some(10));
        let result = store
            .record_execution(&log, 10, &|_: &[i64]| SchedulingUpdate {
                last_executed_at: at(12, 0),
                next_execution_at: at(12, 5),
                succeeded: true,
                avg_response_time: None,
            })
            .await;
        assert!(result.is_err());
        assert!(store.list_logs(404, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_null_average_keeps_previous_value() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let mut task = sample_task("avg");
        task.avg_response_time = Some(120);
        let task = store.create_task(&task).await.unwrap();

        store
            .update_task_scheduling(
                task.id,
                &SchedulingUpdate {
                    last_executed_at: at(12, 0),
                    next_execution_at: at(12, 5),
                    succeeded: false,
                    avg_response_time: None,
                },
            )
            .await
            .unwrap();

        let loaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.avg_response_time, Some(120));
        assert_eq!(loaded.failure_count, 1);
    }

    #[tokio::test]
    async fn test_list_logs_stats_and_purge() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let task = store.create_task(&sample_task("stats")).await.unwrap();

        store
            .create_log(&sample_log(&task, at(10, 0), Some(100)))
            .await
            .unwrap();
        let failed = ExecutionResult::failed(Some(500), Some(300), "HTTP 500: Internal Server Error");
        store
            .create_log(&TaskLog::from_result(&task, &failed, at(11, 0)))
            .await
            .unwrap();

        let logs = store.list_logs(task.id, 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status, TaskLogStatus::Failed);
        assert_eq!(logs[1].status, TaskLogStatus::Success);

        let stats = store.execution_stats().await.unwrap();
        assert_eq!(stats.total_tasks, 1);
        assert_eq!(stats.active_tasks, 1);
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.avg_response_time, Some(200));

        let purged = store.purge_logs_before(at(10, 30)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.list_logs(task.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_task_cascades_logs() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let task = store.create_task(&sample_task("cascade")).await.unwrap();
        store
            .create_log(&sample_log(&task, at(10, 0), Some(1)))
            .await
            .unwrap();

        store.delete_task(task.id).await.unwrap();
        assert!(store.list_logs(task.id, 10).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_task(task.id).await,
            Err(SchedulerError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_due_tasks_skips_undecodable_rows() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let good = store.create_task(&sample_task("good")).await.unwrap();
        let bad_headers = store.create_task(&sample_task("bad-headers")).await.unwrap();
        let bad_method = store.create_task(&sample_task("bad-method")).await.unwrap();

        sqlx::query("UPDATE tasks SET headers = 'not json' WHERE id = ?")
            .bind(bad_headers.id)
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query("UPDATE tasks SET http_method = 'FETCH' WHERE id = ?")
            .bind(bad_method.id)
            .execute(store.pool())
            .await
            .unwrap();

        let due = store.find_due_tasks(at(12, 0)).await.unwrap();
        let ids: Vec<_> = due.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![good.id]);
    }

    #[tokio::test]
    async fn test_release_claim_only_undoes_matching_lease() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let mut task = sample_task("release");
        task.next_execution_at = Some(at(11, 0));
        let task = store.create_task(&task).await.unwrap();

        assert!(store.claim_task(task.id, Some(at(11, 0)), at(12, 2)).await.unwrap());
        assert!(!store.release_claim(task.id, at(12, 3), Some(at(11, 0))).await.unwrap());
        assert!(store.release_claim(task.id, at(12, 2), Some(at(11, 0))).await.unwrap());

        let loaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.next_execution_at, Some(at(11, 0)));

        let fresh = store.create_task(&sample_task("fresh")).await.unwrap();
        assert!(store.claim_task(fresh.id, None, at(12, 2)).await.unwrap());
        assert!(store.release_claim(fresh.id, at(12, 2), None).await.unwrap());
        let ids: Vec<_> = store
            .find_due_tasks(at(12, 0))
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![task.id, fresh.id]);
    }

    #[tokio::test]
    async fn test_average_window_drops_older_samples() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let task = store.create_task(&sample_task("window")).await.unwrap();

        for minute in 0..2 {
            store
                .create_log(&sample_log(&task, at(12, minute), Some(10_000)))
                .await
                .unwrap();
        }
        for minute in 2..12 {
            store
                .create_log(&sample_log(&task, at(12, minute), Some(100)))
                .await
                .unwrap();
        }
        assert_eq!(
            store.recent_response_times(task.id, 10).await.unwrap(),
            vec![100; 10]
        );

        let log = sample_log(&task, at(12, 12), Some(400));
        store
            .record_execution(&log, 10, &|samples: &[i64]| SchedulingUpdate {
                last_executed_at: at(12, 12),
                next_execution_at: at(12, 17),
                succeeded: true,
                avg_response_time: pinger_core::rolling_average(samples),
            })
            .await
            .unwrap();

        // (400 + 9 * 100) / 10，两条 10000ms 的旧样本不在窗口内
        let loaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.avg_response_time, Some(130));
    }

    #[tokio::test]
    async fn test_average_window_prefers_latest_insert_on_equal_time() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let task = store.create_task(&sample_task("tie")).await.unwrap();

        for time in [700, 900] {
            store
                .create_log(&sample_log(&task, at(13, 0), Some(time)))
                .await
                .unwrap();
        }
        store
            .create_log(&sample_log(&task, at(12, 0), Some(50)))
            .await
            .unwrap();

        assert_eq!(
            store.recent_response_times(task.id, 2).await.unwrap(),
            vec![900, 700]
        );
    }
}
