use std::sync::Arc;
use std::time::Duration;

use pinger_core::models::{ExecutionResult, HttpMethod, TaskLogStatus};
use pinger_core::traits::{TaskExecutor, TaskStore};
use pinger_core::SchedulerError;
use pinger_dispatcher::{EngineSettings, ManualExecution, TickEngine};
use pinger_infrastructure::{MetricsCollector, SqliteTaskStore};
use pinger_testing_utils::{
    FlakyTaskStore, PanickingExecutor, StaticExecutor, TaskBuilder, TestEnv,
};
use pinger_worker::{HttpExecutor, HttpExecutorConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine(store: Arc<dyn TaskStore>, executor: Arc<dyn TaskExecutor>) -> TickEngine {
    engine_with(store, executor, EngineSettings::default())
}

fn engine_with(
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn TaskExecutor>,
    settings: EngineSettings,
) -> TickEngine {
    TickEngine::new(store, executor, Arc::new(MetricsCollector::new()), settings)
}

#[tokio::test]
async fn test_only_enabled_due_tasks_run() {
    let (store, tasks) = TestEnv::memory_store_with(vec![
        TaskBuilder::new().with_name("never_run").build(),
        TaskBuilder::new()
            .with_name("overdue")
            .with_next_execution_at(Some(TestEnv::at(11, 59)))
            .build(),
        TaskBuilder::new()
            .with_name("future")
            .with_next_execution_at(Some(TestEnv::at(12, 30)))
            .build(),
        TaskBuilder::new().with_name("disabled").disabled().build(),
    ])
    .await;
    let executor = Arc::new(StaticExecutor::success(42));
    let now = TestEnv::at(12, 0);
    let engine = engine(store.clone(), executor.clone()).with_clock(move || now);

    let summary = engine.run_tick(now).await.unwrap();
    assert_eq!(summary.due_count, 2);
    assert_eq!(summary.executed_count, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.errors, 0);
    assert_eq!(executor.calls(), 2);

    for task in &tasks[..2] {
        let stored = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.next_execution_at, Some(TestEnv::at(12, 5)));
        assert_eq!(stored.last_executed_at, Some(now));
        assert_eq!(stored.success_count, 1);
        assert_eq!(stored.avg_response_time, Some(42));
    }
    let future = store.get_task(tasks[2].id).await.unwrap().unwrap();
    assert_eq!(future.next_execution_at, Some(TestEnv::at(12, 30)));
    assert!(store.list_logs(tasks[3].id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_every_outcome_is_logged_and_rescheduled() {
    let (store, tasks) = TestEnv::memory_store_with(vec![
        TaskBuilder::new().with_frequency_minutes(1).build(),
        TaskBuilder::new().with_frequency_minutes(10).build(),
        TaskBuilder::new().with_frequency_minutes(60).build(),
    ])
    .await;
    let executor = StaticExecutor::success(100)
        .with_result_for(
            tasks[1].id,
            ExecutionResult::failed(Some(500), Some(80), "HTTP 500: Internal Server Error"),
        )
        .with_result_for(tasks[2].id, ExecutionResult::timeout(10_000, "请求超时"));
    let now = TestEnv::at(8, 0);
    let engine = engine(store.clone(), Arc::new(executor)).with_clock(move || now);

    let summary = engine.run_tick(now).await.unwrap();
    assert_eq!(summary.executed_count, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.timed_out, 1);

    let expected = [
        (TestEnv::at(8, 1), TaskLogStatus::Success),
        (TestEnv::at(8, 10), TaskLogStatus::Failed),
        (TestEnv::at(9, 0), TaskLogStatus::Timeout),
    ];
    for (task, (next, status)) in tasks.iter().zip(expected) {
        let stored = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.next_execution_at, Some(next));
        let logs = store.list_logs(task.id, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, status);
        assert_eq!(logs[0].executed_at, now);
    }

    let failed = store.get_task(tasks[1].id).await.unwrap().unwrap();
    assert_eq!(failed.failure_count, 1);
    let timed_out = store.get_task(tasks[2].id).await.unwrap().unwrap();
    assert_eq!(timed_out.failure_count, 1);
    assert_eq!(timed_out.avg_response_time, Some(10_000));
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let tasks = (0..6).map(|_| TaskBuilder::new().build()).collect();
    let (store, _) = TestEnv::memory_store_with(tasks).await;
    let executor = Arc::new(StaticExecutor::success(5).with_delay(Duration::from_millis(50)));
    let settings = EngineSettings {
        max_concurrent_executions: 2,
        ..EngineSettings::default()
    };
    let engine = engine_with(store, executor.clone(), settings);

    let summary = engine.run_tick(TestEnv::at(12, 0)).await.unwrap();
    assert_eq!(summary.executed_count, 6);
    assert_eq!(executor.calls(), 6);
    assert!(executor.max_in_flight() <= 2);
}

#[tokio::test]
async fn test_panicking_executor_does_not_abort_tick() {
    let (store, tasks) = TestEnv::memory_store_with(vec![
        TaskBuilder::new().build(),
        TaskBuilder::new().build(),
        TaskBuilder::new().build(),
    ])
    .await;
    let engine = engine(store.clone(), Arc::new(PanickingExecutor::new([tasks[1].id])));

    let summary = engine.run_tick(TestEnv::at(12, 0)).await.unwrap();
    assert_eq!(summary.due_count, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.errors, 1);

    assert_eq!(store.list_logs(tasks[0].id, 10).await.unwrap().len(), 1);
    assert!(store.list_logs(tasks[1].id, 10).await.unwrap().is_empty());
    assert_eq!(store.list_logs(tasks[2].id, 10).await.unwrap().len(), 1);
}

async fn assert_persist_failure_keeps_task_due(settings: EngineSettings) {
    let (inner, tasks) = TestEnv::memory_store_with(vec![
        TaskBuilder::new()
            .with_next_execution_at(Some(TestEnv::at(11, 0)))
            .build(),
        TaskBuilder::new().build(),
    ])
    .await;
    let flaky = Arc::new(FlakyTaskStore::new(inner.clone()));
    flaky.fail_record_for(tasks[0].id);
    let executor = Arc::new(StaticExecutor::success(10));
    let now = TestEnv::at(12, 0);
    let engine = engine_with(flaky.clone(), executor.clone(), settings).with_clock(move || now);

    let summary = engine.run_tick(now).await.unwrap();
    assert_eq!(summary.executed_count, 2);
    assert_eq!(summary.errors, 1);

    let broken = inner.get_task(tasks[0].id).await.unwrap().unwrap();
    assert_eq!(broken.next_execution_at, Some(TestEnv::at(11, 0)));
    assert_eq!(broken.success_count, 0);
    assert!(inner.list_logs(tasks[0].id, 10).await.unwrap().is_empty());

    let healthy = inner.get_task(tasks[1].id).await.unwrap().unwrap();
    assert_eq!(healthy.next_execution_at, Some(TestEnv::at(12, 5)));

    // 存储恢复后，下一次 tick 立即重新执行该任务
    flaky.heal();
    let next = engine.run_tick(TestEnv::at(12, 1)).await.unwrap();
    assert_eq!(next.due_count, 1);
    assert_eq!(next.succeeded, 1);
    assert_eq!(executor.calls(), 3);
    assert_eq!(inner.list_logs(tasks[0].id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_persist_failure_is_counted_and_task_stays_due() {
    assert_persist_failure_keeps_task_due(EngineSettings::default()).await;
}

#[tokio::test]
async fn test_persist_failure_without_claims_keeps_task_due() {
    let settings = EngineSettings {
        claim_enabled: false,
        ..EngineSettings::default()
    };
    assert_persist_failure_keeps_task_due(settings).await;
}

#[tokio::test]
async fn test_results_are_anchored_at_persistence_time() {
    let (store, tasks) = TestEnv::memory_store_with(vec![TaskBuilder::new()
        .with_frequency_minutes(5)
        .build()])
    .await;
    let engine = engine(store.clone(), Arc::new(StaticExecutor::success(10)))
        .with_clock(|| TestEnv::at(12, 3));

    let summary = engine.run_tick(TestEnv::at(12, 0)).await.unwrap();
    assert_eq!(summary.started_at, TestEnv::at(12, 0));
    assert_eq!(summary.succeeded, 1);

    let stored = store.get_task(tasks[0].id).await.unwrap().unwrap();
    assert_eq!(stored.last_executed_at, Some(TestEnv::at(12, 3)));
    assert_eq!(stored.next_execution_at, Some(TestEnv::at(12, 8)));
    let logs = store.list_logs(tasks[0].id, 10).await.unwrap();
    assert_eq!(logs[0].executed_at, TestEnv::at(12, 3));
}

#[tokio::test]
async fn test_selection_failure_fails_the_tick() {
    let (inner, _) = TestEnv::memory_store_with(vec![TaskBuilder::new().build()]).await;
    let flaky = Arc::new(FlakyTaskStore::new(inner));
    flaky.fail_find_due(true);
    let executor = Arc::new(StaticExecutor::success(1));
    let engine = engine(flaky.clone(), executor.clone());

    assert!(engine.run_tick(TestEnv::at(12, 0)).await.is_err());
    assert_eq!(executor.calls(), 0);

    flaky.heal();
    let summary = engine.run_tick(TestEnv::at(12, 0)).await.unwrap();
    assert_eq!(summary.executed_count, 1);
}

#[tokio::test]
async fn test_claim_failure_skips_execution() {
    let (inner, _) = TestEnv::memory_store_with(vec![TaskBuilder::new().build()]).await;
    let flaky = Arc::new(FlakyTaskStore::new(inner));
    flaky.fail_claims(true);
    let executor = Arc::new(StaticExecutor::success(1));
    let engine = engine(flaky, executor.clone());

    let summary = engine.run_tick(TestEnv::at(12, 0)).await.unwrap();
    assert_eq!(summary.due_count, 1);
    assert_eq!(summary.executed_count, 0);
    assert_eq!(summary.errors, 1);
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_overlapping_ticks_execute_task_once() {
    let (store, tasks) = TestEnv::memory_store_with(vec![TaskBuilder::new().build()]).await;
    let executor = Arc::new(StaticExecutor::success(5).with_delay(Duration::from_millis(50)));
    let now = TestEnv::at(12, 0);
    let first = engine(store.clone(), executor.clone()).with_clock(move || now);
    let second = engine(store.clone(), executor.clone()).with_clock(move || now);

    let (a, b) = tokio::join!(first.run_tick(now), second.run_tick(now));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.executed_count + b.executed_count, 1);
    assert_eq!(executor.calls(), 1);
    assert_eq!(store.list_logs(tasks[0].id, 10).await.unwrap().len(), 1);
    let stored = store.get_task(tasks[0].id).await.unwrap().unwrap();
    assert_eq!(stored.next_execution_at, Some(TestEnv::at(12, 5)));
}

#[tokio::test]
async fn test_execute_now_ignores_schedule() {
    let (store, tasks) = TestEnv::memory_store_with(vec![
        TaskBuilder::new()
            .with_next_execution_at(Some(TestEnv::at(23, 0)))
            .with_frequency_minutes(30)
            .build(),
        TaskBuilder::new().disabled().build(),
    ])
    .await;
    let executor = Arc::new(StaticExecutor::success(7));
    let engine = engine(store.clone(), executor.clone()).with_clock(|| TestEnv::at(12, 0));

    match engine.execute_now(tasks[0].id).await.unwrap() {
        ManualExecution::Executed(log) => {
            assert_eq!(log.status, TaskLogStatus::Success);
            assert!(log.id > 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let stored = store.get_task(tasks[0].id).await.unwrap().unwrap();
    assert_eq!(stored.next_execution_at, Some(TestEnv::at(12, 30)));

    assert!(matches!(
        engine.execute_now(tasks[1].id).await.unwrap(),
        ManualExecution::Skipped(_)
    ));
    assert!(matches!(
        engine.execute_now(9_999).await,
        Err(SchedulerError::TaskNotFound { id: 9_999 })
    ));
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_tick_against_sqlite_and_live_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthy"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = Arc::new(SqliteTaskStore::in_memory().await.unwrap());
    let healthy = store
        .create_task(
            &TaskBuilder::new()
                .with_name("healthy")
                .with_url(&format!("{}/healthy", server.uri()))
                .build(),
        )
        .await
        .unwrap();
    let broken = store
        .create_task(
            &TaskBuilder::new()
                .with_name("broken")
                .with_url(&format!("{}/broken", server.uri()))
                .with_method(HttpMethod::Post)
                .with_body("{\"ping\":true}")
                .build(),
        )
        .await
        .unwrap();

    let executor = Arc::new(HttpExecutor::new(HttpExecutorConfig::default()));
    let now = TestEnv::at(12, 0);
    let engine = engine(store.clone(), executor).with_clock(move || now);

    let summary = engine.run_tick(now).await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors, 0);

    let logs = store.list_logs(healthy.id, 10).await.unwrap();
    assert_eq!(logs[0].http_status_code, Some(200));
    assert_eq!(logs[0].response_body.as_deref(), Some("ok"));

    let logs = store.list_logs(broken.id, 10).await.unwrap();
    assert_eq!(logs[0].status, TaskLogStatus::Failed);
    assert_eq!(
        logs[0].error_message.as_deref(),
        Some("HTTP 503: Service Unavailable")
    );

    let stats = store.execution_stats().await.unwrap();
    assert_eq!(stats.total_executions, 2);
    assert_eq!(stats.successful_executions, 1);
    assert_eq!(stats.success_rate, 50.0);

    // 下一次 tick 时两个任务都未到期
    let summary = engine.run_tick(TestEnv::at(12, 4)).await.unwrap();
    assert_eq!(summary.due_count, 0);
}

#[tokio::test]
async fn test_corrupt_task_row_does_not_block_the_tick() {
    let store = Arc::new(SqliteTaskStore::in_memory().await.unwrap());
    let good = store
        .create_task(&TaskBuilder::new().with_name("good").build())
        .await
        .unwrap();
    let corrupt = store
        .create_task(&TaskBuilder::new().with_name("corrupt").build())
        .await
        .unwrap();
    sqlx::query("UPDATE tasks SET headers = 'not json' WHERE id = ?")
        .bind(corrupt.id)
        .execute(store.pool())
        .await
        .unwrap();

    let executor = Arc::new(StaticExecutor::success(20));
    let now = TestEnv::at(12, 0);
    let engine = engine(store.clone(), executor.clone()).with_clock(move || now);

    let summary = engine.run_tick(now).await.unwrap();
    assert_eq!(summary.due_count, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(executor.calls(), 1);
    assert_eq!(store.list_logs(good.id, 10).await.unwrap().len(), 1);
    assert!(store.list_logs(corrupt.id, 10).await.unwrap().is_empty());

    // 后续 tick 同样不受影响
    let summary = engine.run_tick(TestEnv::at(12, 5)).await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(executor.calls(), 2);
}
