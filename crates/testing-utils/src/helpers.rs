//! Test helper utilities and common testing patterns

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pinger_core::{models::Task, traits::TaskStore};
use pinger_infrastructure::InMemoryTaskStore;
use tokio::time::sleep;

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Fixed instant on 2024-01-01 used as a deterministic `now`
    pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0)
            .single()
            .unwrap_or_else(|| panic!("invalid test time {hour}:{minute}"))
    }

    /// Fresh in-memory store seeded with `tasks`, returning the stored copies with their ids
    pub async fn memory_store_with(tasks: Vec<Task>) -> (Arc<InMemoryTaskStore>, Vec<Task>) {
        let store = Arc::new(InMemoryTaskStore::new());
        let mut created = Vec::with_capacity(tasks.len());
        for task in tasks {
            created.push(store.create_task(&task).await.unwrap());
        }
        (store, created)
    }

    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(50)).await;
        }

        false
    }
}
