use std::sync::Arc;

use pinger_core::{traits::TaskStore, DatabaseConfig, SchedulerResult};
use tracing::info;

use super::sqlite::SqliteTaskStore;
use crate::memory_store::InMemoryTaskStore;

/// 根据数据库URL识别存储后端
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseType {
    SQLite,
    Memory,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("memory://") {
            DatabaseType::Memory
        } else {
            DatabaseType::SQLite
        }
    }
}

enum StoreBackend {
    SQLite(Arc<SqliteTaskStore>),
    Memory(Arc<InMemoryTaskStore>),
}

/// 统一的存储管理器
///
/// 按配置创建对应后端，并以 `Arc<dyn TaskStore>` 形式交给引擎和API层共享。
pub struct DatabaseManager {
    backend: StoreBackend,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let backend = match DatabaseType::from_url(&config.url) {
            DatabaseType::Memory => {
                info!("使用内存任务存储");
                StoreBackend::Memory(Arc::new(InMemoryTaskStore::new()))
            }
            DatabaseType::SQLite => {
                let store = SqliteTaskStore::connect(config).await?;
                info!("SQLite任务存储已就绪: {}", config.url);
                StoreBackend::SQLite(Arc::new(store))
            }
        };

        Ok(Self { backend })
    }

    pub fn database_type(&self) -> DatabaseType {
        match self.backend {
            StoreBackend::SQLite(_) => DatabaseType::SQLite,
            StoreBackend::Memory(_) => DatabaseType::Memory,
        }
    }

    pub fn task_store(&self) -> Arc<dyn TaskStore> {
        match &self.backend {
            StoreBackend::SQLite(store) => store.clone(),
            StoreBackend::Memory(store) => store.clone(),
        }
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        self.task_store().health_check().await
    }

    pub async fn close(&self) {
        if let StoreBackend::SQLite(store) = &self.backend {
            store.pool().close().await;
        }
    }
}
