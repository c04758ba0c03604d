//! # pinger-core
//!
//! 定时HTTP探测引擎的核心定义：错误类型、数据模型、配置以及存储和执行器接口。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::{ApiConfig, AppConfig, DatabaseConfig, EngineConfig, ObservabilityConfig};
pub use errors::*;
pub use models::{
    rolling_average, ExecutionResult, ExecutionStats, HttpMethod, SchedulingUpdate, Task, TaskLog,
    TaskLogStatus, TickSummary,
};
pub use traits::{TaskExecutor, TaskStore};

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
