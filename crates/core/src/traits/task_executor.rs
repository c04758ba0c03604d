//! 任务执行器接口
//!
//! 执行器负责发出一次HTTP探测并把结果折叠为 [`ExecutionResult`]，
//! 无论网络错误、超时还是非2xx响应都不会以错误形式返回。

use async_trait::async_trait;

use crate::models::{ExecutionResult, Task};

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// 执行一次探测
    async fn execute(&self, task: &Task) -> ExecutionResult;

    /// 执行器名称
    fn name(&self) -> &str;
}
