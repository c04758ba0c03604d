//! # 数据模型
//!
//! 探测任务、执行日志以及执行引擎产生的结果与汇总。
//!
//! ## 核心模型
//!
//! - [`Task`] 周期性HTTP探测的定义及其调度状态
//! - [`TaskLog`] 单次执行的不可变记录
//! - [`ExecutionResult`] 执行器返回的探测结果
//! - [`TickSummary`] 一次 tick 的汇总
//!
//! 所有时间字段使用 `DateTime<Utc>`。

pub mod execution;
pub mod task;
pub mod task_log;

pub use execution::*;
pub use task::*;
pub use task_log::*;
