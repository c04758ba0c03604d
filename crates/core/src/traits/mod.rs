pub mod task_executor;
pub mod task_store;

pub use task_executor::*;
pub use task_store::*;
