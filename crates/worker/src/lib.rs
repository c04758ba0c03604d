pub mod executors;


pub use executors::{HttpExecutor, HttpExecutorConfig};
