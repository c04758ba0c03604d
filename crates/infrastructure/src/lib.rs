pub mod database;
pub mod log_retention;
pub mod memory_store;
pub mod observability;

pub use database::*;
pub use log_retention::{LogRetentionService, RetentionConfig};
pub use memory_store::InMemoryTaskStore;
pub use observability::*;
