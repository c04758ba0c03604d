pub mod manager;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabaseType};
pub use sqlite::SqliteTaskStore;
