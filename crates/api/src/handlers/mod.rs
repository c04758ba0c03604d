pub mod cron;
pub mod system;
pub mod tasks;
