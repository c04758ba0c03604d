//! Structured logging utilities
//!
//! Named events emitted by the tick engine and its background services.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use pinger_core::TickSummary;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Structured logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_location: bool,
    pub include_thread_id: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(anyhow::anyhow!("无效的日志格式: {}", other)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
            include_thread_id: false,
        }
    }
}

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log the start of a tick
    pub fn log_tick_started(tick_id: Uuid, now: DateTime<Utc>, due_count: usize) {
        info!(
            event = "tick_started",
            tick.id = %tick_id,
            tick.now = %now,
            tick.due_count = due_count,
            "Tick started"
        );
    }

    /// Log a finished tick with its summary
    pub fn log_tick_completed(summary: &TickSummary) {
        info!(
            event = "tick_completed",
            tick.id = %summary.tick_id,
            tick.due_count = summary.due_count,
            tick.executed = summary.executed_count,
            tick.succeeded = summary.succeeded,
            tick.failed = summary.failed,
            tick.timed_out = summary.timed_out,
            tick.skipped = summary.skipped,
            tick.errors = summary.errors,
            tick.duration_ms = summary.duration_ms,
            "Tick completed"
        );
    }

    /// Log task execution completion
    pub fn log_task_execution_complete(
        task_id: i64,
        task_name: &str,
        status: &str,
        http_status_code: Option<i32>,
        response_time_ms: Option<i64>,
        error_message: Option<&str>,
    ) {
        if status == "success" {
            info!(
                event = "task_execution_complete",
                task.id = task_id,
                task.name = task_name,
                task.status = status,
                task.http_status = http_status_code,
                task.response_time_ms = response_time_ms,
                "Task execution completed successfully"
            );
        } else {
            warn!(
                event = "task_execution_failed",
                task.id = task_id,
                task.name = task_name,
                task.status = status,
                task.http_status = http_status_code,
                task.response_time_ms = response_time_ms,
                task.error = error_message.unwrap_or("Unknown error"),
                "Task execution failed"
            );
        }
    }

    /// Log a claim lost to another tick
    pub fn log_task_claim_lost(task_id: i64, task_name: &str) {
        debug!(
            event = "task_claim_lost",
            task.id = task_id,
            task.name = task_name,
            "Task already claimed elsewhere, skipping"
        );
    }

    /// Log a failure to persist an execution attempt
    pub fn log_task_persist_failed(task_id: i64, task_name: &str, error: &dyn std::error::Error) {
        error!(
            event = "task_persist_failed",
            task.id = task_id,
            task.name = task_name,
            error.message = %error,
            "Failed to persist task execution"
        );
    }

    /// Log system error
    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            error.component = component,
            error.operation = operation,
            error.message = %error,
            "System error occurred"
        );
    }

    /// Log purged execution logs
    pub fn log_logs_purged(cutoff: DateTime<Utc>, purged: u64) {
        info!(
            event = "logs_purged",
            retention.cutoff = %cutoff,
            retention.purged = purged,
            "Expired task logs purged"
        );
    }
}
