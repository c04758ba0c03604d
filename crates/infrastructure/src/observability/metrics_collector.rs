//! Metrics collector for the tick engine
//!
//! Handles are registered against whatever global recorder is installed;
//! without one they are no-ops.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use pinger_core::{TaskLogStatus, TickSummary};

pub struct MetricsCollector {
    // Task execution metrics
    executions_success: Counter,
    executions_failed: Counter,
    executions_timeout: Counter,
    execution_duration: Histogram,
    persist_failures_total: Counter,
    claims_lost_total: Counter,

    // Tick metrics
    ticks_total: Counter,
    tick_duration: Histogram,
    due_tasks: Gauge,

    logs_purged_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            executions_success: counter!("pinger_task_executions_total", "status" => "success"),
            executions_failed: counter!("pinger_task_executions_total", "status" => "failed"),
            executions_timeout: counter!("pinger_task_executions_total", "status" => "timeout"),
            execution_duration: histogram!("pinger_task_execution_duration_seconds"),
            persist_failures_total: counter!("pinger_task_persist_failures_total"),
            claims_lost_total: counter!("pinger_task_claims_lost_total"),
            ticks_total: counter!("pinger_ticks_total"),
            tick_duration: histogram!("pinger_tick_duration_seconds"),
            due_tasks: gauge!("pinger_due_tasks"),
            logs_purged_total: counter!("pinger_logs_purged_total"),
        }
    }

    /// Record a finished execution attempt
    pub fn record_execution(&self, status: TaskLogStatus, response_time_ms: Option<i64>) {
        match status {
            TaskLogStatus::Success => self.executions_success.increment(1),
            TaskLogStatus::Failed => self.executions_failed.increment(1),
            TaskLogStatus::Timeout => self.executions_timeout.increment(1),
        }
        if let Some(ms) = response_time_ms {
            self.execution_duration.record(ms as f64 / 1000.0);
        }
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures_total.increment(1);
    }

    pub fn record_claim_lost(&self) {
        self.claims_lost_total.increment(1);
    }

    pub fn update_due_tasks(&self, count: usize) {
        self.due_tasks.set(count as f64);
    }

    /// Record a completed tick
    pub fn record_tick(&self, summary: &TickSummary) {
        self.ticks_total.increment(1);
        self.tick_duration
            .record(summary.duration_ms as f64 / 1000.0);
    }

    pub fn record_logs_purged(&self, count: u64) {
        self.logs_purged_total.increment(count);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
