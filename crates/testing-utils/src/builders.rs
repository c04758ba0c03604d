//! Test data builders for creating test entities
//!
//! Builders start from sensible defaults so tests only spell out what they care about.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pinger_core::models::{HttpMethod, Task};

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let mut task = Task::new(
            "test_task".to_string(),
            "http://127.0.0.1:9/".to_string(),
            HttpMethod::Get,
        );
        task.id = 1;
        task.frequency_minutes = 5;
        task.timeout_seconds = 10;
        Self { task }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.task.target_url = url.to_string();
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.task.http_method = method;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.task.headers = Some(headers);
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.task.body = Some(body.to_string());
        self
    }

    pub fn with_frequency_minutes(mut self, minutes: i32) -> Self {
        self.task.frequency_minutes = minutes;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: i32) -> Self {
        self.task.timeout_seconds = seconds;
        self
    }

    pub fn with_next_execution_at(mut self, next: Option<DateTime<Utc>>) -> Self {
        self.task.next_execution_at = next;
        self
    }

    pub fn with_last_executed_at(mut self, last: DateTime<Utc>) -> Self {
        self.task.last_executed_at = Some(last);
        self
    }

    pub fn with_avg_response_time(mut self, avg: i64) -> Self {
        self.task.avg_response_time = Some(avg);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.task.is_enabled = false;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
