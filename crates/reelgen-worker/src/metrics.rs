//! Worker metrics.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

pub mod names {
    pub const TASKS_TOTAL: &str = "reelgen_worker_tasks_total";
    pub const TASK_DURATION_SECONDS: &str = "reelgen_worker_task_duration_seconds";
    pub const QUEUE_DEPTH: &str = "reelgen_worker_queue_depth";
    pub const DLQ_DEPTH: &str = "reelgen_worker_dlq_depth";
    pub const TRACK_OUTCOMES_TOTAL: &str = "reelgen_worker_track_outcomes_total";
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Dropped,
    Retried,
    DeadLettered,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Dropped => "dropped",
            TaskOutcome::Retried => "retried",
            TaskOutcome::DeadLettered => "dead_lettered",
        }
    }
}

pub fn record_task(kind: &'static str, outcome: TaskOutcome, elapsed: Duration) {
    counter!(names::TASKS_TOTAL, "kind" => kind, "outcome" => outcome.as_str()).increment(1);
    histogram!(names::TASK_DURATION_SECONDS, "kind" => kind).record(elapsed.as_secs_f64());
}

pub fn set_queue_depth(kind: &'static str, depth: u64) {
    gauge!(names::QUEUE_DEPTH, "kind" => kind).set(depth as f64);
}

pub fn set_dlq_depth(depth: u64) {
    gauge!(names::DLQ_DEPTH).set(depth as f64);
}

/// Terminal outcome of one scene asset track.
pub fn record_track_outcome(track: &'static str, status: &'static str) {
    counter!(names::TRACK_OUTCOMES_TOTAL, "track" => track, "status" => status).increment(1);
}
