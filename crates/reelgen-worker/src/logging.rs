//! Structured task logging.

use std::time::Instant;

use tracing::{error, info, warn, Span};

use reelgen_queue::TaskEnvelope;

/// Logs a task's lifecycle with its id, kind and elapsed time.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    kind: &'static str,
    video_id: Option<String>,
    attempt: u32,
    started: Instant,
}

impl TaskLogger {
    pub fn new(envelope: &TaskEnvelope) -> Self {
        Self {
            task_id: envelope.id.to_string(),
            kind: envelope.kind().as_str(),
            video_id: envelope.task.video_id(),
            attempt: envelope.attempt,
            started: Instant::now(),
        }
    }

    /// Logger for work that does not arrive through the queue.
    pub fn detached(task_id: &str, kind: &'static str) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind,
            video_id: None,
            attempt: 1,
            started: Instant::now(),
        }
    }

    pub fn log_start(&self) {
        info!(
            task_id = %self.task_id,
            task_kind = self.kind,
            attempt = self.attempt,
            "Task started"
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(task_id = %self.task_id, task_kind = self.kind, "Task progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(task_id = %self.task_id, task_kind = self.kind, "Task warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            task_kind = self.kind,
            attempt = self.attempt,
            elapsed_ms = self.elapsed_ms(),
            "Task error: {}",
            message
        );
    }

    pub fn log_completion(&self, outcome: &str) {
        info!(
            task_id = %self.task_id,
            task_kind = self.kind,
            elapsed_ms = self.elapsed_ms(),
            "Task completed: {}",
            outcome
        );
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Span that carries the task's identity through every nested log line.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            task_kind = self.kind,
            video_id = self.video_id.as_deref().unwrap_or(""),
            attempt = self.attempt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelgen_models::VideoId;
    use reelgen_queue::{MarkerTask, QueueTask};

    #[test]
    fn test_logger_reads_envelope() {
        let envelope = TaskEnvelope::new(QueueTask::RenderVideo(MarkerTask {
            video_id: VideoId::from("v1"),
        }));
        let logger = TaskLogger::new(&envelope);

        assert_eq!(logger.task_id(), envelope.id.as_str());
        assert_eq!(logger.kind(), "render_video");
        assert_eq!(logger.video_id.as_deref(), Some("v1"));
    }

    #[test]
    fn test_detached_logger() {
        let logger = TaskLogger::detached("bulk-1:3", "bulk_iteration");
        assert_eq!(logger.task_id(), "bulk-1:3");
        assert_eq!(logger.kind(), "bulk_iteration");
    }
}
