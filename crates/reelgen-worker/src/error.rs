//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Payload failed validation; the task is dropped.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// An external job reported failure.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// An external job did not finish within its polling budget.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A write could not be confirmed by reading it back.
    #[error("Write not persisted: {0}")]
    NotPersisted(String),

    #[error("Task exceeded its {0}s budget")]
    TaskTimeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Client error: {0}")]
    Client(#[from] reelgen_clients::ClientError),

    #[error("Storage error: {0}")]
    Storage(#[from] reelgen_storage::StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] reelgen_firestore::FirestoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] reelgen_queue::QueueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn invalid_task(msg: impl Into<String>) -> Self {
        Self::InvalidTask(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn generation_failed(msg: impl Into<String>) -> Self {
        Self::GenerationFailed(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn not_persisted(msg: impl Into<String>) -> Self {
        Self::NotPersisted(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn is_invalid_task(&self) -> bool {
        matches!(self, WorkerError::InvalidTask(_))
    }

    /// Failure of an external generative service or the publishing platform,
    /// as opposed to our own infrastructure.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            WorkerError::Client(_) | WorkerError::GenerationFailed(_) | WorkerError::Timeout(_)
        )
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Client(e) => e.is_retryable(),
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::Firestore(e) => e.is_retryable() || e.is_precondition_failed(),
            WorkerError::Queue(e) => !e.is_duplicate(),
            WorkerError::GenerationFailed(_)
            | WorkerError::Timeout(_)
            | WorkerError::NotPersisted(_)
            | WorkerError::TaskTimeout(_) => true,
            WorkerError::InvalidTask(_)
            | WorkerError::NotFound(_)
            | WorkerError::Precondition(_)
            | WorkerError::ConfigError(_)
            | WorkerError::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelgen_clients::ClientError;

    #[test]
    fn test_external_failures_are_classified() {
        assert!(WorkerError::generation_failed("nsfw").is_external());
        assert!(WorkerError::from(ClientError::from_status("image", 500, "")).is_external());
        assert!(!WorkerError::not_persisted("imageUrl").is_external());
    }

    #[test]
    fn test_validation_is_not_retryable() {
        let err = WorkerError::invalid_task("missing videoId");
        assert!(err.is_invalid_task());
        assert!(!err.is_retryable());
        assert!(!WorkerError::not_found("video v1").is_retryable());
        assert!(WorkerError::TaskTimeout(30).is_retryable());
    }
}
