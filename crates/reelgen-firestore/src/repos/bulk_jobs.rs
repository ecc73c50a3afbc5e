//! Bulk job records.

use tracing::info;

use reelgen_models::{BulkJob, BulkJobId, BulkJobStatus, BulkOutcome, Versioned};

use super::collections::BULK_JOBS;
use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::fields::{FieldPath, FieldUpdates};
use crate::types::encode_fields;

const STATUS_CAS_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct BulkJobRepository {
    client: FirestoreClient,
}

impl BulkJobRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &BulkJobId) -> FirestoreResult<Option<Versioned<BulkJob>>> {
        match self.client.get_document(BULK_JOBS, id.as_str()).await? {
            Some(doc) => Ok(Some(Versioned::new(doc.decode()?, doc.version()?))),
            None => Ok(None),
        }
    }

    pub async fn create(&self, job: &BulkJob) -> FirestoreResult<()> {
        self.client
            .create_document(BULK_JOBS, job.id.as_str(), encode_fields(job)?)
            .await?;
        info!(bulk_job_id = %job.id, count = job.count, "Created bulk job");
        Ok(())
    }

    /// Set the status unless the job was cancelled meanwhile. Returns the
    /// status the job holds afterwards.
    pub async fn set_status(
        &self,
        id: &BulkJobId,
        status: BulkJobStatus,
        error: Option<&str>,
    ) -> FirestoreResult<BulkJobStatus> {
        self.transition(id, status, error, |current| current == BulkJobStatus::Cancelled)
            .await
    }

    /// Write progress and result lists. The status field is left alone so an
    /// external cancellation is never overwritten.
    pub async fn record_outcome(&self, id: &BulkJobId, outcome: &BulkOutcome) -> FirestoreResult<()> {
        let completed: Vec<String> = outcome
            .completed_videos
            .iter()
            .map(|v| v.to_string())
            .collect();
        let updates = FieldUpdates::new()
            .set(FieldPath::new("progress"), outcome.progress)
            .set(FieldPath::new("completedVideos"), completed)
            .set(FieldPath::new("failedVideos"), outcome.failed_videos.clone())
            .touch();
        self.client.update_document(BULK_JOBS, id.as_str(), updates).await?;
        Ok(())
    }

    /// Move a non-terminal job to `cancelled`. Returns the resulting status.
    pub async fn cancel(&self, id: &BulkJobId) -> FirestoreResult<BulkJobStatus> {
        let status = self
            .transition(id, BulkJobStatus::Cancelled, None, |current| current.is_terminal())
            .await?;
        if status == BulkJobStatus::Cancelled {
            info!(bulk_job_id = %id, "Bulk job cancelled");
        }
        Ok(status)
    }

    /// Compare-and-swap the status to `next` unless `blocked` holds for the
    /// current one, in which case the current status is returned untouched.
    async fn transition(
        &self,
        id: &BulkJobId,
        next: BulkJobStatus,
        error: Option<&str>,
        blocked: impl Fn(BulkJobStatus) -> bool,
    ) -> FirestoreResult<BulkJobStatus> {
        for _ in 0..STATUS_CAS_ATTEMPTS {
            let Some(current) = self.get(id).await? else {
                return Err(FirestoreError::not_found(format!("{}/{}", BULK_JOBS, id)));
            };
            if blocked(current.value.status) {
                return Ok(current.value.status);
            }

            let mut updates = FieldUpdates::new().set(FieldPath::new("status"), next.as_str());
            if let Some(error) = error {
                updates = updates.set(FieldPath::new("error"), error);
            }
            match self
                .client
                .update_document_if_unchanged(BULK_JOBS, id.as_str(), updates.touch(), &current.version)
                .await
            {
                Ok(_) => return Ok(next),
                Err(e) if e.is_precondition_failed() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(FirestoreError::PreconditionFailed(format!(
            "bulk job {} kept changing while moving to {}",
            id, next
        )))
    }
}
