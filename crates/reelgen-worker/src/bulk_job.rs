//! Bulk orchestrator: drives `count` videos from one template up to the
//! point where the pipeline coordinator takes over.
//!
//! Iterations run through a bounded pool with a per-iteration timeout. Each
//! iteration creates a draft video and a story request, waits for the story,
//! raises the story-request signal, waits for scenes and finally raises the
//! new-video signal. Only the loop consuming the pool's results writes the
//! bulk job record.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use reelgen_models::{
    BulkJob, BulkJobId, BulkJobStatus, BulkOutcome, StoryRequest, StoryRequestId, StoryStatus, Template, Video, VideoId,
    VideoStatus,
};
use reelgen_queue::{BulkTask, QueueTask, StoryTask, TaskQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::polling::{poll_until, Poll, PollPolicy};
use crate::signals::Signals;
use crate::store::{BulkStore, CatalogReader, PipelineStore, StoryStore, VideoReader};

/// Handler for `run_bulk_job`.
pub struct BulkOrchestrator {
    bulk: Arc<dyn BulkStore>,
    catalog: Arc<dyn CatalogReader>,
    stories: Arc<dyn StoryStore>,
    videos: Arc<dyn VideoReader>,
    pipeline: Arc<dyn PipelineStore>,
    queue: Arc<dyn TaskQueue>,
    signals: Signals,
    story_wait: PollPolicy,
    scene_wait: PollPolicy,
    concurrency: usize,
    iteration_timeout: Duration,
}

/// Everything an iteration needs, resolved once per job.
struct Plan {
    job_id: BulkJobId,
    user_id: String,
    count: u32,
    template: Template,
    content_type_id: String,
    prompt: String,
}

enum Iteration {
    Created(VideoId),
    Failed(String),
    /// Not started because the job was cancelled.
    Skipped,
}

impl BulkOrchestrator {
    pub fn new<S>(store: Arc<S>, queue: Arc<dyn TaskQueue>, signals: Signals, config: &WorkerConfig) -> Self
    where
        S: BulkStore + CatalogReader + StoryStore + VideoReader + PipelineStore + 'static,
    {
        Self {
            bulk: store.clone(),
            catalog: store.clone(),
            stories: store.clone(),
            videos: store.clone(),
            pipeline: store,
            queue,
            signals,
            story_wait: config.story_wait,
            scene_wait: config.scene_wait,
            concurrency: config.bulk_concurrency.max(1),
            iteration_timeout: config.bulk_iteration_timeout,
        }
    }

    pub async fn handle(&self, task: &BulkTask) -> WorkerResult<()> {
        let job = self
            .bulk
            .get_bulk_job(&task.bulk_job_id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("bulk job {}", task.bulk_job_id)))?;
        if job.is_terminal() {
            info!(bulk_job_id = %job.id, status = %job.status, "Bulk job already finished");
            return Ok(());
        }

        let plan = match self.plan(&job).await? {
            Ok(plan) => plan,
            Err(reason) => {
                warn!(bulk_job_id = %job.id, reason = %reason, "Bulk job rejected");
                self.bulk
                    .set_bulk_status(&job.id, BulkJobStatus::Failed, Some(&reason))
                    .await?;
                return Ok(());
            }
        };

        let status = self
            .bulk
            .set_bulk_status(&job.id, BulkJobStatus::Processing, None)
            .await?;
        if status == BulkJobStatus::Cancelled {
            info!(bulk_job_id = %job.id, "Bulk job cancelled before it started");
            return Ok(());
        }
        info!(bulk_job_id = %job.id, count = job.count, concurrency = self.concurrency, "Bulk job started");

        let mut outcome = BulkOutcome::default();
        let mut iterations = stream::iter(1..=plan.count)
            .map(|n| self.iteration(&plan, n))
            .buffer_unordered(self.concurrency);

        while let Some(result) = iterations.next().await {
            match result {
                Iteration::Created(video_id) => outcome.record_success(video_id, plan.count),
                Iteration::Failed(entry) => outcome.record_failure(entry, plan.count),
                Iteration::Skipped => continue,
            }
            if let Err(e) = self.bulk.record_bulk_outcome(&plan.job_id, &outcome).await {
                warn!(bulk_job_id = %plan.job_id, error = %e, "Failed to record bulk progress");
            }
        }

        // Any failed progress write above is made good here.
        if let Err(e) = self.bulk.record_bulk_outcome(&plan.job_id, &outcome).await {
            warn!(bulk_job_id = %plan.job_id, error = %e, "Failed to record final bulk progress");
        }

        let status = outcome.final_status();
        let error = (status == BulkJobStatus::Failed).then(|| format!("all {} videos failed", plan.count));
        let status = self
            .bulk
            .set_bulk_status(&plan.job_id, status, error.as_deref())
            .await?;
        if status == BulkJobStatus::Cancelled {
            info!(
                bulk_job_id = %plan.job_id,
                created = outcome.completed_videos.len(),
                "Bulk job cancelled"
            );
            return Ok(());
        }
        info!(
            bulk_job_id = %plan.job_id,
            status = %status,
            created = outcome.completed_videos.len(),
            failed = outcome.failed_videos.len(),
            "Bulk job finished"
        );
        Ok(())
    }

    /// Resolve template, content type and topic. The inner error is a
    /// reason to fail the job without creating anything.
    async fn plan(&self, job: &BulkJob) -> WorkerResult<Result<Plan, String>> {
        let Some(template) = self.catalog.template(&job.template_id).await? else {
            return Ok(Err(format!("template {} not found", job.template_id)));
        };
        let Some(content_type) = self.catalog.content_type(&template.content_type_id).await? else {
            return Ok(Err(format!("content type {} not found", template.content_type_id)));
        };

        let topic = job.topic_prompt.trim();
        let prompt = if !topic.is_empty() {
            topic.to_string()
        } else if let Some(default) = content_type.default_prompt() {
            default.to_string()
        } else {
            return Ok(Err(format!(
                "topicPrompt is required for content type {}",
                content_type.id
            )));
        };

        Ok(Ok(Plan {
            job_id: job.id.clone(),
            user_id: job.user_id.clone(),
            count: job.count,
            content_type_id: content_type.id,
            template,
            prompt,
        }))
    }

    async fn is_cancelled(&self, job_id: &BulkJobId) -> bool {
        matches!(
            self.bulk.get_bulk_job(job_id).await,
            Ok(Some(job)) if job.status == BulkJobStatus::Cancelled
        )
    }

    /// Iteration `n` (1-based). Never fails: failures become entries.
    async fn iteration(&self, plan: &Plan, n: u32) -> Iteration {
        if self.is_cancelled(&plan.job_id).await {
            return Iteration::Skipped;
        }
        let entry = |reason: String| format!("video {} of {}: {}", n, plan.count, reason);

        let (video_id, request_id) = match self.create_video(plan, n).await {
            Ok(ids) => ids,
            Err(e) => return Iteration::Failed(entry(e.to_string())),
        };

        let driven = tokio::time::timeout(self.iteration_timeout, self.drive(&video_id, &request_id))
            .await
            .unwrap_or_else(|_| {
                Err(WorkerError::timeout(format!(
                    "iteration exceeded {}s",
                    self.iteration_timeout.as_secs()
                )))
            });

        match driven {
            Ok(()) => {
                info!(bulk_job_id = %plan.job_id, video_id = %video_id, n, "Bulk video handed to pipeline");
                Iteration::Created(video_id)
            }
            Err(e) => {
                warn!(bulk_job_id = %plan.job_id, video_id = %video_id, n, error = %e, "Bulk video failed");
                if let Err(write) = self.pipeline.fail_video(&video_id, &e.to_string()).await {
                    warn!(video_id = %video_id, error = %write, "Could not record failure on video");
                }
                Iteration::Failed(entry(e.to_string()))
            }
        }
    }

    async fn create_video(&self, plan: &Plan, n: u32) -> WorkerResult<(VideoId, StoryRequestId)> {
        let prompt = if plan.count > 1 {
            format!("{} (video {} of {}, cover a different angle)", plan.prompt, n, plan.count)
        } else {
            plan.prompt.clone()
        };

        let video = Video::draft(&plan.user_id, &prompt)
            .with_template(&plan.template.id, &plan.content_type_id)
            .with_voice(&plan.template.voice_id)
            .with_style(plan.template.style.clone())
            .with_bulk_job(plan.job_id.clone());
        let request = StoryRequest::new(video.id.clone(), prompt).with_content_type(&plan.content_type_id);
        let video = video.with_story_request(request.id.clone());

        self.bulk.create_video(&video).await?;
        self.stories.create_story_request(&request).await?;
        Ok((video.id, request.id))
    }

    async fn drive(&self, video_id: &VideoId, request_id: &StoryRequestId) -> WorkerResult<()> {
        self.queue
            .enqueue(QueueTask::GenerateStory(StoryTask {
                request_id: request_id.clone(),
            }))
            .await?;
        self.wait_for_story(request_id).await?;

        self.signals.story_request(video_id).await?;
        self.wait_for_scenes(video_id).await?;

        self.signals.pending_video(video_id).await?;
        Ok(())
    }

    async fn wait_for_story(&self, request_id: &StoryRequestId) -> WorkerResult<()> {
        let stories = &self.stories;
        let policy = self.story_wait;
        poll_until(policy, move |_| async move {
            let request = stories
                .get_story_request(request_id)
                .await?
                .ok_or_else(|| WorkerError::not_found(format!("story request {}", request_id)))?;
            match request.status {
                StoryStatus::Completed => Ok(Poll::Ready(())),
                StoryStatus::Error | StoryStatus::Failed => Err(WorkerError::generation_failed(format!(
                    "story {:?}: {}",
                    request.status,
                    request.error.as_deref().unwrap_or("no detail")
                ))),
                StoryStatus::Pending | StoryStatus::Processing => Ok(Poll::Pending),
            }
        })
        .await?
        .ok_or_else(|| WorkerError::timeout(format!("story not ready after {} polls", policy.max_attempts)))
    }

    async fn wait_for_scenes(&self, video_id: &VideoId) -> WorkerResult<()> {
        let videos = &self.videos;
        let policy = self.scene_wait;
        poll_until(policy, move |_| async move {
            let video = videos
                .get_video(video_id)
                .await?
                .ok_or_else(|| WorkerError::not_found(format!("video {}", video_id)))?
                .value;
            if video.status == VideoStatus::Error {
                return Err(WorkerError::generation_failed(
                    video.error.unwrap_or_else(|| "video failed while building scenes".into()),
                ));
            }
            Ok(if video.has_scenes() { Poll::Ready(()) } else { Poll::Pending })
        })
        .await?
        .ok_or_else(|| WorkerError::timeout(format!("scenes not ready after {} polls", policy.max_attempts)))
    }
}
