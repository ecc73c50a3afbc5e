//! Render trigger: hands a video with ready assets to the renderer.

use std::sync::Arc;

use tracing::{info, warn};

use reelgen_clients::RenderState;
use reelgen_models::{MarkerKind, RenderStatus, Video, VideoId, VideoStatus};
use reelgen_queue::MarkerTask;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::polling::{poll_until, Poll, PollPolicy};
use crate::services::Renderer;
use crate::store::{MarkerStore, PipelineStore, RenderStore, Transition, VideoReader};

const STATUS_CAS_ATTEMPTS: u32 = 3;

/// Handler for `render_video`, consuming the `render-queue-entry` marker.
pub struct RenderJobHandler {
    videos: Arc<dyn VideoReader>,
    pipeline: Arc<dyn PipelineStore>,
    render: Arc<dyn RenderStore>,
    markers: Arc<dyn MarkerStore>,
    renderer: Arc<dyn Renderer>,
    poll: PollPolicy,
}

impl RenderJobHandler {
    pub fn new<S>(store: Arc<S>, renderer: Arc<dyn Renderer>, config: &WorkerConfig) -> Self
    where
        S: VideoReader + PipelineStore + RenderStore + MarkerStore + 'static,
    {
        Self {
            videos: store.clone(),
            pipeline: store.clone(),
            render: store.clone(),
            markers: store,
            renderer,
            poll: config.render_poll,
        }
    }

    pub async fn handle(&self, task: &MarkerTask) -> WorkerResult<()> {
        let video_id = &task.video_id;
        if !self.markers.marker_exists(MarkerKind::RenderQueueEntry, video_id).await? {
            info!(video_id = %video_id, "No render-queue-entry marker, render already handled");
            return Ok(());
        }

        let result = self.run(video_id).await;
        self.markers.delete_marker(MarkerKind::RenderQueueEntry, video_id).await?;
        result
    }

    async fn run(&self, video_id: &VideoId) -> WorkerResult<()> {
        let Some(video) = self.begin(video_id).await? else {
            return Ok(());
        };

        match self.render(&video).await {
            Ok(url) => {
                let status = RenderStatus {
                    progress: 1.0,
                    render_id: None,
                    video_url: Some(url.clone()),
                    error: None,
                };
                self.render
                    .finish_render(video_id, VideoStatus::RenderComplete, &status)
                    .await?;
                info!(video_id = %video_id, url = %url, "Render complete");
            }
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "Render failed");
                let status = RenderStatus {
                    progress: 0.0,
                    render_id: None,
                    video_url: None,
                    error: Some(e.to_string()),
                };
                self.render
                    .finish_render(video_id, VideoStatus::RenderError, &status)
                    .await?;
            }
        }
        Ok(())
    }

    /// Move the video to `processing:render`, or say why it cannot be.
    ///
    /// A video already in `processing:render` belongs to an earlier delivery
    /// of this request that never finished; it is picked up where it stopped.
    async fn begin(&self, video_id: &VideoId) -> WorkerResult<Option<Video>> {
        for _ in 0..STATUS_CAS_ATTEMPTS {
            let Some(current) = self.videos.get_video(video_id).await? else {
                warn!(video_id = %video_id, "Video not found, dropping render request");
                return Ok(None);
            };
            match current.value.status {
                VideoStatus::AssetsReady => {}
                VideoStatus::ProcessingRender => {
                    info!(video_id = %video_id, "Resuming interrupted render");
                    return Ok(Some(current.value));
                }
                status => {
                    warn!(video_id = %video_id, status = %status, "Assets not ready for render, dropping request");
                    return Ok(None);
                }
            }
            if !current.value.has_scenes() {
                self.pipeline
                    .fail_video(video_id, "render requested for a video without scenes")
                    .await?;
                return Ok(None);
            }

            if self.render.begin_render(video_id, &current.version).await? == Transition::Applied {
                let mut video = current.value;
                video.render_status = RenderStatus::default();
                return Ok(Some(video));
            }
        }

        warn!(video_id = %video_id, "Video kept changing, dropping render request");
        Ok(None)
    }

    async fn render(&self, video: &Video) -> WorkerResult<String> {
        let render_id = match video.render_status.render_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                let id = self.renderer.submit(video).await?;
                self.render.set_render_id(&video.id, &id).await?;
                info!(video_id = %video.id, render_id = %id, "Render submitted");
                id
            }
        };

        let renderer = &self.renderer;
        let render = &self.render;
        let video_id = &video.id;
        let id_ref = render_id.as_str();

        poll_until(self.poll, move |_| async move {
            let job = renderer.status(id_ref).await?;
            match job.status {
                RenderState::Done => job
                    .url
                    .filter(|url| !url.is_empty())
                    .map(Poll::Ready)
                    .ok_or_else(|| WorkerError::generation_failed(format!("render {} finished without a url", job.id))),
                RenderState::Failed => Err(WorkerError::generation_failed(format!(
                    "render {}: {}",
                    job.id,
                    job.error.as_deref().unwrap_or("failed")
                ))),
                RenderState::Queued | RenderState::Rendering => {
                    render
                        .set_render_progress(video_id, job.progress.clamp(0.0, 1.0))
                        .await?;
                    Ok(Poll::Pending)
                }
            }
        })
        .await?
        .ok_or_else(|| {
            WorkerError::timeout(format!(
                "render {} unfinished after {} polls",
                render_id, self.poll.max_attempts
            ))
        })
    }
}
