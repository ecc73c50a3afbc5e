//! Readiness backstop: re-checks a video until its assets are ready.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use reelgen_models::VideoStatus;
use reelgen_queue::{QueueTask, SyncTask, TaskQueue};

use crate::aggregate::{Aggregators, Readiness};
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::signals::Signals;
use crate::store::{PipelineStore, VideoReader};

/// Handler for `sync_assets`.
pub struct SyncMonitor {
    aggregators: Aggregators,
    pipeline: Arc<dyn PipelineStore>,
    queue: Arc<dyn TaskQueue>,
    signals: Signals,
    delay: Duration,
    max_checks: u32,
    auto_render: bool,
}

impl SyncMonitor {
    pub fn new<S>(store: Arc<S>, queue: Arc<dyn TaskQueue>, signals: Signals, config: &WorkerConfig) -> Self
    where
        S: VideoReader + PipelineStore + 'static,
    {
        Self {
            aggregators: Aggregators::new(store.clone(), config.settle_threshold_chrono()),
            pipeline: store,
            queue,
            signals,
            delay: config.sync_delay,
            max_checks: config.sync_max_checks,
            auto_render: config.auto_render,
        }
    }

    pub async fn handle(&self, task: &SyncTask) -> WorkerResult<()> {
        let video_id = &task.video_id;
        let readiness = self.aggregators.check_readiness(video_id).await?;

        match readiness {
            Readiness::Transitioned | Readiness::AlreadyReady(_) => {
                info!(video_id = %video_id, checks = task.attempt + 1, "Assets ready, monitor done");
                let awaiting_render = matches!(
                    readiness,
                    Readiness::Transitioned | Readiness::AlreadyReady(VideoStatus::AssetsReady)
                );
                if self.auto_render && awaiting_render {
                    self.signals.render_request(video_id).await?;
                }
                Ok(())
            }
            Readiness::Halted | Readiness::Missing => {
                debug!(video_id = %video_id, outcome = ?readiness, "Monitor stopped");
                Ok(())
            }
            Readiness::NotReady(_) | Readiness::Contended => {
                let checks = task.attempt + 1;
                if checks >= self.max_checks {
                    let message = format!("asset readiness not reached after {} checks", checks);
                    warn!(video_id = %video_id, "{}", message);
                    return self.pipeline.fail_video(video_id, &message).await;
                }

                debug!(video_id = %video_id, checks, outcome = ?readiness, "Assets not ready, checking again");
                let next = QueueTask::SyncAssets(SyncTask {
                    video_id: video_id.clone(),
                    attempt: checks,
                });
                self.queue.enqueue_after(next, self.delay).await?;
                Ok(())
            }
        }
    }
}
