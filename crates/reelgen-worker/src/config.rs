//! Worker configuration.

use std::time::Duration;

use crate::polling::PollPolicy;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Image job status polling
    pub image_poll: PollPolicy,
    /// Bulk wait for a story request to finish
    pub story_wait: PollPolicy,
    /// Bulk wait for scenes to appear on a video
    pub scene_wait: PollPolicy,
    /// Render job status polling
    pub render_poll: PollPolicy,
    /// Debounce before a terminal track status counts as settled
    pub settle_threshold: Duration,
    /// Delay between readiness checks
    pub sync_delay: Duration,
    /// Readiness checks before the video is failed
    pub sync_max_checks: u32,
    /// Re-reads used to confirm a merged scene asset
    pub verify_attempts: u32,
    /// Resumable upload chunk size, a multiple of 256 KiB
    pub upload_chunk_bytes: usize,
    /// Concurrent iterations of one bulk job
    pub bulk_concurrency: usize,
    /// Budget for one bulk iteration
    pub bulk_iteration_timeout: Duration,
    /// Raise a render request as soon as assets are ready
    pub auto_render: bool,
    /// Voice used when a video does not name one
    pub default_voice_id: String,
    /// How often delayed tasks are promoted
    pub promote_interval: Duration,
    /// How often stale deliveries are reclaimed
    pub claim_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Port of the Prometheus listener, 0 disables it
    pub metrics_port: u16,
}

const UPLOAD_CHUNK_QUANTUM: usize = 256 * 1024;

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            image_poll: PollPolicy::new(Duration::from_secs(2), 90),
            story_wait: PollPolicy::new(Duration::from_secs(2), 30),
            scene_wait: PollPolicy::new(Duration::from_secs(2), 30),
            render_poll: PollPolicy::new(Duration::from_secs(5), 360),
            settle_threshold: Duration::from_millis(reelgen_models::DEFAULT_SETTLE_THRESHOLD_MS),
            sync_delay: Duration::from_secs(5),
            sync_max_checks: 120,
            verify_attempts: 3,
            upload_chunk_bytes: 8 * 1024 * 1024,
            bulk_concurrency: 2,
            bulk_iteration_timeout: Duration::from_secs(600),
            auto_render: true,
            default_voice_id: String::new(),
            promote_interval: Duration::from_secs(1),
            claim_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
            metrics_port: 9100,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_poll(prefix: &str, default: PollPolicy) -> PollPolicy {
    PollPolicy::new(
        Duration::from_millis(env_u64(
            &format!("{}_INTERVAL_MS", prefix),
            default.interval.as_millis() as u64,
        )),
        env_u64(&format!("{}_ATTEMPTS", prefix), default.max_attempts as u64) as u32,
    )
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();

        let chunk = env_u64("UPLOAD_CHUNK_BYTES", d.upload_chunk_bytes as u64) as usize;

        Self {
            image_poll: env_poll("IMAGE_POLL", d.image_poll),
            story_wait: env_poll("STORY_WAIT", d.story_wait),
            scene_wait: env_poll("SCENE_WAIT", d.scene_wait),
            render_poll: env_poll("RENDER_POLL", d.render_poll),
            settle_threshold: Duration::from_millis(env_u64(
                "READINESS_THRESHOLD_MS",
                d.settle_threshold.as_millis() as u64,
            )),
            sync_delay: Duration::from_secs(env_u64("SYNC_DELAY_SECS", d.sync_delay.as_secs())),
            sync_max_checks: env_u64("SYNC_MAX_CHECKS", d.sync_max_checks as u64).max(1) as u32,
            verify_attempts: env_u64("VERIFY_ATTEMPTS", d.verify_attempts as u64).max(1) as u32,
            upload_chunk_bytes: (chunk / UPLOAD_CHUNK_QUANTUM).max(1) * UPLOAD_CHUNK_QUANTUM,
            bulk_concurrency: env_u64("BULK_CONCURRENCY", d.bulk_concurrency as u64).max(1) as usize,
            bulk_iteration_timeout: Duration::from_secs(env_u64(
                "BULK_ITERATION_TIMEOUT_SECS",
                d.bulk_iteration_timeout.as_secs(),
            )),
            auto_render: std::env::var("AUTO_RENDER")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(d.auto_render),
            default_voice_id: std::env::var("DEFAULT_VOICE_ID").unwrap_or(d.default_voice_id),
            promote_interval: Duration::from_millis(env_u64(
                "WORKER_PROMOTE_INTERVAL_MS",
                d.promote_interval.as_millis() as u64,
            )),
            claim_interval: Duration::from_secs(env_u64(
                "WORKER_CLAIM_INTERVAL_SECS",
                d.claim_interval.as_secs(),
            )),
            shutdown_timeout: Duration::from_secs(env_u64(
                "WORKER_SHUTDOWN_TIMEOUT",
                d.shutdown_timeout.as_secs(),
            )),
            metrics_port: env_u64("WORKER_METRICS_PORT", d.metrics_port as u64) as u16,
        }
    }

    pub fn settle_threshold_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.settle_threshold).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
