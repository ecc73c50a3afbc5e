//! Publishes a rendered video to a channel with a resumable upload.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, info};

use reelgen_clients::{ChunkOutcome, UploadMetadata};
use reelgen_models::{ChannelCredentials, UploadStatus, VideoId};
use reelgen_queue::PublishTask;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::services::Publisher;
use crate::store::{ChannelStore, UploadStore, VideoReader};

const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Handler for `publish_video`.
pub struct PublishJobHandler {
    videos: Arc<dyn VideoReader>,
    uploads: Arc<dyn UploadStore>,
    channels: Arc<dyn ChannelStore>,
    publisher: Arc<dyn Publisher>,
    chunk_bytes: usize,
}

impl PublishJobHandler {
    pub fn new<S>(store: Arc<S>, publisher: Arc<dyn Publisher>, config: &WorkerConfig) -> Self
    where
        S: VideoReader + UploadStore + ChannelStore + 'static,
    {
        Self {
            videos: store.clone(),
            uploads: store.clone(),
            channels: store,
            publisher,
            chunk_bytes: config.upload_chunk_bytes.max(1),
        }
    }

    pub async fn handle(&self, task: &PublishTask) -> WorkerResult<()> {
        let video_id = &task.video_id;
        let video = self
            .videos
            .get_video(video_id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("video {}", video_id)))?
            .value;
        let source_url = video
            .rendered_url()
            .ok_or_else(|| WorkerError::precondition(format!("video {} has no rendered output", video_id)))?
            .to_string();
        let publish_at = resolve_publish_at(task.publish_at.as_deref(), task.timezone.as_deref(), Utc::now())?;

        let channel = self
            .channels
            .get_channel(&task.channel_id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("channel {}", task.channel_id)))?;

        let token = self.publisher.refresh(&channel.credentials.refresh_token).await?;
        self.channels
            .save_credentials(
                &channel.id,
                &ChannelCredentials {
                    refresh_token: token
                        .refresh_token
                        .clone()
                        .unwrap_or_else(|| channel.credentials.refresh_token.clone()),
                    access_token: Some(token.access_token.clone()),
                    expires_at: Some(token.expires_at),
                },
            )
            .await?;

        let platform = self.publisher.platform();
        self.uploads
            .set_upload_status(video_id, platform, &UploadStatus::default())
            .await?;

        let bytes = self.publisher.download(&source_url).await?;
        let title = if video.title.trim().is_empty() { video.prompt.clone() } else { video.title.clone() };
        let metadata = UploadMetadata {
            title,
            description: video.description.clone(),
            privacy: task.privacy,
            publish_at,
        };

        let platform_id = self.upload(video_id, &token.access_token, &metadata, &bytes).await?;
        let watch_url = self.publisher.watch_url(&platform_id);
        self.uploads
            .set_upload_status(
                video_id,
                platform,
                &UploadStatus {
                    progress: 1.0,
                    video_id: Some(platform_id.clone()),
                    video_url: Some(watch_url.clone()),
                },
            )
            .await?;

        info!(
            video_id = %video_id,
            platform,
            platform_video_id = %platform_id,
            url = %watch_url,
            scheduled = publish_at.is_some(),
            "Video published"
        );
        Ok(())
    }

    /// Send `bytes` in chunks, resuming from whatever offset the platform
    /// reports; returns the platform's video id.
    async fn upload(
        &self,
        video_id: &VideoId,
        access_token: &str,
        metadata: &UploadMetadata,
        bytes: &[u8],
    ) -> WorkerResult<String> {
        let platform = self.publisher.platform();
        let total = bytes.len() as u64;
        let session = self.publisher.start_upload(access_token, metadata, total).await?;

        let mut offset = 0u64;
        loop {
            let start = offset.min(total) as usize;
            let end = (start + self.chunk_bytes).min(bytes.len());
            let chunk = bytes[start..end].to_vec();

            match self
                .publisher
                .upload_chunk(&session, access_token, chunk, offset, total)
                .await?
            {
                ChunkOutcome::Complete { video_id: platform_id } => return Ok(platform_id),
                ChunkOutcome::Incomplete { next_offset } => {
                    if next_offset <= offset || next_offset > total {
                        return Err(WorkerError::generation_failed(format!(
                            "upload stalled at byte {} of {}",
                            offset, total
                        )));
                    }
                    offset = next_offset;
                    let progress = offset as f64 / total as f64;
                    debug!(video_id = %video_id, offset, total, "Upload chunk accepted");
                    self.uploads.set_upload_progress(video_id, platform, progress).await?;
                }
            }
        }
    }
}

/// The instant a scheduled upload goes public, or `None` to publish now.
///
/// Accepts RFC 3339, or a local `YYYY-MM-DDTHH:MM[:SS]` read in `timezone`
/// (a fixed offset such as `+05:30`, or `Z`/`UTC`). Times not after `now`
/// publish immediately.
pub fn resolve_publish_at(
    publish_at: Option<&str>,
    timezone: Option<&str>,
    now: DateTime<Utc>,
) -> WorkerResult<Option<DateTime<Utc>>> {
    let Some(raw) = publish_at.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let at = match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => at.with_timezone(&Utc),
        Err(_) => {
            let local = LOCAL_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .ok_or_else(|| WorkerError::invalid_task(format!("unrecognised publishAt {:?}", raw)))?;
            parse_offset(timezone)?
                .from_local_datetime(&local)
                .single()
                .ok_or_else(|| WorkerError::invalid_task(format!("ambiguous publishAt {:?}", raw)))?
                .with_timezone(&Utc)
        }
    };

    Ok((at > now).then_some(at))
}

fn parse_offset(timezone: Option<&str>) -> WorkerResult<FixedOffset> {
    let tz = timezone.map(str::trim).unwrap_or("");
    if tz.is_empty() || tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(|| WorkerError::invalid_task("utc offset"));
    }

    let invalid = || WorkerError::invalid_task(format!("unsupported timezone {:?}", tz));
    let (sign, rest) = match tz.as_bytes().first() {
        Some(b'+') => (1, &tz[1..]),
        Some(b'-') => (-1, &tz[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, video_with_scenes, Fakes, MemoryStore};
    use reelgen_models::{Channel, ChannelId, Privacy, RenderStatus, VideoStatus};

    fn seed(store: &MemoryStore, refresh_token: &str) -> (VideoId, ChannelId) {
        let mut video = video_with_scenes(1);
        video.title = "Space facts".into();
        video.status = VideoStatus::RenderComplete;
        video.render_status = RenderStatus {
            progress: 1.0,
            render_id: Some("render-1".into()),
            video_url: Some("https://cdn.test/final.mp4".into()),
            error: None,
        };
        let id = video.id.clone();
        store.insert_video(video);

        let channel_id = ChannelId::from("ch-1");
        store.insert_channel(Channel {
            id: channel_id.clone(),
            user_id: "user-1".into(),
            platform: "youtube".into(),
            name: "Facts".into(),
            credentials: ChannelCredentials {
                refresh_token: refresh_token.into(),
                access_token: None,
                expires_at: None,
            },
        });
        (id, channel_id)
    }

    fn task(video_id: &VideoId, channel_id: &ChannelId) -> PublishTask {
        PublishTask {
            video_id: video_id.clone(),
            channel_id: channel_id.clone(),
            publish_at: None,
            privacy: Privacy::Public,
            timezone: None,
        }
    }

    fn handler(store: &Arc<MemoryStore>, fakes: &Fakes) -> PublishJobHandler {
        PublishJobHandler::new(store.clone(), fakes.publisher.clone(), &test_config())
    }

    #[tokio::test]
    async fn test_upload_in_chunks_and_record_result() {
        let store = MemoryStore::new();
        let fakes = Fakes::default();
        let (id, channel_id) = seed(&store, "refresh-1");

        handler(&store, &fakes).handle(&task(&id, &channel_id)).await.unwrap();

        assert_eq!(fakes.publisher.chunks(), vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(store.upload_progress(), vec![0.4, 0.8]);

        let upload = &store.video(&id).upload_status["youtube"];
        assert_eq!(upload.progress, 1.0);
        assert_eq!(upload.video_id.as_deref(), Some("yt-1"));
        assert_eq!(upload.video_url.as_deref(), Some("https://youtu.test/yt-1"));

        let credentials = store.channel(&channel_id).credentials;
        assert_eq!(credentials.access_token.as_deref(), Some("fresh-token"));
        assert_eq!(credentials.refresh_token, "refresh-1");
        assert_eq!(fakes.publisher.metadata()[0].title, "Space facts");
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_saved() {
        let store = MemoryStore::new();
        let fakes = Fakes::default();
        fakes.publisher.rotate_refresh_token("refresh-2");
        let (id, channel_id) = seed(&store, "refresh-1");

        handler(&store, &fakes).handle(&task(&id, &channel_id)).await.unwrap();

        let credentials = store.channel(&channel_id).credentials;
        assert_eq!(credentials.refresh_token, "refresh-2");
        assert_eq!(credentials.access_token.as_deref(), Some("fresh-token"));
    }

    #[tokio::test]
    async fn test_partial_chunks_resume_from_reported_offset() {
        let store = MemoryStore::new();
        let fakes = Fakes::default();
        fakes.publisher.accept_at_most(3);
        let (id, channel_id) = seed(&store, "refresh-1");

        handler(&store, &fakes).handle(&task(&id, &channel_id)).await.unwrap();

        assert_eq!(fakes.publisher.chunks(), vec![(0, 4), (3, 4), (6, 4), (9, 1)]);
    }

    #[tokio::test]
    async fn test_unrendered_video_is_a_precondition_failure() {
        let store = MemoryStore::new();
        let fakes = Fakes::default();
        let (id, channel_id) = seed(&store, "refresh-1");
        store.update_video(&id, |v| v.render_status = RenderStatus::default());

        let err = handler(&store, &fakes)
            .handle(&task(&id, &channel_id))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Precondition(_)));
        assert!(fakes.publisher.chunks().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_is_raised_for_retry() {
        let store = MemoryStore::new();
        let fakes = Fakes::default();
        let (id, channel_id) = seed(&store, "");

        let err = handler(&store, &fakes)
            .handle(&task(&id, &channel_id))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Client(_)));
        assert!(store.video(&id).upload_status.is_empty());
    }

    #[test]
    fn test_local_publish_time_uses_offset() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let at = resolve_publish_at(Some("2030-01-02T10:00"), Some("+05:30"), now)
            .unwrap()
            .unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2030, 1, 2, 4, 30, 0).unwrap());
    }

    #[test]
    fn test_rfc3339_publish_time_ignores_timezone() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let at = resolve_publish_at(Some("2030-03-01T12:00:00Z"), Some("-08:00"), now)
            .unwrap()
            .unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2030, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_past_publish_time_publishes_now() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(resolve_publish_at(Some("2029-12-31T23:00:00"), None, now).unwrap(), None);
        assert_eq!(resolve_publish_at(None, Some("+01:00"), now).unwrap(), None);
    }

    #[test]
    fn test_bad_publish_time_is_invalid() {
        let now = Utc::now();
        assert!(resolve_publish_at(Some("next tuesday"), None, now)
            .unwrap_err()
            .is_invalid_task());
        assert!(resolve_publish_at(Some("2030-01-02T10:00"), Some("Mars/Olympus"), now)
            .unwrap_err()
            .is_invalid_task());
    }
}
