//! Pure aggregation rules over status tracks.
//!
//! Persistence of the results lives with the worker; these functions only
//! decide.

use chrono::{DateTime, Duration, Utc};

use crate::scene::{StatusMessage, TrackStatus};
use crate::video::Video;

/// Debounce applied before a terminal track status counts as settled.
pub const DEFAULT_SETTLE_THRESHOLD_MS: u64 = 5_000;

/// Combined scene status from its image and voice statuses.
///
/// Returns `None` while either track is still pending or processing.
pub fn combine_scene_status(image: StatusMessage, voice: StatusMessage) -> Option<StatusMessage> {
    if !image.is_terminal() || !voice.is_terminal() {
        return None;
    }
    if image == StatusMessage::Failed || voice == StatusMessage::Failed {
        Some(StatusMessage::Failed)
    } else {
        Some(StatusMessage::Completed)
    }
}

/// A terminal status that has not changed for at least `threshold`.
pub fn is_settled(status: &TrackStatus, now: DateTime<Utc>, threshold: Duration) -> bool {
    status.status_message.is_terminal() && now - status.updated_at >= threshold
}

/// Settled counts for a video's image and voice tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetReadiness {
    pub scene_count: usize,
    pub settled_images: usize,
    pub settled_voices: usize,
}

impl AssetReadiness {
    /// Count settled entries over the video's scene set.
    ///
    /// A scene with no entry on a track counts as unsettled.
    pub fn assess(video: &Video, now: DateTime<Utc>, threshold: Duration) -> Self {
        let settled = |track: &std::collections::BTreeMap<u32, TrackStatus>| {
            video
                .scenes
                .keys()
                .filter_map(|index| track.get(index))
                .filter(|status| is_settled(status, now, threshold))
                .count()
        };

        Self {
            scene_count: video.scenes.len(),
            settled_images: settled(&video.image_status),
            settled_voices: settled(&video.voice_status),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.scene_count > 0
            && self.settled_images == self.scene_count
            && self.settled_voices == self.scene_count
    }
}
