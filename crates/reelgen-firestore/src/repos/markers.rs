//! Marker documents, one per stage and video.

use tracing::debug;

use reelgen_models::{Marker, MarkerKind, VideoId};

use super::collections::{PENDING_VIDEOS, RENDER_QUEUE, STORY_REQUESTS};
use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::encode_fields;

fn collection(kind: MarkerKind) -> &'static str {
    match kind {
        MarkerKind::PendingVideo => PENDING_VIDEOS,
        MarkerKind::RenderQueueEntry => RENDER_QUEUE,
        MarkerKind::StoryRequest => STORY_REQUESTS,
    }
}

/// Markers are keyed by video id, so a stage can be signalled at most once
/// per video until its handler consumes the marker.
#[derive(Clone)]
pub struct MarkerRepository {
    client: FirestoreClient,
}

impl MarkerRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Returns `false` when an unconsumed marker already exists.
    pub async fn create(&self, kind: MarkerKind, video_id: &VideoId) -> FirestoreResult<bool> {
        let fields = encode_fields(&Marker::new(video_id.clone()))?;
        match self
            .client
            .create_document(collection(kind), video_id.as_str(), fields)
            .await
        {
            Ok(_) => {
                debug!(marker = %kind, video_id = %video_id, "Created marker");
                Ok(true)
            }
            Err(FirestoreError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn exists(&self, kind: MarkerKind, video_id: &VideoId) -> FirestoreResult<bool> {
        Ok(self
            .client
            .get_document(collection(kind), video_id.as_str())
            .await?
            .is_some())
    }

    pub async fn delete(&self, kind: MarkerKind, video_id: &VideoId) -> FirestoreResult<()> {
        self.client
            .delete_document(collection(kind), video_id.as_str())
            .await
    }
}
