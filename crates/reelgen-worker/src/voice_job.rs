//! Scene narration audio and word timings.

use std::sync::Arc;

use tracing::info;

use reelgen_models::{SceneIndex, TrackStatus, VideoId};
use reelgen_queue::VoiceTask;
use reelgen_storage::keys;

use crate::aggregate::Aggregators;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::scene_track::TrackWriter;
use crate::services::{AssetStore, SpeechSynthesizer, Transcriber};
use crate::store::{PipelineStore, TrackStore, VideoReader, VoiceAsset, VoiceTrack};

const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Handler for `generate_voice`.
pub struct VoiceJobHandler {
    writer: TrackWriter<VoiceTrack>,
    aggregators: Aggregators,
    speech: Arc<dyn SpeechSynthesizer>,
    transcriber: Arc<dyn Transcriber>,
    assets: Arc<dyn AssetStore>,
}

impl VoiceJobHandler {
    pub fn new<S>(
        store: Arc<S>,
        speech: Arc<dyn SpeechSynthesizer>,
        transcriber: Arc<dyn Transcriber>,
        assets: Arc<dyn AssetStore>,
        config: &WorkerConfig,
    ) -> Self
    where
        S: VideoReader + TrackStore<VoiceTrack> + PipelineStore + 'static,
    {
        Self {
            writer: TrackWriter::new(store.clone(), config.verify_attempts),
            aggregators: Aggregators::new(store, config.settle_threshold_chrono()),
            speech,
            transcriber,
            assets,
        }
    }

    pub async fn handle(&self, task: &VoiceTask) -> WorkerResult<()> {
        let (video_id, index, narration, voice_id) = task
            .validated()
            .map_err(|e| WorkerError::invalid_task(e.to_string()))?;

        let result = self.generate(&video_id, index, narration, voice_id).await;
        self.writer.conclude(&self.aggregators, &video_id, index, result).await
    }

    async fn generate(
        &self,
        video_id: &VideoId,
        index: SceneIndex,
        narration: &str,
        voice_id: &str,
    ) -> WorkerResult<()> {
        self.writer
            .set_status(video_id, index, TrackStatus::processing(0.1))
            .await?;

        let audio = self.speech.synthesize(narration, voice_id).await?;
        self.writer
            .set_status(video_id, index, TrackStatus::processing(0.5))
            .await?;

        let key = keys::scene_voice(video_id, index);
        let url = self.assets.put(&key, audio.clone(), AUDIO_CONTENT_TYPE).await?;

        let (captions, words) = self
            .transcriber
            .transcribe(&audio)
            .await?
            .complete()
            .ok_or_else(|| WorkerError::generation_failed("transcript is missing text or word timings"))?;

        let word_count = words.len();
        self.writer
            .record(video_id, index, &VoiceAsset { url, captions, words })
            .await?;
        info!(video_id = %video_id, scene_index = index, words = word_count, "Scene voice stored");
        Ok(())
    }
}
