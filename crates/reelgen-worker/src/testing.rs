//! In-memory store, queue and scripted services for handler tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use reelgen_clients::{
    AccessToken, ChunkOutcome, ClientError, ClientResult, ImageBytes, ImageJob, ImageJobState, RenderJob,
    RenderState, Transcript, UploadMetadata,
};
use reelgen_models::{
    BulkJob, BulkJobId, BulkJobStatus, BulkOutcome, Channel, ChannelCredentials, ChannelId, ContentType,
    MarkerKind, RenderStatus, Scene, SceneIndex, StatusMessage, Story, StoryRequest, StoryRequestId,
    StoryScene, StoryStatus, TaskId, Template, TrackStatus, UploadStatus, Version, Versioned, Video,
    VideoId, VideoStatus, WordTiming,
};
use reelgen_queue::{QueueError, QueueResult, QueueTask, TaskKind, TaskQueue};
use reelgen_storage::{StorageError, StorageResult};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::polling::PollPolicy;
use crate::services::{
    AssetStore, ImageGenerator, Publisher, Renderer, Services, SpeechSynthesizer, StoryWriter, Transcriber,
};
use crate::store::{
    AssetTrack, BulkStore, CatalogReader, ChannelStore, MarkerStore, PipelineStore, RenderStore, StoryStore,
    TrackStore, Transition, UploadStore, VideoReader,
};

/// Worker settings with zero debounce and short waits.
pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        settle_threshold: Duration::ZERO,
        default_voice_id: "voice-default".into(),
        render_poll: PollPolicy::new(Duration::from_secs(5), 10),
        upload_chunk_bytes: 4,
        ..WorkerConfig::default()
    }
}

pub fn video_with_scenes(count: u32) -> Video {
    let scenes: BTreeMap<SceneIndex, Scene> = (0..count)
        .map(|i| (i, Scene::new(format!("narration {}", i), format!("prompt {}", i))))
        .collect();
    Video::draft("user-1", "space facts")
        .with_voice("voice-1")
        .with_scenes(scenes)
}

pub fn story_with_scenes(count: usize) -> Story {
    Story {
        title: "Title".into(),
        description: "Description".into(),
        scenes: (0..count)
            .map(|i| StoryScene {
                narration: format!("beat {}", i),
                image_prompt: format!("picture {}", i),
            })
            .collect(),
    }
}

#[derive(Default)]
struct State {
    videos: HashMap<VideoId, (Video, u64)>,
    history: HashMap<VideoId, Vec<VideoStatus>>,
    markers: HashSet<(MarkerKind, VideoId)>,
    bulk_jobs: HashMap<BulkJobId, BulkJob>,
    stories: HashMap<StoryRequestId, StoryRequest>,
    templates: HashMap<String, Template>,
    content_types: HashMap<String, ContentType>,
    channels: HashMap<ChannelId, Channel>,
    conflicts: u32,
    dropped_merges: u32,
    failed_outcome_writes: u32,
    cancel_on_template_read: bool,
    render_progress: Vec<f64>,
    upload_progress: Vec<f64>,
}

impl State {
    fn video_mut(&mut self, id: &VideoId) -> WorkerResult<&mut (Video, u64)> {
        self.videos
            .get_mut(id)
            .ok_or_else(|| WorkerError::not_found(format!("video {}", id)))
    }

    fn set_status(&mut self, id: &VideoId, status: VideoStatus) -> WorkerResult<()> {
        let entry = self.video_mut(id)?;
        entry.0.status = status;
        entry.1 += 1;
        self.history.entry(id.clone()).or_default().push(status);
        Ok(())
    }
}

/// Record store held in memory. Every video write bumps its version.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_video(&self, video: Video) {
        let mut state = self.state.lock().unwrap();
        state.history.insert(video.id.clone(), vec![video.status]);
        state.videos.insert(video.id.clone(), (video, 1));
    }

    pub fn video(&self, id: &VideoId) -> Video {
        self.state.lock().unwrap().videos[id].0.clone()
    }

    pub fn videos(&self) -> Vec<Video> {
        self.state.lock().unwrap().videos.values().map(|(v, _)| v.clone()).collect()
    }

    pub fn update_video(&self, id: &VideoId, f: impl FnOnce(&mut Video)) {
        let mut state = self.state.lock().unwrap();
        let entry = state.videos.get_mut(id).unwrap();
        f(&mut entry.0);
        entry.1 += 1;
    }

    /// Statuses the video has held, in order.
    pub fn status_history(&self, id: &VideoId) -> Vec<VideoStatus> {
        self.state.lock().unwrap().history.get(id).cloned().unwrap_or_default()
    }

    /// The next `n` compare-and-swap writes lose to a concurrent writer.
    pub fn inject_conflicts(&self, n: u32) {
        self.state.lock().unwrap().conflicts = n;
    }

    /// The next `n` scene merges are acknowledged but not applied.
    pub fn drop_merges(&self, n: u32) {
        self.state.lock().unwrap().dropped_merges = n;
    }

    /// The next `n` bulk progress writes fail.
    pub fn fail_outcome_writes(&self, n: u32) {
        self.state.lock().unwrap().failed_outcome_writes = n;
    }

    /// Running bulk jobs are cancelled as soon as a template is looked up.
    pub fn cancel_bulk_jobs_on_template_read(&self) {
        self.state.lock().unwrap().cancel_on_template_read = true;
    }

    pub fn insert_marker(&self, kind: MarkerKind, id: &VideoId) {
        self.state.lock().unwrap().markers.insert((kind, id.clone()));
    }

    pub fn has_marker(&self, kind: MarkerKind, id: &VideoId) -> bool {
        self.state.lock().unwrap().markers.contains(&(kind, id.clone()))
    }

    pub fn insert_bulk_job(&self, job: BulkJob) {
        self.state.lock().unwrap().bulk_jobs.insert(job.id.clone(), job);
    }

    pub fn bulk_job(&self, id: &BulkJobId) -> BulkJob {
        self.state.lock().unwrap().bulk_jobs[id].clone()
    }

    pub fn update_bulk_job(&self, id: &BulkJobId, f: impl FnOnce(&mut BulkJob)) {
        if let Some(job) = self.state.lock().unwrap().bulk_jobs.get_mut(id) {
            f(job);
        }
    }

    pub fn insert_story(&self, request: StoryRequest) {
        self.state.lock().unwrap().stories.insert(request.id.clone(), request);
    }

    pub fn story(&self, id: &StoryRequestId) -> StoryRequest {
        self.state.lock().unwrap().stories[id].clone()
    }

    pub fn update_story(&self, id: &StoryRequestId, f: impl FnOnce(&mut StoryRequest)) {
        let mut state = self.state.lock().unwrap();
        if let Some(request) = state.stories.get_mut(id) {
            f(request);
        }
    }

    /// Install scenes the way the scene builder would.
    pub fn install_scenes(&self, id: &VideoId, story: &Story) {
        let scenes = story.to_scenes();
        self.update_video(id, move |video| {
            *video = video.clone().with_scenes(scenes);
        });
    }

    pub fn insert_template(&self, template: Template) {
        self.state.lock().unwrap().templates.insert(template.id.clone(), template);
    }

    pub fn insert_content_type(&self, content_type: ContentType) {
        self.state
            .lock()
            .unwrap()
            .content_types
            .insert(content_type.id.clone(), content_type);
    }

    pub fn insert_channel(&self, channel: Channel) {
        self.state.lock().unwrap().channels.insert(channel.id.clone(), channel);
    }

    pub fn channel(&self, id: &ChannelId) -> Channel {
        self.state.lock().unwrap().channels[id].clone()
    }

    pub fn render_progress(&self) -> Vec<f64> {
        self.state.lock().unwrap().render_progress.clone()
    }

    pub fn upload_progress(&self) -> Vec<f64> {
        self.state.lock().unwrap().upload_progress.clone()
    }
}

#[async_trait]
impl VideoReader for MemoryStore {
    async fn get_video(&self, video_id: &VideoId) -> WorkerResult<Option<Versioned<Video>>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .videos
            .get(video_id)
            .map(|(video, version)| Versioned::new(video.clone(), Version(version.to_string()))))
    }
}

#[async_trait]
impl<T: AssetTrack> TrackStore<T> for MemoryStore {
    async fn set_track_status(
        &self,
        video_id: &VideoId,
        index: SceneIndex,
        status: &TrackStatus,
    ) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.video_mut(video_id)?;
        T::statuses_mut(&mut entry.0).insert(index, status.clone());
        entry.1 += 1;
        Ok(())
    }

    async fn merge_asset(&self, video_id: &VideoId, index: SceneIndex, asset: &T::Asset) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.dropped_merges > 0 {
            state.dropped_merges -= 1;
            return Ok(());
        }
        let entry = state.video_mut(video_id)?;
        let scene = entry.0.scenes.entry(index).or_insert_with(|| Scene::new("", ""));
        T::apply(scene, asset);
        entry.1 += 1;
        Ok(())
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn set_scene_status(
        &self,
        video_id: &VideoId,
        index: SceneIndex,
        status: &TrackStatus,
    ) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.video_mut(video_id)?;
        entry.0.scene_status.insert(index, status.clone());
        entry.1 += 1;
        Ok(())
    }

    async fn initialize_scenes(
        &self,
        video_id: &VideoId,
        scenes: &BTreeMap<SceneIndex, Scene>,
    ) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.video_mut(video_id)?;
        let video = entry.0.clone().with_scenes(scenes.clone());
        entry.0 = video;
        entry.1 += 1;
        Ok(())
    }

    async fn transition_status(
        &self,
        video_id: &VideoId,
        expected: &Version,
        next: VideoStatus,
    ) -> WorkerResult<Transition> {
        let mut state = self.state.lock().unwrap();
        if state.conflicts > 0 {
            state.conflicts -= 1;
            state.video_mut(video_id)?.1 += 1;
            return Ok(Transition::Conflict);
        }
        let current = state.video_mut(video_id)?.1;
        if current.to_string() != expected.as_str() {
            return Ok(Transition::Conflict);
        }
        state.set_status(video_id, next)?;
        Ok(Transition::Applied)
    }

    async fn fail_video(&self, video_id: &VideoId, message: &str) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.video_mut(video_id)?.0.error = Some(message.to_string());
        state.set_status(video_id, VideoStatus::Error)
    }
}

#[async_trait]
impl RenderStore for MemoryStore {
    async fn begin_render(&self, video_id: &VideoId, expected: &Version) -> WorkerResult<Transition> {
        let mut state = self.state.lock().unwrap();
        if state.video_mut(video_id)?.1.to_string() != expected.as_str() {
            return Ok(Transition::Conflict);
        }
        state.video_mut(video_id)?.0.render_status = RenderStatus::default();
        state.set_status(video_id, VideoStatus::ProcessingRender)?;
        Ok(Transition::Applied)
    }

    async fn set_render_progress(&self, video_id: &VideoId, progress: f64) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.render_progress.push(progress);
        let entry = state.video_mut(video_id)?;
        entry.0.render_status.progress = progress;
        entry.1 += 1;
        Ok(())
    }

    async fn set_render_id(&self, video_id: &VideoId, render_id: &str) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.video_mut(video_id)?;
        entry.0.render_status.render_id = Some(render_id.to_string());
        entry.1 += 1;
        Ok(())
    }

    async fn finish_render(
        &self,
        video_id: &VideoId,
        status: VideoStatus,
        render: &RenderStatus,
    ) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.video_mut(video_id)?.0.render_status = render.clone();
        state.set_status(video_id, status)
    }
}

#[async_trait]
impl UploadStore for MemoryStore {
    async fn set_upload_status(
        &self,
        video_id: &VideoId,
        platform: &str,
        upload: &UploadStatus,
    ) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.video_mut(video_id)?;
        entry.0.upload_status.insert(platform.to_string(), upload.clone());
        entry.1 += 1;
        Ok(())
    }

    async fn set_upload_progress(&self, video_id: &VideoId, platform: &str, progress: f64) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.upload_progress.push(progress);
        let entry = state.video_mut(video_id)?;
        entry.0.upload_status.entry(platform.to_string()).or_default().progress = progress;
        entry.1 += 1;
        Ok(())
    }
}

#[async_trait]
impl MarkerStore for MemoryStore {
    async fn create_marker(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<bool> {
        Ok(self.state.lock().unwrap().markers.insert((kind, video_id.clone())))
    }

    async fn marker_exists(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<bool> {
        Ok(self.has_marker(kind, video_id))
    }

    async fn delete_marker(&self, kind: MarkerKind, video_id: &VideoId) -> WorkerResult<()> {
        self.state.lock().unwrap().markers.remove(&(kind, video_id.clone()));
        Ok(())
    }
}

#[async_trait]
impl BulkStore for MemoryStore {
    async fn get_bulk_job(&self, id: &BulkJobId) -> WorkerResult<Option<BulkJob>> {
        Ok(self.state.lock().unwrap().bulk_jobs.get(id).cloned())
    }

    async fn create_bulk_job(&self, job: &BulkJob) -> WorkerResult<()> {
        self.state.lock().unwrap().bulk_jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn cancel_bulk_job(&self, id: &BulkJobId) -> WorkerResult<Option<BulkJobStatus>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.bulk_jobs.get_mut(id).map(|job| {
            if !job.is_terminal() {
                job.status = BulkJobStatus::Cancelled;
            }
            job.status
        }))
    }

    async fn set_bulk_status(
        &self,
        id: &BulkJobId,
        status: BulkJobStatus,
        error: Option<&str>,
    ) -> WorkerResult<BulkJobStatus> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .bulk_jobs
            .get_mut(id)
            .ok_or_else(|| WorkerError::not_found(format!("bulk job {}", id)))?;
        if job.status == BulkJobStatus::Cancelled {
            return Ok(job.status);
        }
        job.status = status;
        if let Some(error) = error {
            job.error = Some(error.to_string());
        }
        Ok(status)
    }

    async fn record_bulk_outcome(&self, id: &BulkJobId, outcome: &BulkOutcome) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.failed_outcome_writes > 0 {
            state.failed_outcome_writes -= 1;
            return Err(unavailable("record store").into());
        }
        let job = state
            .bulk_jobs
            .get_mut(id)
            .ok_or_else(|| WorkerError::not_found(format!("bulk job {}", id)))?;
        job.progress = outcome.progress;
        job.completed_videos = outcome.completed_videos.clone();
        job.failed_videos = outcome.failed_videos.clone();
        Ok(())
    }

    async fn create_video(&self, video: &Video) -> WorkerResult<()> {
        self.insert_video(video.clone());
        Ok(())
    }
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn create_story_request(&self, request: &StoryRequest) -> WorkerResult<()> {
        self.insert_story(request.clone());
        Ok(())
    }

    async fn get_story_request(&self, id: &StoryRequestId) -> WorkerResult<Option<StoryRequest>> {
        Ok(self.state.lock().unwrap().stories.get(id).cloned())
    }

    async fn set_story_status(&self, id: &StoryRequestId, status: StoryStatus, error: Option<&str>) -> WorkerResult<()> {
        self.update_story(id, |request| {
            request.status = status;
            request.error = error.map(str::to_string);
        });
        Ok(())
    }

    async fn complete_story(&self, id: &StoryRequestId, story: &Story) -> WorkerResult<()> {
        self.update_story(id, |request| {
            request.status = StoryStatus::Completed;
            request.story = Some(story.clone());
        });
        Ok(())
    }
}

#[async_trait]
impl CatalogReader for MemoryStore {
    async fn template(&self, id: &str) -> WorkerResult<Option<Template>> {
        let mut state = self.state.lock().unwrap();
        if state.cancel_on_template_read {
            for job in state.bulk_jobs.values_mut().filter(|job| !job.is_terminal()) {
                job.status = BulkJobStatus::Cancelled;
            }
        }
        Ok(state.templates.get(id).cloned())
    }

    async fn content_type(&self, id: &str) -> WorkerResult<Option<ContentType>> {
        Ok(self.state.lock().unwrap().content_types.get(id).cloned())
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn get_channel(&self, id: &ChannelId) -> WorkerResult<Option<Channel>> {
        Ok(self.state.lock().unwrap().channels.get(id).cloned())
    }

    async fn save_credentials(&self, id: &ChannelId, credentials: &ChannelCredentials) -> WorkerResult<()> {
        if let Some(channel) = self.state.lock().unwrap().channels.get_mut(id) {
            channel.credentials = credentials.clone();
        }
        Ok(())
    }
}

type Responder = Box<dyn Fn(&QueueTask) + Send + Sync>;

/// Queue that records enqueues and optionally reacts to them.
#[derive(Default)]
pub struct MemoryQueue {
    tasks: Mutex<Vec<(QueueTask, Duration)>>,
    failing: AtomicBool,
    responder: Mutex<Option<Responder>>,
}

impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_enqueues(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Run `f` synchronously for every immediate enqueue.
    pub fn respond_with(&self, f: impl Fn(&QueueTask) + Send + Sync + 'static) {
        *self.responder.lock().unwrap() = Some(Box::new(f));
    }

    pub fn tasks(&self) -> Vec<QueueTask> {
        self.tasks.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn delayed(&self) -> Vec<(QueueTask, Duration)> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, d)| !d.is_zero())
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: TaskKind) -> usize {
        self.tasks.lock().unwrap().iter().filter(|(t, _)| t.kind() == kind).count()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: QueueTask) -> QueueResult<TaskId> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::enqueue_failed("queue unavailable"));
        }
        if let Some(respond) = self.responder.lock().unwrap().as_ref() {
            respond(&task);
        }
        self.tasks.lock().unwrap().push((task, Duration::ZERO));
        Ok(TaskId::new())
    }

    async fn enqueue_after(&self, task: QueueTask, delay: Duration) -> QueueResult<TaskId> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::enqueue_failed("queue unavailable"));
        }
        self.tasks.lock().unwrap().push((task, delay));
        Ok(TaskId::new())
    }
}

fn unavailable(service: &'static str) -> ClientError {
    ClientError::from_status(service, 503, "unavailable")
}

/// How a scripted image job ends.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageScript {
    /// Processing for `n` polls, then succeeded.
    SucceedAfter(u32),
    /// Terminal failure on the first poll.
    Fail,
    /// Succeeded but with an error field set.
    ErrorField(String),
    /// Never leaves processing.
    Hang,
    /// Submission is rejected.
    Unavailable,
}

pub struct FakeImages {
    script: Mutex<ImageScript>,
    polls: AtomicU32,
}

impl Default for FakeImages {
    fn default() -> Self {
        Self {
            script: Mutex::new(ImageScript::SucceedAfter(1)),
            polls: AtomicU32::new(0),
        }
    }
}

impl FakeImages {
    pub fn script(&self, script: ImageScript) {
        *self.script.lock().unwrap() = script;
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn submit(&self, _prompt: &str) -> ClientResult<String> {
        match *self.script.lock().unwrap() {
            ImageScript::Unavailable => Err(unavailable("image")),
            _ => Ok("job-1".into()),
        }
    }

    async fn status(&self, job_id: &str) -> ClientResult<ImageJob> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let script = self.script.lock().unwrap().clone();
        let (status, error) = match script {
            ImageScript::SucceedAfter(n) if poll > n => (ImageJobState::Succeeded, None),
            ImageScript::Fail => (ImageJobState::Failed, Some("rejected".to_string())),
            ImageScript::ErrorField(e) => (ImageJobState::Succeeded, Some(e)),
            _ => (ImageJobState::Processing, None),
        };
        Ok(ImageJob {
            id: job_id.to_string(),
            status,
            output: vec!["https://images.test/out.png".into()],
            error,
        })
    }

    async fn download(&self, _url: &str) -> ClientResult<ImageBytes> {
        Ok(ImageBytes {
            bytes: b"png".to_vec(),
            content_type: "image/png".into(),
        })
    }
}

#[derive(Default)]
pub struct FakeSpeech {
    failing: AtomicBool,
}

impl FakeSpeech {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> ClientResult<Vec<u8>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("speech"));
        }
        Ok(b"mp3".to_vec())
    }
}

pub struct FakeTranscriber {
    transcript: Mutex<Transcript>,
}

impl Default for FakeTranscriber {
    fn default() -> Self {
        Self {
            transcript: Mutex::new(Transcript {
                text: Some("Hello there".into()),
                words: Some(vec![
                    WordTiming {
                        word: "Hello".into(),
                        start: 0.0,
                        end: 0.4,
                    },
                    WordTiming {
                        word: "there".into(),
                        start: 0.4,
                        end: 0.8,
                    },
                ]),
            }),
        }
    }
}

impl FakeTranscriber {
    pub fn respond(&self, transcript: Transcript) {
        *self.transcript.lock().unwrap() = transcript;
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> ClientResult<Transcript> {
        Ok(self.transcript.lock().unwrap().clone())
    }
}

/// Story writer returning a fixed story, or failing when none is set.
pub struct FakeStories {
    story: Mutex<Option<Story>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl Default for FakeStories {
    fn default() -> Self {
        Self {
            story: Mutex::new(Some(story_with_scenes(3))),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeStories {
    pub fn respond(&self, story: Option<Story>) {
        *self.story.lock().unwrap() = story;
    }

    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoryWriter for FakeStories {
    async fn write(&self, prompt: &str, guidance: Option<&str>) -> ClientResult<Story> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), guidance.map(str::to_string)));
        self.story.lock().unwrap().clone().ok_or_else(|| unavailable("story"))
    }
}

/// Renderer that replays a list of polls; the last one repeats.
pub struct FakeRenderer {
    polls: Mutex<VecDeque<RenderJob>>,
    submits: AtomicU32,
}

impl Default for FakeRenderer {
    fn default() -> Self {
        let renderer = Self {
            polls: Mutex::new(VecDeque::new()),
            submits: AtomicU32::new(0),
        };
        renderer.script(vec![
            render_poll(RenderState::Rendering, 0.5, None),
            render_poll(RenderState::Done, 1.0, Some("https://cdn.test/final.mp4")),
        ]);
        renderer
    }
}

pub fn render_poll(status: RenderState, progress: f64, url: Option<&str>) -> RenderJob {
    RenderJob {
        id: "render-1".into(),
        status,
        progress,
        url: url.map(str::to_string),
        error: match status {
            RenderState::Failed => Some("encoder crashed".into()),
            _ => None,
        },
    }
}

impl FakeRenderer {
    pub fn script(&self, polls: Vec<RenderJob>) {
        *self.polls.lock().unwrap() = polls.into();
    }

    pub fn submits(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn submit(&self, _video: &Video) -> ClientResult<String> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        Ok("render-1".into())
    }

    async fn status(&self, _render_id: &str) -> ClientResult<RenderJob> {
        let mut polls = self.polls.lock().unwrap();
        let poll = if polls.len() > 1 { polls.pop_front() } else { polls.front().cloned() };
        poll.ok_or_else(|| unavailable("render"))
    }
}

/// Accepts `chunk_limit` bytes per request regardless of what was sent.
pub struct FakePublisher {
    pub asset_len: usize,
    chunk_limit: Mutex<Option<u64>>,
    metadata: Mutex<Vec<UploadMetadata>>,
    chunks: Mutex<Vec<(u64, usize)>>,
    rotated_refresh_token: Mutex<Option<String>>,
}

impl Default for FakePublisher {
    fn default() -> Self {
        Self {
            asset_len: 10,
            chunk_limit: Mutex::new(None),
            metadata: Mutex::new(Vec::new()),
            chunks: Mutex::new(Vec::new()),
            rotated_refresh_token: Mutex::new(None),
        }
    }
}

impl FakePublisher {
    /// Token refreshes hand back `token` as the new refresh token.
    pub fn rotate_refresh_token(&self, token: &str) {
        *self.rotated_refresh_token.lock().unwrap() = Some(token.to_string());
    }

    pub fn accept_at_most(&self, bytes: u64) {
        *self.chunk_limit.lock().unwrap() = Some(bytes);
    }

    pub fn metadata(&self) -> Vec<UploadMetadata> {
        self.metadata.lock().unwrap().clone()
    }

    /// `(offset, len)` of every chunk sent.
    pub fn chunks(&self) -> Vec<(u64, usize)> {
        self.chunks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    fn platform(&self) -> &'static str {
        "youtube"
    }

    fn watch_url(&self, platform_video_id: &str) -> String {
        format!("https://youtu.test/{}", platform_video_id)
    }

    async fn refresh(&self, refresh_token: &str) -> ClientResult<AccessToken> {
        if refresh_token.is_empty() {
            return Err(ClientError::from_status("youtube", 401, "invalid_grant"));
        }
        Ok(AccessToken {
            access_token: "fresh-token".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            refresh_token: self.rotated_refresh_token.lock().unwrap().clone(),
        })
    }

    async fn download(&self, _url: &str) -> ClientResult<Vec<u8>> {
        Ok(vec![7u8; self.asset_len])
    }

    async fn start_upload(&self, _access_token: &str, metadata: &UploadMetadata, _total: u64) -> ClientResult<String> {
        self.metadata.lock().unwrap().push(metadata.clone());
        Ok("https://upload.test/session-1".into())
    }

    async fn upload_chunk(
        &self,
        _session_url: &str,
        _access_token: &str,
        chunk: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> ClientResult<ChunkOutcome> {
        self.chunks.lock().unwrap().push((offset, chunk.len()));
        let accepted = match *self.chunk_limit.lock().unwrap() {
            Some(limit) => (chunk.len() as u64).min(limit),
            None => chunk.len() as u64,
        };
        let next_offset = offset + accepted;
        if next_offset >= total {
            Ok(ChunkOutcome::Complete {
                video_id: "yt-1".into(),
            })
        } else {
            Ok(ChunkOutcome::Incomplete { next_offset })
        }
    }
}

#[derive(Default)]
pub struct FakeAssets {
    keys: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl FakeAssets {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for FakeAssets {
    async fn put(&self, key: &str, _data: Vec<u8>, _content_type: &str) -> StorageResult<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::upload_failed("bucket unavailable"));
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(format!("https://cdn.test/{}", key))
    }
}

/// Every fake service, kept so tests can script and inspect them.
#[derive(Default, Clone)]
pub struct Fakes {
    pub images: Arc<FakeImages>,
    pub speech: Arc<FakeSpeech>,
    pub transcriber: Arc<FakeTranscriber>,
    pub stories: Arc<FakeStories>,
    pub renderer: Arc<FakeRenderer>,
    pub publisher: Arc<FakePublisher>,
    pub assets: Arc<FakeAssets>,
}

impl Fakes {
    pub fn services(&self) -> Services {
        Services {
            images: self.images.clone(),
            speech: self.speech.clone(),
            transcriber: self.transcriber.clone(),
            stories: self.stories.clone(),
            renderer: self.renderer.clone(),
            publisher: self.publisher.clone(),
            assets: self.assets.clone(),
        }
    }
}

pub fn track_statuses<T: AssetTrack>(video: &Video) -> Vec<StatusMessage> {
    T::statuses(video).values().map(|s| s.status_message).collect()
}
