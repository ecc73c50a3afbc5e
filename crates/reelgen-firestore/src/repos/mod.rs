//! Typed repositories over the pipeline's collections.

mod bulk_jobs;
mod catalog;
mod channels;
mod markers;
mod stories;
mod videos;

pub use bulk_jobs::BulkJobRepository;
pub use catalog::CatalogRepository;
pub use channels::ChannelRepository;
pub use markers::MarkerRepository;
pub use stories::StoryRequestRepository;
pub use videos::{Track, VideoRepository};

/// Collection names.
pub mod collections {
    pub const VIDEOS: &str = "videos";
    pub const PENDING_VIDEOS: &str = "pendingVideos";
    pub const RENDER_QUEUE: &str = "renderQueue";
    pub const STORY_REQUESTS: &str = "storyRequests";
    pub const STORY_GENERATIONS: &str = "storyGenerations";
    pub const BULK_JOBS: &str = "bulkJobs";
    pub const TEMPLATES: &str = "templates";
    pub const CONTENT_TYPES: &str = "contentTypes";
    pub const CHANNELS: &str = "channels";
}
