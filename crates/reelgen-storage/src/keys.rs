//! Object key layout.

use reelgen_models::{SceneIndex, VideoId};

pub fn scene_image(video_id: &VideoId, index: SceneIndex, extension: &str) -> String {
    format!("videos/{}/scenes/{}/image.{}", video_id, index, extension)
}

pub fn scene_voice(video_id: &VideoId, index: SceneIndex) -> String {
    format!("videos/{}/scenes/{}/voice.mp3", video_id, index)
}

/// Extension for an image content type, defaulting to png.
pub fn image_extension(content_type: &str) -> &'static str {
    match content_type.split(';').next().unwrap_or_default().trim() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}
