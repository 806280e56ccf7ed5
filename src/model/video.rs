use crate::model::snapshot::VideoSnapshot;
use chrono::{DateTime, Utc};
use std::fmt;

/// Videos shorter than this are classed as shorts.
pub const SHORT_VIDEO_SECONDS: u64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoType {
    Short,
    Long,
}

impl fmt::Display for VideoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoType::Short => write!(f, "short"),
            VideoType::Long => write!(f, "long"),
        }
    }
}

/// A video as returned by the details endpoint, before subscriber counts are merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub duration_seconds: u64,
    pub tags: Vec<String>,
    pub description: String,
    pub thumbnail_url: String,
}

impl VideoRecord {
    pub fn url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }

    pub fn video_type(&self) -> VideoType {
        match self.duration_seconds < SHORT_VIDEO_SECONDS {
            true => VideoType::Short,
            false => VideoType::Long,
        }
    }

    pub fn snapshot(&self, subscriber_count: Option<u64>, fetched_at: DateTime<Utc>) -> VideoSnapshot {
        VideoSnapshot {
            video_id: self.video_id.clone(),
            channel_id: self.channel_id.clone(),
            title: self.title.clone(),
            channel_title: self.channel_title.clone(),
            published_at: self.published_at,
            fetched_at,
            view_count: self.view_count,
            subscriber_count,
        }
    }
}
