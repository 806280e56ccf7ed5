use crate::error::ApiCallError;
use crate::model::video::VideoRecord;
use crate::model::snapshot::parse_timestamp;
use crate::scrape::util::{best_thumbnail, parse_count, parse_duration, parse_tags, truncate_description};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

pub const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
/// Largest page `search.list` returns and most ids a `*.list` call accepts.
pub const MAX_BATCH: usize = 50;

const SEARCH_COST: u64 = 100;
const LIST_COST: u64 = 1;
const MAX_ATTEMPTS: u32 = 2;
const RETRY_PAUSE: Duration = Duration::from_secs(1);
const BATCH_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct VideoBatch {
    pub videos: Vec<VideoRecord>,
    pub failures: Vec<ApiCallError>,
}

#[derive(Debug, Default)]
pub struct ChannelBatch {
    /// `None` when the channel hides its subscriber count.
    pub subscribers: HashMap<String, Option<u64>>,
    pub failures: Vec<ApiCallError>,
}

/// Read access to the video platform.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, ApiCallError>;

    async fn latest_for_channel(
        &self,
        channel_id: &str,
        max_results: usize,
    ) -> Result<Vec<String>, ApiCallError>;

    async fn get_video_details(&self, video_ids: &[String]) -> VideoBatch;

    async fn get_channel_details(&self, channel_ids: &[String]) -> ChannelBatch;

    /// Quota units spent so far.
    fn quota_used(&self) -> u64 {
        0
    }
}

pub struct YoutubeClient {
    http: Client,
    api_key: String,
    base_url: String,
    published_after: Option<DateTime<Utc>>,
    published_before: Option<DateTime<Utc>>,
    quota: AtomicU64,
}

impl YoutubeClient {
    pub fn new(http: Client, api_key: &str) -> Self {
        YoutubeClient {
            http,
            api_key: api_key.to_string(),
            base_url: API_BASE.to_string(),
            published_after: None,
            published_before: None,
            quota: AtomicU64::new(0),
        }
    }

    /// Restricts keyword searches to videos published inside the given bounds.
    pub fn with_published_window(
        mut self,
        published_after: Option<DateTime<Utc>>,
        published_before: Option<DateTime<Utc>>,
    ) -> Self {
        self.published_after = published_after;
        self.published_before = published_before;
        self
    }

    async fn get_json(
        &self,
        endpoint: &'static str,
        params: &[(&str, String)],
        cost: u64,
    ) -> Result<Value, ApiCallError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, endpoint)).map_err(|e| {
            ApiCallError::Request {
                endpoint,
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(key, value)| (*key, value.as_str())))
            .append_pair("key", &self.api_key);

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.quota.fetch_add(cost, Ordering::Relaxed);

            let response = match self.http.get(url.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect();
                    let reason = e.without_url().to_string();
                    if transient && attempt < MAX_ATTEMPTS {
                        tracing::warn!("{} request failed, retrying: {}", endpoint, reason);
                        tokio::time::sleep(RETRY_PAUSE).await;
                        continue;
                    }

                    let err = ApiCallError::Request { endpoint, reason };
                    tracing::error!("{}", err);
                    return Err(err);
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.json::<Value>().await.map_err(|e| {
                    let err = ApiCallError::Request {
                        endpoint,
                        reason: e.without_url().to_string(),
                    };
                    tracing::error!("{}", err);
                    err
                });
            }

            let transient = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
            let body = response.text().await.unwrap_or_default();
            if transient && attempt < MAX_ATTEMPTS {
                tracing::warn!("Non-success response from Youtube {}: {}, retrying", endpoint, status);
                tokio::time::sleep(RETRY_PAUSE).await;
                continue;
            }

            let err = ApiCallError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            };
            tracing::error!("{}", err);
            return Err(err);
        }
    }
}

#[async_trait]
impl VideoSource for YoutubeClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, ApiCallError> {
        let mut params = vec![
            ("part", "id".to_string()),
            ("q", query.to_string()),
            ("type", "video".to_string()),
            ("order", "viewCount".to_string()),
            ("relevanceLanguage", "ja".to_string()),
            ("maxResults", max_results.min(MAX_BATCH).to_string()),
        ];
        if let Some(after) = self.published_after {
            params.push(("publishedAfter", after.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(before) = self.published_before {
            params.push(("publishedBefore", before.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        let json = self.get_json("search", &params, SEARCH_COST).await?;
        let video_ids = parse_search_ids(&json);
        tracing::info!("Found {} videos for query: {}", video_ids.len(), query);

        Ok(video_ids)
    }

    async fn latest_for_channel(
        &self,
        channel_id: &str,
        max_results: usize,
    ) -> Result<Vec<String>, ApiCallError> {
        let params = [
            ("part", "id".to_string()),
            ("channelId", channel_id.to_string()),
            ("type", "video".to_string()),
            ("order", "date".to_string()),
            ("maxResults", max_results.min(MAX_BATCH).to_string()),
        ];

        let json = self.get_json("search", &params, SEARCH_COST).await?;
        let video_ids = parse_search_ids(&json);
        tracing::info!("Found {} recent videos for channel: {}", video_ids.len(), channel_id);

        Ok(video_ids)
    }

    async fn get_video_details(&self, video_ids: &[String]) -> VideoBatch {
        let mut batch = VideoBatch::default();
        let video_ids = video_ids.iter().unique().collect::<Vec<&String>>();

        for (index, chunk) in video_ids.chunks(MAX_BATCH).enumerate() {
            if index > 0 {
                tokio::time::sleep(BATCH_PAUSE).await;
            }

            let params = [
                ("part", "snippet,statistics,contentDetails".to_string()),
                ("id", chunk.iter().join(",")),
            ];
            let json = match self.get_json("videos", &params, LIST_COST).await {
                Ok(json) => json,
                Err(e) => {
                    batch.failures.push(e);
                    continue;
                }
            };

            let mut found: HashMap<String, VideoRecord> = HashMap::new();
            for item in json["items"].as_array().into_iter().flatten() {
                match parse_video_item(item) {
                    Ok(video) => {
                        found.insert(video.video_id.clone(), video);
                    }
                    Err(e) => {
                        tracing::warn!("{}", e);
                        batch.failures.push(e);
                    }
                }
            }

            for video_id in chunk {
                match found.remove(video_id.as_str()) {
                    Some(video) => batch.videos.push(video),
                    None if batch.failures.iter().any(|f| failure_for(f, video_id)) => {}
                    None => {
                        let err = ApiCallError::MissingItem {
                            kind: "video",
                            id: video_id.to_string(),
                        };
                        tracing::warn!("{}", err);
                        batch.failures.push(err);
                    }
                }
            }
        }

        batch
    }

    async fn get_channel_details(&self, channel_ids: &[String]) -> ChannelBatch {
        let mut batch = ChannelBatch::default();
        let channel_ids = channel_ids
            .iter()
            .filter(|id| !id.is_empty())
            .unique()
            .collect::<Vec<&String>>();

        for (index, chunk) in channel_ids.chunks(MAX_BATCH).enumerate() {
            if index > 0 {
                tokio::time::sleep(BATCH_PAUSE).await;
            }

            let params = [
                ("part", "statistics".to_string()),
                ("id", chunk.iter().join(",")),
            ];
            let json = match self.get_json("channels", &params, LIST_COST).await {
                Ok(json) => json,
                Err(e) => {
                    batch.failures.push(e);
                    continue;
                }
            };

            let mut found = parse_channel_subscribers(&json);
            for channel_id in chunk {
                match found.remove(channel_id.as_str()) {
                    Some(subscribers) => {
                        batch.subscribers.insert(channel_id.to_string(), subscribers);
                    }
                    None => {
                        let err = ApiCallError::MissingItem {
                            kind: "channel",
                            id: channel_id.to_string(),
                        };
                        tracing::warn!("{}", err);
                        batch.failures.push(err);
                    }
                }
            }
        }

        batch
    }

    fn quota_used(&self) -> u64 {
        self.quota.load(Ordering::Relaxed)
    }
}

fn failure_for(failure: &ApiCallError, video_id: &str) -> bool {
    matches!(failure, ApiCallError::Malformed { id, .. } if id == video_id)
}

pub fn parse_search_ids(json: &Value) -> Vec<String> {
    let Some(items) = json["items"].as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| item["id"]["videoId"].as_str())
        .map(|id| id.to_string())
        .collect()
}

pub fn parse_video_item(item: &Value) -> Result<VideoRecord, ApiCallError> {
    let Some(video_id) = item["id"].as_str() else {
        return Err(ApiCallError::Malformed {
            kind: "video",
            id: String::new(),
            reason: "missing id".to_string(),
        });
    };
    let malformed = |reason: &str| ApiCallError::Malformed {
        kind: "video",
        id: video_id.to_string(),
        reason: reason.to_string(),
    };

    let snippet = &item["snippet"];
    let statistics = &item["statistics"];

    let Some(published_at) = snippet["publishedAt"].as_str() else {
        return Err(malformed("missing publishedAt"));
    };
    let published_at = parse_timestamp(published_at).map_err(|_| malformed("unparsable publishedAt"))?;

    let Some(view_count) = parse_count(&statistics["viewCount"]) else {
        return Err(malformed("missing viewCount"));
    };

    Ok(VideoRecord {
        video_id: video_id.to_string(),
        channel_id: snippet["channelId"].as_str().unwrap_or_default().to_string(),
        title: snippet["title"].as_str().unwrap_or_default().to_string(),
        channel_title: snippet["channelTitle"].as_str().unwrap_or_default().to_string(),
        published_at,
        view_count,
        like_count: parse_count(&statistics["likeCount"]).unwrap_or(0),
        comment_count: parse_count(&statistics["commentCount"]).unwrap_or(0),
        duration_seconds: parse_duration(item["contentDetails"]["duration"].as_str().unwrap_or_default()),
        tags: parse_tags(&snippet["tags"]),
        description: truncate_description(snippet["description"].as_str().unwrap_or_default()),
        thumbnail_url: best_thumbnail(&snippet["thumbnails"]),
    })
}

pub fn parse_channel_subscribers(json: &Value) -> HashMap<String, Option<u64>> {
    let mut subscribers = HashMap::new();
    let Some(items) = json["items"].as_array() else {
        return subscribers;
    };

    for item in items {
        let Some(channel_id) = item["id"].as_str() else {
            continue;
        };

        let statistics = &item["statistics"];
        let count = match statistics["hiddenSubscriberCount"].as_bool() {
            Some(true) => None,
            _ => parse_count(&statistics["subscriberCount"]),
        };
        subscribers.insert(channel_id.to_string(), count);
    }

    subscribers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn video_item() -> Value {
        json!({
            "id": "dQw4w9WgXcQ",
            "snippet": {
                "publishedAt": "2024-05-01T12:30:00Z",
                "channelId": "UC123",
                "title": "はじめてのRust",
                "channelTitle": "Rustチャンネル",
                "description": "desc",
                "tags": ["rust", "プログラミング"],
                "thumbnails": {"medium": {"url": "https://i.ytimg.com/m.jpg"}}
            },
            "statistics": {"viewCount": "1500", "likeCount": "20"},
            "contentDetails": {"duration": "PT1M10S"}
        })
    }

    #[test]
    fn search_ids_skip_items_without_video_id() {
        let json = json!({
            "items": [
                {"id": {"kind": "youtube#video", "videoId": "a"}},
                {"id": {"kind": "youtube#channel", "channelId": "x"}},
                {"id": {"videoId": "b"}}
            ]
        });
        assert_eq!(parse_search_ids(&json), vec!["a", "b"]);
        assert!(parse_search_ids(&json!({})).is_empty());
    }

    #[test]
    fn video_item_is_normalized() {
        let video = parse_video_item(&video_item()).unwrap();
        assert_eq!(video.video_id, "dQw4w9WgXcQ");
        assert_eq!(video.channel_id, "UC123");
        assert_eq!(
            video.published_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
        );
        assert_eq!(video.view_count, 1500);
        assert_eq!(video.like_count, 20);
        assert_eq!(video.comment_count, 0);
        assert_eq!(video.duration_seconds, 70);
        assert_eq!(video.video_type().to_string(), "short");
        assert_eq!(video.thumbnail_url, "https://i.ytimg.com/m.jpg");
        assert_eq!(video.url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn video_without_view_count_is_malformed() {
        let mut item = video_item();
        item["statistics"] = json!({});
        assert!(matches!(
            parse_video_item(&item),
            Err(ApiCallError::Malformed { id, .. }) if id == "dQw4w9WgXcQ"
        ));
    }

    #[test]
    fn hidden_subscriber_counts_are_unknown() {
        let json = json!({
            "items": [
                {"id": "UC1", "statistics": {"subscriberCount": "1000", "hiddenSubscriberCount": false}},
                {"id": "UC2", "statistics": {"hiddenSubscriberCount": true}},
                {"id": "UC3", "statistics": {}}
            ]
        });
        let subscribers = parse_channel_subscribers(&json);
        assert_eq!(subscribers["UC1"], Some(1000));
        assert_eq!(subscribers["UC2"], None);
        assert_eq!(subscribers["UC3"], None);
    }

    #[tokio::test]
    async fn unreachable_api_fails_the_batch_not_the_call() {
        let mut client = YoutubeClient::new(Client::new(), "key");
        client.base_url = "http://127.0.0.1:9".to_string();

        let ids = vec!["a".to_string(), "b".to_string()];
        let batch = client.get_video_details(&ids).await;
        assert!(batch.videos.is_empty());
        assert_eq!(batch.failures.len(), 1);
        assert!(client.quota_used() >= 1);

        let channels = client.get_channel_details(&[]).await;
        assert!(channels.subscribers.is_empty());
        assert!(channels.failures.is_empty());
    }
}
