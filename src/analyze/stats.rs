use crate::model::snapshot::VideoSnapshot;
use crate::model::video::VideoRecord;
use itertools::Itertools;

/// Number of latest uploads a channel summary is computed over.
pub const CHANNEL_SAMPLE: usize = 5;

/// Aggregate view and engagement figures for one search keyword (or channel) run.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordStats {
    pub keyword: String,
    pub video_count: usize,
    pub mean_views: f64,
    pub max_views: u64,
    pub median_views: f64,
    pub mean_likes: f64,
    pub mean_comments: f64,
    /// Mean views-to-subscribers ratio over videos where it is defined.
    pub mean_growth_ratio: Option<f64>,
    pub mean_duration_seconds: f64,
    /// Mean per-video comments/views over videos with at least one view.
    pub comment_rate: Option<f64>,
    pub like_rate: Option<f64>,
}

impl KeywordStats {
    pub fn from_run(keyword: &str, videos: &[VideoRecord], snapshots: &[VideoSnapshot]) -> Option<Self> {
        if videos.is_empty() {
            return None;
        }

        let views = videos
            .iter()
            .map(|video| video.view_count)
            .sorted()
            .collect::<Vec<u64>>();
        let middle = views.len() / 2;
        let median_views = match views.len() % 2 {
            0 => (views[middle - 1] as f64 + views[middle] as f64) / 2.0,
            _ => views[middle] as f64,
        };

        let watched = videos
            .iter()
            .filter(|video| video.view_count > 0)
            .collect::<Vec<&VideoRecord>>();
        let rate = |count: fn(&VideoRecord) -> u64| {
            mean(
                watched
                    .iter()
                    .map(|video| count(video) as f64 / video.view_count as f64),
            )
        };

        Some(KeywordStats {
            keyword: keyword.to_string(),
            video_count: videos.len(),
            mean_views: mean(views.iter().map(|&v| v as f64)).unwrap_or(0.0),
            max_views: views.last().copied().unwrap_or(0),
            median_views,
            mean_likes: mean(videos.iter().map(|video| video.like_count as f64)).unwrap_or(0.0),
            mean_comments: mean(videos.iter().map(|video| video.comment_count as f64)).unwrap_or(0.0),
            mean_growth_ratio: mean(snapshots.iter().filter_map(VideoSnapshot::growth_ratio)),
            mean_duration_seconds: mean(videos.iter().map(|video| video.duration_seconds as f64))
                .unwrap_or(0.0),
            comment_rate: rate(|video| video.comment_count),
            like_rate: rate(|video| video.like_count),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostingPace {
    pub avg_days_between_videos: f64,
    pub videos_per_month: f64,
}

/// Averages over a channel's latest uploads plus how often it posts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStats {
    pub channel_id: String,
    pub channel_title: String,
    pub subscriber_count: Option<u64>,
    pub sampled: usize,
    pub avg_views: u64,
    pub avg_likes: u64,
    pub avg_comments: u64,
    /// Likes per 100 views.
    pub engagement_ratio: f64,
    /// Needs at least two uploads.
    pub pace: Option<PostingPace>,
}

impl ChannelStats {
    pub fn from_latest(
        channel_id: &str,
        videos: &[VideoRecord],
        subscriber_count: Option<u64>,
    ) -> Option<Self> {
        let latest = videos
            .iter()
            .filter(|video| video.channel_id == channel_id)
            .sorted_by(|a, b| b.published_at.cmp(&a.published_at))
            .take(CHANNEL_SAMPLE)
            .collect::<Vec<&VideoRecord>>();
        let first = latest.first()?;

        let sampled = latest.len() as u64;
        let avg_views = latest.iter().map(|video| video.view_count).sum::<u64>() / sampled;
        let avg_likes = latest.iter().map(|video| video.like_count).sum::<u64>() / sampled;
        let avg_comments = latest.iter().map(|video| video.comment_count).sum::<u64>() / sampled;

        let pace = mean(
            latest
                .iter()
                .tuple_windows()
                .map(|(newer, older)| (newer.published_at - older.published_at).num_days() as f64),
        )
        .map(|avg_days| PostingPace {
            avg_days_between_videos: round_tenths(avg_days),
            videos_per_month: round_tenths(30.0 / avg_days.max(1.0)),
        });

        Some(ChannelStats {
            channel_id: channel_id.to_string(),
            channel_title: first.channel_title.clone(),
            subscriber_count,
            sampled: latest.len(),
            avg_views,
            avg_likes,
            avg_comments,
            engagement_ratio: avg_likes as f64 / avg_views.max(1) as f64 * 100.0,
            pace,
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    match count {
        0 => None,
        n => Some(sum / n as f64),
    }
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn video(channel_id: &str, days_ago: i64, views: u64, likes: u64, comments: u64) -> VideoRecord {
        VideoRecord {
            video_id: format!("{}-{}", channel_id, days_ago),
            channel_id: channel_id.to_string(),
            title: String::new(),
            channel_title: format!("{} title", channel_id),
            published_at: t0() - Duration::days(days_ago),
            view_count: views,
            like_count: likes,
            comment_count: comments,
            duration_seconds: 120,
            tags: Vec::new(),
            description: String::new(),
            thumbnail_url: String::new(),
        }
    }

    #[test]
    fn keyword_stats_cover_spread_and_rates() {
        let videos = vec![
            video("UC1", 1, 100, 10, 1),
            video("UC1", 2, 0, 0, 0),
            video("UC2", 3, 300, 3, 3),
            video("UC2", 4, 1000, 100, 10),
        ];
        let snapshots = vec![
            videos[0].snapshot(Some(50), t0()),
            videos[1].snapshot(None, t0()),
            videos[2].snapshot(Some(100), t0()),
            videos[3].snapshot(Some(0), t0()),
        ];

        let stats = KeywordStats::from_run("rust", &videos, &snapshots).unwrap();
        assert_eq!(stats.keyword, "rust");
        assert_eq!(stats.video_count, 4);
        assert_eq!(stats.mean_views, 350.0);
        assert_eq!(stats.max_views, 1000);
        assert_eq!(stats.median_views, 200.0);
        assert_eq!(stats.mean_likes, 28.25);
        assert_eq!(stats.mean_comments, 3.5);
        assert_eq!(stats.mean_growth_ratio, Some(2.5));
        assert_eq!(stats.mean_duration_seconds, 120.0);
        assert_eq!(stats.like_rate, Some((0.1 + 0.01 + 0.1) / 3.0));
        assert_eq!(stats.comment_rate, Some((0.01 + 0.01 + 0.01) / 3.0));
    }

    #[test]
    fn keyword_stats_need_videos() {
        assert_eq!(KeywordStats::from_run("rust", &[], &[]), None);

        let videos = vec![video("UC1", 1, 0, 0, 0)];
        let stats = KeywordStats::from_run("rust", &videos, &[]).unwrap();
        assert_eq!(stats.median_views, 0.0);
        assert_eq!(stats.like_rate, None);
        assert_eq!(stats.mean_growth_ratio, None);
    }

    #[test]
    fn channel_stats_use_latest_uploads_only() {
        let mut videos = (0..7)
            .map(|i| video("UC1", i * 3, 100 * (i as u64 + 1), 10, 2))
            .collect::<Vec<VideoRecord>>();
        videos.push(video("UC2", 0, 9999, 9999, 9999));

        let stats = ChannelStats::from_latest("UC1", &videos, Some(5000)).unwrap();
        assert_eq!(stats.channel_title, "UC1 title");
        assert_eq!(stats.subscriber_count, Some(5000));
        assert_eq!(stats.sampled, CHANNEL_SAMPLE);
        assert_eq!(stats.avg_views, 300);
        assert_eq!(stats.avg_likes, 10);
        assert_eq!(stats.avg_comments, 2);
        assert_eq!(
            stats.pace,
            Some(PostingPace {
                avg_days_between_videos: 3.0,
                videos_per_month: 10.0,
            })
        );
    }

    #[test]
    fn single_upload_has_no_pace() {
        let videos = vec![video("UC1", 0, 0, 5, 0)];
        let stats = ChannelStats::from_latest("UC1", &videos, None).unwrap();
        assert_eq!(stats.pace, None);
        assert_eq!(stats.engagement_ratio, 500.0);

        assert_eq!(ChannelStats::from_latest("UC9", &videos, None), None);
    }

    #[test]
    fn frequent_posting_caps_at_thirty_per_month() {
        let videos = vec![video("UC1", 0, 1, 0, 0), video("UC1", 0, 1, 0, 0)];
        let pace = ChannelStats::from_latest("UC1", &videos, None)
            .unwrap()
            .pace
            .unwrap();
        assert_eq!(pace.avg_days_between_videos, 0.0);
        assert_eq!(pace.videos_per_month, 30.0);
    }
}
