use crate::analyze::stats::{ChannelStats, KeywordStats};
use crate::analyze::tags::{extract_keywords, rank_tags, TOP_KEYWORDS, TOP_TAGS};
use crate::analyze::timing::PostingHeatmap;
use crate::db::store::SnapshotStore;
use crate::error::{ApiCallError, DataAnomaly};
use crate::estimate::delta::estimate_all;
use crate::prelude::*;
use crate::scrape::youtube::VideoSource;
use crate::service::export_service::{write_csv, ExportRow};
use crate::service::var_service::{Config, Target};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::path::PathBuf;

#[derive(Debug)]
pub struct RunSummary {
    pub found: usize,
    pub exported: Option<PathBuf>,
    pub appended: usize,
    pub estimated: usize,
    pub api_failures: Vec<ApiCallError>,
    pub anomalies: Vec<DataAnomaly>,
    pub top_tags: Vec<(String, usize)>,
    pub top_keywords: Vec<(String, usize)>,
    pub heatmap: PostingHeatmap,
    pub keyword_stats: Option<KeywordStats>,
    /// Only for channel runs.
    pub channel_stats: Option<ChannelStats>,
    pub quota_used: u64,
}

impl RunSummary {
    fn empty() -> Self {
        RunSummary {
            found: 0,
            exported: None,
            appended: 0,
            estimated: 0,
            api_failures: Vec::new(),
            anomalies: Vec::new(),
            top_tags: Vec::new(),
            top_keywords: Vec::new(),
            heatmap: PostingHeatmap::from_videos(&[]),
            keyword_stats: None,
            channel_stats: None,
            quota_used: 0,
        }
    }

    /// True when some records were skipped and the output is partial.
    pub fn is_partial(&self) -> bool {
        !self.api_failures.is_empty()
    }
}

/// One fetch run: read history, fetch, estimate, export, append.
/// History and append failures abort the run, as does a run where the platform
/// answered nothing. Failures of individual batches do not.
pub async fn run_pipeline(
    config: &Config,
    source: &dyn VideoSource,
    store: &dyn SnapshotStore,
    fetched_at: DateTime<Utc>,
) -> Result<RunSummary> {
    let mut summary = RunSummary::empty();

    let history = store.read_all().await?;
    summary.anomalies.extend(history.anomalies);

    let video_ids = match &config.target {
        Target::Query(query) => {
            tracing::info!("Starting fetch for query: {}", query);
            source.search(query, config.max_results).await
        }
        Target::Channel(channel_id) => {
            tracing::info!("Starting fetch for channel: {}", channel_id);
            source.latest_for_channel(channel_id, config.max_results).await
        }
    };
    let video_ids = match video_ids {
        Ok(video_ids) => video_ids,
        Err(e) => {
            tracing::error!("Target lookup failed, nothing fetched: {}", e);
            return Err(e.into());
        }
    };
    summary.found = video_ids.len();

    if video_ids.is_empty() {
        tracing::warn!("No videos found, nothing to export");
        summary.quota_used = source.quota_used();
        return Ok(summary);
    }

    let videos = source.get_video_details(&video_ids).await;
    if let (true, Some(e)) = (videos.videos.is_empty(), videos.failures.first()) {
        tracing::error!("No video details could be fetched: {}", e);
        return Err(e.clone().into());
    }
    summary.api_failures.extend(videos.failures);
    let videos = videos.videos;

    let channel_ids = videos
        .iter()
        .map(|video| video.channel_id.clone())
        .collect::<Vec<String>>();
    let channels = source.get_channel_details(&channel_ids).await;
    summary.api_failures.extend(channels.failures);

    let snapshots = videos
        .iter()
        .map(|video| {
            let subscribers = channels
                .subscribers
                .get(&video.channel_id)
                .copied()
                .flatten();
            video.snapshot(subscribers, fetched_at)
        })
        .collect::<Vec<_>>();

    let outcomes = estimate_all(&snapshots, &history.snapshots, &config.delta_window);
    summary.estimated = outcomes.iter().filter(|outcome| outcome.estimate().is_some()).count();
    for anomaly in outcomes.iter().flat_map(|outcome| outcome.anomalies()) {
        tracing::warn!("{}", anomaly);
        summary.anomalies.push(anomaly.clone());
    }

    let rows = videos
        .iter()
        .zip(&snapshots)
        .zip(&outcomes)
        .map(|((video, snapshot), outcome)| ExportRow::new(video, snapshot, outcome))
        .collect::<Vec<ExportRow>>();

    if rows.is_empty() {
        tracing::warn!("No video details could be fetched, nothing to export");
        summary.quota_used = source.quota_used();
        return Ok(summary);
    }

    summary.exported = Some(write_csv(&config.output_dir, fetched_at.date_naive(), &rows)?);

    store.append(&snapshots).await?;
    summary.appended = snapshots.len();

    if let Err(e) = store.publish_current(&rows).await {
        tracing::error!("Error updating current data: {}", e);
    }

    summary.top_tags = rank_tags(&videos, TOP_TAGS);
    summary.top_keywords = extract_keywords(&videos, TOP_KEYWORDS);
    summary.heatmap = PostingHeatmap::from_videos(&videos);
    summary.keyword_stats = match &config.target {
        Target::Query(query) => KeywordStats::from_run(query, &videos, &snapshots),
        Target::Channel(channel_id) => KeywordStats::from_run(channel_id, &videos, &snapshots),
    };
    if let Target::Channel(channel_id) = &config.target {
        let subscribers = channels.subscribers.get(channel_id).copied().flatten();
        summary.channel_stats = ChannelStats::from_latest(channel_id, &videos, subscribers);
    }
    summary.quota_used = source.quota_used();

    Ok(summary)
}

pub fn report_summary(summary: &RunSummary) {
    tracing::info!(
        "Run finished: {} found, {} appended, {} estimates, {} quota units",
        summary.found,
        summary.appended,
        summary.estimated,
        summary.quota_used
    );

    if let Some(path) = &summary.exported {
        tracing::info!("Export written to {}", path.display());
    }

    if let Some((tag, count)) = summary.top_tags.first() {
        tracing::info!("Most used tag: {} ({} videos)", tag, count);
    }

    if !summary.top_keywords.is_empty() {
        tracing::info!(
            "Top keywords: {}",
            summary
                .top_keywords
                .iter()
                .take(10)
                .map(|(word, count)| format!("{} ({})", word, count))
                .join(", ")
        );
    }

    if let Some(stats) = &summary.keyword_stats {
        tracing::info!(
            "\"{}\": {} videos, views mean {:.0} / median {:.0} / max {}, likes mean {:.0}, comments mean {:.0}",
            stats.keyword,
            stats.video_count,
            stats.mean_views,
            stats.median_views,
            stats.max_views,
            stats.mean_likes,
            stats.mean_comments
        );
        if let (Some(like_rate), Some(comment_rate)) = (stats.like_rate, stats.comment_rate) {
            tracing::info!(
                "Like rate {:.2}%, comment rate {:.2}%",
                like_rate * 100.0,
                comment_rate * 100.0
            );
        }
    }

    if let Some(stats) = &summary.channel_stats {
        tracing::info!(
            "Channel {} over its last {} uploads: {} views, {} likes, {} comments on average, engagement {:.2}%",
            stats.channel_title,
            stats.sampled,
            stats.avg_views,
            stats.avg_likes,
            stats.avg_comments,
            stats.engagement_ratio
        );
        if let Some(pace) = stats.pace {
            tracing::info!(
                "Posting pace: every {} days, {} videos per month",
                pace.avg_days_between_videos,
                pace.videos_per_month
            );
        }
    }

    if let Some((weekday, hour, count)) = summary.heatmap.busiest() {
        tracing::info!(
            "Busiest posting slot (JST): {} {}:00 ({} of {} videos)",
            weekday,
            hour,
            count,
            summary.heatmap.total()
        );
    }

    if summary.is_partial() {
        tracing::warn!(
            "Partial data: {} API calls or records failed and were skipped",
            summary.api_failures.len()
        );
    }

    if !summary.anomalies.is_empty() {
        tracing::warn!("{} data anomalies flagged", summary.anomalies.len());
    }
}
