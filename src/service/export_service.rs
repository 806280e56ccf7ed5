use crate::estimate::delta::DeltaOutcome;
use crate::model::snapshot::{format_timestamp, VideoSnapshot};
use crate::model::video::VideoRecord;
use crate::prelude::*;
use chrono::NaiveDate;
use itertools::Itertools;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const EXPORTED_TAGS: usize = 5;

/// One line of the daily export. Field order is the column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub video_id: String,
    pub title: String,
    pub channel_title: String,
    pub channel_id: String,
    pub url: String,
    pub published_at: String,
    pub fetched_at: String,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub subscriber_count: Option<u64>,
    pub growth_ratio: Option<f64>,
    pub duration_seconds: u64,
    pub video_type: String,
    pub tags: String,
    pub description: String,
    pub thumbnail_url: String,
    pub estimated_views_in_window: Option<u64>,
    pub delta_window_hours: Option<f64>,
    pub delta_anomaly: String,
}

impl ExportRow {
    pub const COLUMNS: [&'static str; 20] = [
        "video_id",
        "title",
        "channel_title",
        "channel_id",
        "url",
        "published_at",
        "fetched_at",
        "view_count",
        "like_count",
        "comment_count",
        "subscriber_count",
        "growth_ratio",
        "duration_seconds",
        "video_type",
        "tags",
        "description",
        "thumbnail_url",
        "estimated_views_in_window",
        "delta_window_hours",
        "delta_anomaly",
    ];

    pub fn new(video: &VideoRecord, snapshot: &VideoSnapshot, outcome: &DeltaOutcome) -> Self {
        let estimate = outcome.estimate();
        let tags = match video.tags.len() > EXPORTED_TAGS {
            true => format!("{}...", video.tags.iter().take(EXPORTED_TAGS).join(", ")),
            false => video.tags.join(", "),
        };

        ExportRow {
            video_id: snapshot.video_id.clone(),
            title: snapshot.title.clone(),
            channel_title: snapshot.channel_title.clone(),
            channel_id: snapshot.channel_id.clone(),
            url: video.url(),
            published_at: format_timestamp(&snapshot.published_at),
            fetched_at: format_timestamp(&snapshot.fetched_at),
            view_count: snapshot.view_count,
            like_count: video.like_count,
            comment_count: video.comment_count,
            subscriber_count: snapshot.subscriber_count,
            growth_ratio: snapshot.growth_ratio().map(|ratio| round_to(ratio, 2)),
            duration_seconds: video.duration_seconds,
            video_type: video.video_type().to_string(),
            tags,
            description: video.description.clone(),
            thumbnail_url: video.thumbnail_url.clone(),
            estimated_views_in_window: estimate.map(|delta| delta.estimated_views_in_window),
            delta_window_hours: estimate
                .map(|delta| round_to(delta.elapsed().num_seconds() as f64 / 3600.0, 1)),
            delta_anomaly: outcome.anomalies().iter().map(|a| a.label()).join(";"),
        }
    }

    /// Cells in `COLUMNS` order, undefined values as empty strings.
    /// Both the CSV and the current-data sheet are written from these.
    pub fn cells(&self) -> Vec<String> {
        let optional = |value: Option<String>| value.unwrap_or_default();
        vec![
            self.video_id.clone(),
            self.title.clone(),
            self.channel_title.clone(),
            self.channel_id.clone(),
            self.url.clone(),
            self.published_at.clone(),
            self.fetched_at.clone(),
            self.view_count.to_string(),
            self.like_count.to_string(),
            self.comment_count.to_string(),
            optional(self.subscriber_count.map(|v| v.to_string())),
            optional(self.growth_ratio.map(|v| format!("{:.2}", v))),
            self.duration_seconds.to_string(),
            self.video_type.clone(),
            self.tags.clone(),
            self.description.clone(),
            self.thumbnail_url.clone(),
            optional(self.estimated_views_in_window.map(|v| v.to_string())),
            optional(self.delta_window_hours.map(|v| format!("{:.1}", v))),
            self.delta_anomaly.clone(),
        ]
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn export_file_name(run_date: NaiveDate) -> String {
    format!("youtube_data_{}.csv", run_date.format("%Y%m%d"))
}

/// Writes the export as UTF-8 with a BOM so spreadsheet tools keep non-ASCII titles intact.
pub fn write_csv(output_dir: &Path, run_date: NaiveDate, rows: &[ExportRow]) -> Result<PathBuf> {
    create_dir_all(output_dir)?;
    let path = output_dir.join(export_file_name(run_date));

    let mut file = BufWriter::new(File::create(&path)?);
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(ExportRow::COLUMNS)?;
    for row in rows {
        writer.write_record(row.cells())?;
    }
    writer.flush()?;
    tracing::info!("CSV file saved to: {}", path.display());

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataAnomaly;
    use crate::estimate::delta::{EstimatedDelta, NotApplicable};
    use chrono::{Duration, TimeZone, Utc};

    fn video() -> VideoRecord {
        VideoRecord {
            video_id: "v1".to_string(),
            channel_id: "UC1".to_string(),
            title: "「速報」Rust, \"2024\"".to_string(),
            channel_title: "テック".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 7, 1, 3, 0, 0).unwrap(),
            view_count: 1234,
            like_count: 10,
            comment_count: 2,
            duration_seconds: 600,
            tags: (1..=7).map(|n| format!("tag{}", n)).collect(),
            description: "説明".to_string(),
            thumbnail_url: String::new(),
        }
    }

    fn outcome(snapshot: &VideoSnapshot) -> DeltaOutcome {
        DeltaOutcome::Estimated(EstimatedDelta {
            video_id: snapshot.video_id.clone(),
            window_start: snapshot.fetched_at - Duration::hours(23) - Duration::minutes(30),
            window_end: snapshot.fetched_at,
            estimated_views_in_window: 0,
            anomalies: vec![DataAnomaly::ViewCountDecreased {
                video_id: snapshot.video_id.clone(),
                prior: 2000,
                current: 1234,
            }],
        })
    }

    #[test]
    fn row_carries_derived_columns() {
        let video = video();
        let snapshot = video.snapshot(Some(617), Utc.with_ymd_and_hms(2024, 7, 2, 0, 0, 0).unwrap());

        let row = ExportRow::new(&video, &snapshot, &outcome(&snapshot));
        assert_eq!(row.growth_ratio, Some(2.0));
        assert_eq!(row.estimated_views_in_window, Some(0));
        assert_eq!(row.delta_window_hours, Some(23.5));
        assert_eq!(row.delta_anomaly, "view_count_decreased");
        assert_eq!(row.tags, "tag1, tag2, tag3, tag4, tag5...");
        assert_eq!(row.video_type, "long");
        assert_eq!(row.cells().len(), ExportRow::COLUMNS.len());
    }

    #[test]
    fn missing_subscribers_keep_the_row() {
        let video = video();
        let snapshot = video.snapshot(None, Utc::now());

        let row = ExportRow::new(
            &video,
            &snapshot,
            &DeltaOutcome::NotApplicable(NotApplicable::NoPriorSnapshot),
        );
        assert_eq!(row.subscriber_count, None);
        assert_eq!(row.growth_ratio, None);
        assert_eq!(row.estimated_views_in_window, None);
        assert_eq!(row.view_count, 1234);
        assert_eq!(row.title, video.title);
    }

    #[test]
    fn csv_keeps_column_order_and_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let video = video();
        let snapshot = video.snapshot(None, Utc::now());
        let row = ExportRow::new(
            &video,
            &snapshot,
            &DeltaOutcome::NotApplicable(NotApplicable::NoPriorSnapshot),
        );

        let run_date = NaiveDate::from_ymd_opt(2024, 7, 2).unwrap();
        let path = write_csv(&dir.path().join("out"), run_date, &[row.clone()]).unwrap();
        assert!(path.ends_with("youtube_data_20240702.csv"));

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        let header = reader.headers().unwrap().clone();
        assert_eq!(header.iter().collect::<Vec<&str>>(), ExportRow::COLUMNS.to_vec());

        let records = reader.records().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].iter().collect::<Vec<&str>>(), row.cells());
        assert_eq!(&records[0][1], "「速報」Rust, \"2024\"");
        assert_eq!(&records[0][10], "");
    }

    #[test]
    fn whole_ratios_render_the_same_in_csv_and_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let video = video();
        let snapshot = video.snapshot(Some(617), Utc.with_ymd_and_hms(2024, 7, 2, 0, 0, 0).unwrap());
        let row = ExportRow::new(&video, &snapshot, &outcome(&snapshot));
        assert_eq!(row.cells()[11], "2.00");
        assert_eq!(row.cells()[18], "23.5");

        let run_date = NaiveDate::from_ymd_opt(2024, 7, 2).unwrap();
        let path = write_csv(dir.path(), run_date, &[row.clone()]).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        let records = reader.records().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(&records[0][11], "2.00");
        assert_eq!(records[0].iter().collect::<Vec<&str>>(), row.cells());
    }
}
