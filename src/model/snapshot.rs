use crate::error::{DataAnomaly, StoreError};
use chrono::{DateTime, SecondsFormat, Utc};

/// Column names of the snapshot history, in the order rows are written.
pub const HISTORY_COLUMNS: [&str; 8] = [
    "video_id",
    "channel_id",
    "title",
    "channel_title",
    "published_at",
    "fetched_at",
    "view_count",
    "subscriber_count",
];

/// One observation of a video's public metrics at `fetched_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSnapshot {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub view_count: u64,
    pub subscriber_count: Option<u64>,
}

impl VideoSnapshot {
    /// Views per subscriber. Undefined when the channel hides its count or has none.
    pub fn growth_ratio(&self) -> Option<f64> {
        match self.subscriber_count {
            Some(subscribers) if subscribers > 0 => {
                Some(self.view_count as f64 / subscribers as f64)
            }
            _ => None,
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.video_id.clone(),
            self.channel_id.clone(),
            self.title.clone(),
            self.channel_title.clone(),
            format_timestamp(&self.published_at),
            format_timestamp(&self.fetched_at),
            self.view_count.to_string(),
            self.subscriber_count
                .map(|count| count.to_string())
                .unwrap_or_default(),
        ]
    }

    /// Parses a stored row. `row_number` is only used for reporting.
    pub fn from_row(
        columns: &ColumnIndex,
        row: &[String],
        row_number: usize,
    ) -> Result<Self, DataAnomaly> {
        let cell = |position: usize| row.get(position).map(|s| s.trim()).unwrap_or("");
        let malformed = |reason: String| DataAnomaly::MalformedRow {
            row: row_number,
            reason,
        };

        let video_id = cell(columns.video_id);
        if video_id.is_empty() {
            return Err(malformed("empty video_id".to_string()));
        }

        let published_at = parse_timestamp(cell(columns.published_at))
            .map_err(|e| malformed(format!("published_at: {}", e)))?;
        let fetched_at = parse_timestamp(cell(columns.fetched_at))
            .map_err(|e| malformed(format!("fetched_at: {}", e)))?;
        let view_count = cell(columns.view_count)
            .parse::<u64>()
            .map_err(|e| malformed(format!("view_count: {}", e)))?;
        let subscriber_count = match cell(columns.subscriber_count) {
            "" => None,
            count => Some(
                count
                    .parse::<u64>()
                    .map_err(|e| malformed(format!("subscriber_count: {}", e)))?,
            ),
        };

        Ok(VideoSnapshot {
            video_id: video_id.to_string(),
            channel_id: cell(columns.channel_id).to_string(),
            title: cell(columns.title).to_string(),
            channel_title: cell(columns.channel_title).to_string(),
            published_at,
            fetched_at,
            view_count,
            subscriber_count,
        })
    }
}

/// Positions of the history columns within a stored row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnIndex {
    video_id: usize,
    channel_id: usize,
    title: usize,
    channel_title: usize,
    published_at: usize,
    fetched_at: usize,
    view_count: usize,
    subscriber_count: usize,
}

impl ColumnIndex {
    /// Layout of rows written by `VideoSnapshot::to_row`.
    pub fn canonical() -> Self {
        ColumnIndex {
            video_id: 0,
            channel_id: 1,
            title: 2,
            channel_title: 3,
            published_at: 4,
            fetched_at: 5,
            view_count: 6,
            subscriber_count: 7,
        }
    }

    /// Looks columns up by name, so reordered or extra columns are tolerated.
    pub fn from_header(header: &[String]) -> Result<Self, StoreError> {
        let find = |name: &'static str| {
            header
                .iter()
                .position(|column| column.trim() == name)
                .ok_or(StoreError::MissingColumn(name))
        };

        Ok(ColumnIndex {
            video_id: find("video_id")?,
            channel_id: find("channel_id")?,
            title: find("title")?,
            channel_title: find("channel_title")?,
            published_at: find("published_at")?,
            fetched_at: find("fetched_at")?,
            view_count: find("view_count")?,
            subscriber_count: find("subscriber_count")?,
        })
    }
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(subscriber_count: Option<u64>) -> VideoSnapshot {
        VideoSnapshot {
            video_id: "abc123".to_string(),
            channel_id: "UCxyz".to_string(),
            title: "Rust入門, part 1".to_string(),
            channel_title: "チャンネル".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            fetched_at: Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap(),
            view_count: 1500,
            subscriber_count,
        }
    }

    #[test]
    fn growth_ratio_is_undefined_without_subscribers() {
        assert_eq!(snapshot(None).growth_ratio(), None);
        assert_eq!(snapshot(Some(0)).growth_ratio(), None);
        assert_eq!(snapshot(Some(500)).growth_ratio(), Some(3.0));
    }

    #[test]
    fn stored_row_parses_back() {
        let original = snapshot(None);
        let row = original.to_row();
        let parsed = VideoSnapshot::from_row(&ColumnIndex::canonical(), &row, 2).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn header_lookup_tolerates_reordering() {
        let header: Vec<String> = [
            "fetched_at",
            "video_id",
            "view_count",
            "extra",
            "channel_id",
            "title",
            "channel_title",
            "published_at",
            "subscriber_count",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let columns = ColumnIndex::from_header(&header).unwrap();
        let row: Vec<String> = [
            "2024-05-03T00:00:00Z",
            "vid",
            "42",
            "ignored",
            "UC1",
            "t",
            "c",
            "2024-05-01T00:00:00Z",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        // trailing empty subscriber cell is trimmed by some stores
        let parsed = VideoSnapshot::from_row(&columns, &row, 2).unwrap();
        assert_eq!(parsed.video_id, "vid");
        assert_eq!(parsed.view_count, 42);
        assert_eq!(parsed.subscriber_count, None);
    }

    #[test]
    fn missing_column_is_a_store_error() {
        let header = vec!["video_id".to_string(), "view_count".to_string()];
        assert!(matches!(
            ColumnIndex::from_header(&header),
            Err(StoreError::MissingColumn("channel_id"))
        ));
    }

    #[test]
    fn malformed_row_is_an_anomaly() {
        let mut row = snapshot(Some(10)).to_row();
        row[6] = "lots".to_string();
        let err = VideoSnapshot::from_row(&ColumnIndex::canonical(), &row, 7).unwrap_err();
        assert!(matches!(err, DataAnomaly::MalformedRow { row: 7, .. }));

        let mut row = snapshot(Some(10)).to_row();
        row[0] = String::new();
        assert!(VideoSnapshot::from_row(&ColumnIndex::canonical(), &row, 8).is_err());
    }
}
