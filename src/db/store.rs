use crate::error::{DataAnomaly, StoreError};
use crate::model::snapshot::{ColumnIndex, VideoSnapshot};
use crate::service::export_service::ExportRow;
use async_trait::async_trait;
#[cfg(test)]
use tokio::sync::Mutex;

/// Snapshot history read back from a store, in insertion order.
#[derive(Debug, Default)]
pub struct History {
    pub snapshots: Vec<VideoSnapshot>,
    /// Rows that could not be turned into snapshots.
    pub anomalies: Vec<DataAnomaly>,
}

impl History {
    /// Validates raw rows. `first_row_number` is the number reported for `rows[0]`.
    pub fn from_rows(columns: &ColumnIndex, rows: &[Vec<String>], first_row_number: usize) -> Self {
        let mut history = History::default();
        for (offset, row) in rows.iter().enumerate() {
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }

            match VideoSnapshot::from_row(columns, row, first_row_number + offset) {
                Ok(snapshot) => history.snapshots.push(snapshot),
                Err(anomaly) => {
                    tracing::warn!("{}", anomaly);
                    history.anomalies.push(anomaly);
                }
            }
        }

        history
    }
}

/// Append-only snapshot history. Single writer per run.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn read_all(&self) -> Result<History, StoreError>;

    async fn append(&self, snapshots: &[VideoSnapshot]) -> Result<(), StoreError>;

    /// Replaces the "latest run" view where the store has one.
    async fn publish_current(&self, _rows: &[ExportRow]) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<VideoSnapshot>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_snapshots(snapshots: Vec<VideoSnapshot>) -> Self {
        MemoryStore {
            rows: Mutex::new(snapshots),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn read_all(&self) -> Result<History, StoreError> {
        Ok(History {
            snapshots: self.rows.lock().await.clone(),
            anomalies: Vec::new(),
        })
    }

    async fn append(&self, snapshots: &[VideoSnapshot]) -> Result<(), StoreError> {
        self.rows.lock().await.extend_from_slice(snapshots);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snapshot(video_id: &str) -> VideoSnapshot {
        VideoSnapshot {
            video_id: video_id.to_string(),
            channel_id: "UC".to_string(),
            title: "t".to_string(),
            channel_title: "c".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            fetched_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            view_count: 1,
            subscriber_count: None,
        }
    }

    #[test]
    fn bad_rows_become_anomalies_and_blank_rows_vanish() {
        let rows = vec![
            snapshot("a").to_row(),
            vec![String::new(); 8],
            vec!["b".to_string(), "UC".to_string()],
            snapshot("c").to_row(),
        ];
        let history = History::from_rows(&ColumnIndex::canonical(), &rows, 2);

        let ids = history
            .snapshots
            .iter()
            .map(|s| s.video_id.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(history.anomalies.len(), 1);
        assert!(matches!(
            history.anomalies[0],
            DataAnomaly::MalformedRow { row: 4, .. }
        ));
    }

    #[tokio::test]
    async fn memory_store_keeps_insertion_order() {
        let store = MemoryStore::with_snapshots(vec![snapshot("a")]);
        store.append(&[snapshot("b"), snapshot("c")]).await.unwrap();

        let history = store.read_all().await.unwrap();
        let ids = history
            .snapshots
            .iter()
            .map(|s| s.video_id.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
