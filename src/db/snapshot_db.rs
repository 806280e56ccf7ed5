use crate::db::store::{History, SnapshotStore};
use crate::db::util::{create_snapshot_table, get_db_pool};
use crate::error::StoreError;
use crate::model::snapshot::{format_timestamp, ColumnIndex, VideoSnapshot};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Snapshot history kept in a local SQLite file.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let pool = get_db_pool(db_path).await?;
        create_snapshot_table(&pool).await?;
        tracing::info!("Opened snapshot database at {}", db_path.display());

        Ok(SqliteStore { pool })
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn read_all(&self) -> Result<History, StoreError> {
        let rows = sqlx::query(
            "SELECT video_id, channel_id, title, channel_title, published_at, fetched_at,
                CAST(view_count AS TEXT), CAST(subscriber_count AS TEXT)
            FROM snapshots ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut cells = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(8);
            for index in 0..8 {
                values.push(row.try_get::<Option<String>, _>(index)?.unwrap_or_default());
            }
            cells.push(values);
        }

        let history = History::from_rows(&ColumnIndex::canonical(), &cells, 1);
        tracing::info!("Loaded {} snapshots from sqlite", history.snapshots.len());

        Ok(history)
    }

    async fn append(&self, snapshots: &[VideoSnapshot]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for snapshot in snapshots {
            sqlx::query(
                "INSERT INTO snapshots (video_id, channel_id, title, channel_title, published_at,
                    fetched_at, view_count, subscriber_count)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&snapshot.video_id)
            .bind(&snapshot.channel_id)
            .bind(&snapshot.title)
            .bind(&snapshot.channel_title)
            .bind(format_timestamp(&snapshot.published_at))
            .bind(format_timestamp(&snapshot.fetched_at))
            .bind(i64::try_from(snapshot.view_count).unwrap_or(i64::MAX))
            .bind(
                snapshot
                    .subscriber_count
                    .map(|count| i64::try_from(count).unwrap_or(i64::MAX)),
            )
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        tracing::info!("Appended {} snapshots to sqlite", snapshots.len());

        Ok(())
    }
}
