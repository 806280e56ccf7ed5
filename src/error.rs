use chrono::{DateTime, Utc};
use thiserror::Error;

/// Missing or invalid configuration. Always fatal, raised before any API call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found in environment")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// A failed unit of work against the video platform. The run skips the
/// affected records and carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiCallError {
    #[error("{endpoint} request failed: {reason}")]
    Request {
        endpoint: &'static str,
        reason: String,
    },
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },
    #[error("{kind} {id} missing from response")]
    MissingItem { kind: &'static str, id: String },
    #[error("{kind} {id} is malformed: {reason}")]
    Malformed {
        kind: &'static str,
        id: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite store: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("sheets request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sheets returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("snapshot history is missing required column {0}")]
    MissingColumn(&'static str),
    #[error("service account credentials: {0}")]
    Credentials(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataAnomaly {
    #[error("view count of {video_id} went down from {prior} to {current}")]
    ViewCountDecreased {
        video_id: String,
        prior: u64,
        current: u64,
    },
    #[error("{count} history rows of {video_id} share fetched_at {fetched_at}")]
    DuplicateTimestamp {
        video_id: String,
        fetched_at: DateTime<Utc>,
        count: usize,
    },
    #[error("history row {row} is malformed: {reason}")]
    MalformedRow { row: usize, reason: String },
}

impl DataAnomaly {
    pub fn label(&self) -> &'static str {
        match self {
            DataAnomaly::ViewCountDecreased { .. } => "view_count_decreased",
            DataAnomaly::DuplicateTimestamp { .. } => "duplicate_timestamp",
            DataAnomaly::MalformedRow { .. } => "malformed_row",
        }
    }
}
