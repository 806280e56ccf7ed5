use crate::error::ConfigError;
use crate::estimate::delta::DeltaWindow;
use crate::scrape::youtube::MAX_BATCH;
use chrono::{DateTime, Duration, Utc};
use std::env::var;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_QUERY: &str = "プログラミング";
pub const DEFAULT_MAX_RESULTS: usize = 50;
/// Upper bound for DELTA_MIN_HOURS / DELTA_MAX_HOURS.
pub const MAX_DELTA_HOURS: i64 = 24 * 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sheets,
    Sqlite,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sheets" => Ok(StoreKind::Sheets),
            "sqlite" => Ok(StoreKind::Sqlite),
            other => Err(format!("unknown snapshot store {:?}, expected sheets or sqlite", other)),
        }
    }
}

/// What a run fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Query(String),
    /// Latest uploads of one channel.
    Channel(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    Sheets {
        sheet_id: String,
        credentials: String,
        history_sheet: String,
        current_sheet: String,
    },
    Sqlite {
        path: PathBuf,
    },
}

/// Run configuration, loaded once at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_key: String,
    pub target: Target,
    pub max_results: usize,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
    pub store: StoreConfig,
    pub output_dir: PathBuf,
    pub delta_window: DeltaWindow,
}

/// Command line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub query: Option<String>,
    pub channel: Option<String>,
    pub max_results: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub store: Option<StoreKind>,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
}

pub fn load_config(overrides: Overrides) -> Result<Config, ConfigError> {
    build_config(|name| var(name).ok(), overrides)
}

/// First non-empty value among `names`, which are tried in order.
fn get_var<F>(lookup: &F, names: &[&'static str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for name in names {
        match lookup(*name) {
            Some(value) => match value.trim().is_empty() {
                true => tracing::info!("{} is empty", name),
                false => return Some(value.trim().to_string()),
            },
            None => tracing::debug!("{} not found in environment", name),
        }
    }

    None
}

fn get_required_var<F>(lookup: &F, names: &[&'static str]) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get_var(lookup, names) {
        Some(value) => Ok(value),
        None => {
            let err = ConfigError::Missing(names[0]);
            tracing::error!("{}", err);
            Err(err)
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_var(lookup, &[name]) {
        Some(value) => value.parse::<T>().map_err(|e| {
            let err = ConfigError::Invalid {
                name,
                reason: e.to_string(),
            };
            tracing::error!("{}", err);
            err
        }),
        None => Ok(default),
    }
}

pub fn build_config<F>(lookup: F, overrides: Overrides) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = get_required_var(&lookup, &["API_KEY", "YOUTUBE_API_KEY"])?;

    let target = match (overrides.channel, overrides.query) {
        (Some(channel), _) if !channel.trim().is_empty() => Target::Channel(channel.trim().to_string()),
        (_, Some(query)) if !query.trim().is_empty() => Target::Query(query.trim().to_string()),
        _ => Target::Query(
            get_var(&lookup, &["DEFAULT_QUERY", "DEFAULT_SEARCH_QUERY"])
                .unwrap_or_else(|| DEFAULT_QUERY.to_string()),
        ),
    };

    let max_results = match overrides.max_results {
        Some(max_results) => max_results,
        None => parse_var(&lookup, "MAX_RESULTS", DEFAULT_MAX_RESULTS)?,
    };
    let max_results = match max_results {
        0 => {
            let err = ConfigError::Invalid {
                name: "MAX_RESULTS",
                reason: "must be at least 1".to_string(),
            };
            tracing::error!("{}", err);
            return Err(err);
        }
        n if n > MAX_BATCH => {
            tracing::warn!("MAX_RESULTS {} exceeds the API limit, using {}", n, MAX_BATCH);
            MAX_BATCH
        }
        n => n,
    };

    let store_kind = match overrides.store {
        Some(kind) => kind,
        None => parse_var(&lookup, "SNAPSHOT_STORE", StoreKind::Sheets)?,
    };
    let store = match store_kind {
        StoreKind::Sheets => StoreConfig::Sheets {
            sheet_id: get_required_var(&lookup, &["SHEET_ID", "GOOGLE_SHEETS_ID"])?,
            credentials: get_required_var(&lookup, &["CREDENTIALS_PATH", "GOOGLE_CREDS_JSON_PATH"])?,
            history_sheet: get_var(&lookup, &["HISTORY_SHEET"])
                .unwrap_or_else(|| "video_history".to_string()),
            current_sheet: get_var(&lookup, &["CURRENT_SHEET"])
                .unwrap_or_else(|| "current_data".to_string()),
        },
        StoreKind::Sqlite => StoreConfig::Sqlite {
            path: PathBuf::from(
                get_var(&lookup, &["SQLITE_PATH"]).unwrap_or_else(|| "snapshots.sqlite".to_string()),
            ),
        },
    };

    let output_dir = match overrides.output_dir {
        Some(dir) => dir,
        None => PathBuf::from(get_var(&lookup, &["OUTPUT_DIR"]).unwrap_or_else(|| ".".to_string())),
    };

    let min_hours = parse_var(&lookup, "DELTA_MIN_HOURS", 12i64)?;
    let max_hours = parse_var(&lookup, "DELTA_MAX_HOURS", 36i64)?;
    if max_hours > MAX_DELTA_HOURS {
        let err = ConfigError::Invalid {
            name: "DELTA_MAX_HOURS",
            reason: format!("{}h exceeds the {}h limit", max_hours, MAX_DELTA_HOURS),
        };
        tracing::error!("{}", err);
        return Err(err);
    }
    if min_hours < 0 || min_hours >= max_hours {
        let err = ConfigError::Invalid {
            name: "DELTA_MIN_HOURS",
            reason: format!("window {}h..{}h is empty", min_hours, max_hours),
        };
        tracing::error!("{}", err);
        return Err(err);
    }

    if let (Some(after), Some(before)) = (overrides.published_after, overrides.published_before) {
        if after >= before {
            let err = ConfigError::Invalid {
                name: "published_after",
                reason: format!("{} is not before {}", after, before),
            };
            tracing::error!("{}", err);
            return Err(err);
        }
    }

    Ok(Config {
        api_key,
        target,
        max_results,
        published_after: overrides.published_after,
        published_before: overrides.published_before,
        store,
        output_dir,
        delta_window: DeltaWindow::new(Duration::hours(min_hours), Duration::hours(max_hours)),
    })
}
