mod analyze {
    pub mod stats;
    pub mod tags;
    pub mod timing;
}
mod db {
    pub mod sheets;
    pub mod sheets_auth;
    pub mod snapshot_db;
    pub mod store;
    pub mod util;
}
mod estimate {
    pub mod delta;
}
mod model {
    pub mod snapshot;
    pub mod video;
}
mod scrape {
    pub mod util;
    pub mod youtube;
}
mod service {
    pub mod export_service;
    pub mod pipeline_service;
    pub mod var_service;
}
mod util {
    pub mod log_service;
}
mod error;
mod prelude;

use chrono::{DateTime, Utc};
use clap::Parser;
use db::sheets::SheetsStore;
use db::sheets_auth::ServiceAccountKey;
use db::snapshot_db::SqliteStore;
use db::store::SnapshotStore;
use dotenv::dotenv;
use prelude::*;
use scrape::youtube::YoutubeClient;
use service::pipeline_service::{report_summary, run_pipeline};
use service::var_service::{load_config, Overrides, StoreConfig, StoreKind};
use std::path::PathBuf;
use std::time::Duration;
use util::log_service::setup_logging;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(
    name = "yt-trend-tracker",
    about = "Snapshot YouTube search results, estimate 24h view growth and export a daily CSV"
)]
struct Cli {
    /// Search keyword. Falls back to DEFAULT_QUERY.
    #[arg(long)]
    query: Option<String>,

    /// Track the latest uploads of this channel instead of searching.
    #[arg(long, conflicts_with = "query")]
    channel: Option<String>,

    /// Number of videos to fetch, at most 50.
    #[arg(long)]
    max_results: Option<usize>,

    /// Directory the dated CSV is written to.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Snapshot store backend: sheets or sqlite.
    #[arg(long)]
    store: Option<StoreKind>,

    /// Only search videos published after this RFC 3339 time.
    #[arg(long)]
    published_after: Option<DateTime<Utc>>,

    /// Only search videos published before this RFC 3339 time.
    #[arg(long)]
    published_before: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _sentry = setup_logging();
    let cli = Cli::parse();

    let config = load_config(Overrides {
        query: cli.query,
        channel: cli.channel,
        max_results: cli.max_results,
        output_dir: cli.output_dir,
        store: cli.store,
        published_after: cli.published_after,
        published_before: cli.published_before,
    })?;

    let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let source = YoutubeClient::new(http.clone(), &config.api_key)
        .with_published_window(config.published_after, config.published_before);

    let store: Box<dyn SnapshotStore> = match &config.store {
        StoreConfig::Sheets {
            sheet_id,
            credentials,
            history_sheet,
            current_sheet,
        } => Box::new(SheetsStore::new(
            http,
            ServiceAccountKey::load(credentials)?,
            sheet_id,
            history_sheet,
            current_sheet,
        )),
        StoreConfig::Sqlite { path } => Box::new(SqliteStore::open(path).await?),
    };

    let summary = run_pipeline(&config, &source, store.as_ref(), Utc::now()).await?;
    report_summary(&summary);

    Ok(())
}
