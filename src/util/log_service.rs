use sentry::{init, release_name, ClientInitGuard, ClientOptions};
use sentry_tracing::EventFilter;
use std::env::var;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. ERROR events also go to Sentry when
/// `SENTRY_DSN` is set; keep the returned guard alive until exit so they get flushed.
pub fn setup_logging() -> Option<ClientInitGuard> {
    let guard = match var("SENTRY_DSN") {
        Ok(dsn) => match dsn.is_empty() {
            true => None,
            false => Some(init((
                dsn,
                ClientOptions {
                    release: release_name!(),
                    ..Default::default()
                },
            ))),
        },
        Err(_) => None,
    };

    let sentry_layer = guard.as_ref().map(|_| {
        sentry_tracing::layer().event_filter(|md| match *md.level() {
            tracing::Level::ERROR => EventFilter::Event,
            _ => EventFilter::Ignore,
        })
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(sentry_layer)
        .init();

    if guard.is_none() {
        tracing::info!("SENTRY_DSN not found in environment, errors are only logged locally");
    }

    guard
}
