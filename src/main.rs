//! Topic Digest: binary entrypoint.
//! Loads config, starts the scheduler and retention tasks, and serves the
//! read API plus `/metrics`.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use topic_digest::metrics::Metrics;
use topic_digest::{App, AppConfig};

/// Compact logs by default, JSON when `LOG_FORMAT=json`. Leaves an already
/// installed subscriber (e.g. the runtime's) in place.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("topic_digest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = AppConfig::load_default()?;
    let metrics = Metrics::init()?;

    let app = App::build(&cfg)?;
    // Background tasks run for the life of the process.
    let _tasks = app.start();

    let router = app.router().merge(metrics.router());
    Ok(router.into())
}
