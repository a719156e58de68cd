//! Tally daemon
//!
//! Runs the weekly scheduler and the REST API in one process.
//!
//! Run with: cargo run --bin tally [config.toml]
//!
//! # Configuration
//!
//! The config file is taken from the first argument, then `TALLY_CONFIG`,
//! then the default locations (see [`tally::config::Config::load_default`]).
//! `RUST_LOG` overrides `[logging] level`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use tally::config::{Config, LoggingConfig};
use tally::credentials::CredentialProvider;
use tally::pipeline::{Pipeline, RetryPolicy, Scheduler};
use tally::publish::Publisher;
use tally::storage::SummaryStore;
use tally::{api, build_sources, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("loading configuration")?;
    init_tracing(&config.logging);

    tracing::info!("Starting Tally v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Database: {}", config.storage.path);

    let store = Arc::new(
        SummaryStore::open(&PathBuf::from(&config.storage.path))
            .with_context(|| format!("opening database {}", config.storage.path))?,
    );

    let credentials = Arc::new(CredentialProvider::new(
        Arc::clone(&store),
        &config.credentials,
    ));
    let seeded = credentials.seed().context("seeding credentials")?;
    if seeded > 0 {
        tracing::info!("Stored {} configured credentials", seeded);
    }

    let sources = build_sources(&config);
    if sources.is_empty() {
        tracing::warn!("No sources enabled; weekly runs will do nothing");
    }
    for source in &sources {
        tracing::info!(source = %source.name(), family = %source.family(), "Source enabled");
    }

    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&credentials),
        Arc::clone(&store),
        RetryPolicy::from(&config.retry),
        Duration::from_secs(config.schedule.source_timeout_secs),
    ));

    let publisher = Arc::new(Publisher::from_config(
        Arc::clone(&store),
        &config.publish,
        Arc::clone(&credentials),
    ));

    let mut scheduler = Scheduler::new(pipeline, sources, config.schedule.clone());
    if config.publish.enabled {
        tracing::info!("Auto-publish enabled: {:?}", publisher.target_names());
        scheduler = scheduler.with_publisher(Arc::clone(&publisher));
    }
    let scheduler = Arc::new(scheduler);

    let handle = if config.schedule.enabled {
        if let Some(next) = scheduler.next_run_at(chrono::Utc::now()) {
            tracing::info!("Next weekly run at {}", next);
        }
        Some(Arc::clone(&scheduler).start())
    } else {
        tracing::info!("Weekly schedule disabled; runs only on request");
        None
    };

    let state = AppState::new(
        Arc::clone(&store),
        Arc::clone(&scheduler),
        publisher,
        config.api.clone(),
    );
    api::serve(state, &config.api)
        .await
        .context("running API server")?;

    scheduler.stop().await;
    if let Some(handle) = handle {
        handle.abort();
    }

    tracing::info!("Tally stopped");
    Ok(())
}

fn load_config() -> Result<Config, tally::ConfigError> {
    let explicit = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TALLY_CONFIG").ok())
        .map(PathBuf::from);

    match explicit {
        Some(path) => Config::load_with_env(&path),
        None => Ok(Config::load_default()),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tally={},tower_http=info", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
