//! Social Sentiment Watcher — Binary Entrypoint
//! Wires config, the watermark store, collaborators, and the scheduler;
//! runs until ctrl-c.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use social_sentiment_watcher::classify::build_classifier;
use social_sentiment_watcher::engine::{AllowedHours, PollEngine};
use social_sentiment_watcher::feed::HttpFeedSource;
use social_sentiment_watcher::notify::build_sink;
use social_sentiment_watcher::{Config, Scheduler, SystemClock, WatermarkStore};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::load_default().context("loading configuration")?;

    if let Some(addr) = cfg.metrics_listen {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing prometheus exporter")?;
        tracing::info!(%addr, "metrics exporter listening");
    }

    // Corrupt state is fatal here: refusing to start beats guessing a
    // substitute watermark.
    let tracker =
        Arc::new(WatermarkStore::open(&cfg.state_file).context("loading watermark state")?);
    tracing::info!(
        state_file = %tracker.path().display(),
        watermark = ?tracker.last_seen().map(|t| t.to_rfc3339()),
        "watermark state loaded"
    );

    let feed = Arc::new(HttpFeedSource::new(cfg.statuses_url()));
    let classifier = build_classifier(&cfg).context("building classifier")?;
    let sink = build_sink(&cfg).context("building notification sink")?;
    let hours = AllowedHours {
        tz: cfg.tz()?,
        start_hour: cfg.poll_start_hour,
        end_hour: cfg.poll_end_hour,
    };

    let engine = Arc::new(PollEngine::new(
        feed,
        classifier,
        sink,
        Arc::clone(&tracker),
        Arc::new(SystemClock),
        hours,
    ));
    let scheduler = Scheduler::new(engine, Duration::from_secs(cfg.poll_interval_secs));
    scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    scheduler.stop().await;

    Ok(())
}
