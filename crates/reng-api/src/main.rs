use std::sync::Arc;
use std::time::Duration;

use reng_api::AppState;
use reng_gating::GatingEngine;
use reng_integration::{HookRegistry, IntegrationService, QueueSignalSource};
use reng_persistence::{Persistence, SlippageAnalyzer};
use reng_price_monitor::{PriceMonitor, StaticPriceFeed};
use reng_statistics::StatisticsCalculator;
use reng_tracker::Tracker;
use reng_types::EngineConfig;
use tokio::sync::watch;

/// Cycles between admission-loop metrics log lines (spec §4.7 — kept
/// modest so local runs get visibility without flooding logs).
const METRICS_LOG_INTERVAL_CYCLES: u64 = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = EngineConfig::from_env()?;
    let persistence = Persistence::connect(&config.database_url).await?;

    let gating = Arc::new(GatingEngine::new(config.clone()));

    // No real market-data feed ships with this engine; a concrete feed is
    // an integration concern left to the deployment, same as the teacher's
    // broker adapters are swapped in outside `risk-manager` itself.
    let price_feed = Arc::new(StaticPriceFeed::new());
    let price_monitor = Arc::new(PriceMonitor::new(
        price_feed,
        Duration::from_secs(config.price_cache_ttl_secs),
        Duration::from_secs(config.price_stale_window_secs),
    ));

    let statistics = Arc::new(StatisticsCalculator::new(
        persistence.clone(),
        Duration::from_secs(config.stats_cache_ttl_secs),
    ));

    let tracker = Arc::new(Tracker::new(
        persistence.clone(),
        price_monitor.clone(),
        statistics.clone(),
        config.clone(),
    ));
    tracker.rehydrate().await?;

    // Likewise, no real signal generator ships with this engine; the
    // periodic admission loop polls whatever `SignalSource` the deployment
    // wires in. `QueueSignalSource` here is an empty placeholder so the
    // loop has something to poll against in the meantime.
    let signal_source = Arc::new(QueueSignalSource::new());

    let integration = Arc::new(IntegrationService::new(
        persistence.clone(),
        gating.clone(),
        tracker.clone(),
        statistics.clone(),
        signal_source,
        HookRegistry::new(),
        config.clone(),
        METRICS_LOG_INTERVAL_CYCLES,
    ));
    integration.restore_metrics().await?;

    let slippage_analyzer = Arc::new(SlippageAnalyzer::new(persistence.clone(), &config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tracker_task = tokio::spawn(tracker.clone().run(shutdown_rx.clone()));
    let integration_task = tokio::spawn(integration.clone().run(shutdown_rx.clone()));
    let slippage_task = tokio::spawn(slippage_analyzer.run(shutdown_rx.clone()));

    let state = AppState {
        persistence,
        gating,
        tracker,
        statistics,
        price_monitor,
        integration,
        shutdown: shutdown_tx.clone(),
    };

    let addr: std::net::SocketAddr = std::env::var("RENG_API_BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    let server = reng_api::run_server(state, addr);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "http server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received, shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(tracker_task, integration_task, slippage_task);
    Ok(())
}
