//! Proxy Scraper - sidecar proxy metrics for request-based autoscaling
//!
//! Periodically scrapes the Envoy or Linkerd sidecar of one replica per
//! workload and turns its request counters into fleet-wide stat records.

use anyhow::{Context, Result};
use scraper_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    scrape::{HttpMetricsFetcher, KubeReplicaLister, ProxyScrapeClient, ScrapeLoopBuilder, ScrapeState},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SCRAPER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting proxy-scraper");

    let config = config::ScraperConfig::load()?;
    config.validate()?;
    info!(
        instance = %config.instance_name,
        proxy = %config.proxy_type,
        workloads = config.workloads.len(),
        "Scraper configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCRAPE_LOOP).await;
    health_registry.register(components::REPLICA_LISTER).await;

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(
        SCRAPER_VERSION,
        config.proxy_type.as_str(),
        config.workloads.len(),
    );

    let lister = Arc::new(
        KubeReplicaLister::try_default()
            .await
            .context("Failed to create Kubernetes client")?,
    );
    let fetcher = Arc::new(HttpMetricsFetcher::with_timeout(Duration::from_secs(
        config.scrape_timeout_secs,
    ))?);
    let state = Arc::new(ScrapeState::new());

    let clients = config.workloads.iter().map(|workload| {
        Arc::new(
            ProxyScrapeClient::new(
                Arc::new(workload.clone()),
                config.proxy_type.clone(),
                lister.clone(),
                fetcher.clone(),
            )
            .with_state(state.clone()),
        )
    });

    let (scrape_loop, mut stats_rx) = ScrapeLoopBuilder::new()
        .clients(clients)
        .interval(Duration::from_secs(config.scrape_interval_secs))
        .health(health_registry.clone())
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(scrape_loop.run(shutdown_rx));

    let stats_logger = logger.clone();
    tokio::spawn(async move {
        while let Some(stat) = stats_rx.recv().await {
            stats_logger.log_stat(&stat.workload, &stat.record);
        }
    });

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));

    health_registry.set_ready(true).await;

    // Start health and metrics server
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let api_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            Ok(())
        }
        served = &mut api_handle => {
            logger.log_shutdown("API server stopped");
            served
                .context("API server panicked")
                .and_then(|result| result.context("API server failed"))
        }
    };

    let _ = shutdown_tx.send(());
    loop_handle.await.context("Scrape loop panicked")?;
    api_handle.abort();

    api_result?;
    info!("Shutdown complete");
    Ok(())
}
