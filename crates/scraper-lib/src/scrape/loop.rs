//! Periodic scrape loop
//!
//! Scrapes every tracked workload once per interval, in parallel, and
//! forwards the resulting records to the autoscaler over a channel.

use super::ProxyScrapeClient;
use crate::error::ScrapeError;
use crate::health::{components, HealthRegistry};
use crate::models::StatRecord;
use crate::observability::{ScraperMetrics, StructuredLogger};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the scrape loop
#[derive(Debug, Clone)]
pub struct ScrapeLoopConfig {
    /// Time between scrape cycles (default: 1 second)
    pub interval: Duration,
    /// Channel buffer size for produced records
    pub buffer_size: usize,
}

impl Default for ScrapeLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            buffer_size: 1000,
        }
    }
}

/// A record tagged with the workload it describes
#[derive(Debug, Clone)]
pub struct WorkloadStat {
    pub workload: String,
    pub record: StatRecord,
}

/// Scrape loop over a fixed set of workloads
pub struct ScrapeLoop {
    clients: Vec<Arc<ProxyScrapeClient>>,
    config: ScrapeLoopConfig,
    stats_tx: mpsc::Sender<WorkloadStat>,
    health: Option<HealthRegistry>,
    logger: StructuredLogger,
}

impl ScrapeLoop {
    pub fn new(
        clients: Vec<Arc<ProxyScrapeClient>>,
        config: ScrapeLoopConfig,
    ) -> (Self, mpsc::Receiver<WorkloadStat>) {
        let (stats_tx, stats_rx) = mpsc::channel(config.buffer_size);

        ScraperMetrics::new().set_workloads_tracked(clients.len() as i64);

        let loop_instance = Self {
            clients,
            config,
            stats_tx,
            health: None,
            logger: StructuredLogger::new("scrape-loop"),
        };

        (loop_instance, stats_rx)
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            workloads = self.clients.len(),
            "Starting scrape loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let results = self.scrape_all().await;

                    debug!(
                        succeeded = results.success_count,
                        failed = results.error_count,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Scrape cycle complete"
                    );

                    self.report_health(&results).await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scrape loop");
                    break;
                }
            }
        }
    }

    /// Scrape every workload once, concurrently
    async fn scrape_all(&self) -> CycleResults {
        let mut tasks = JoinSet::new();
        for client in &self.clients {
            let client = client.clone();
            tasks.spawn(async move {
                let workload = client.metric().key();
                (workload, client.scrape().await)
            });
        }

        let mut results = CycleResults::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((workload, Ok(record))) => {
                    results.success_count += 1;
                    if let Err(e) = self.stats_tx.send(WorkloadStat { workload, record }).await {
                        warn!(error = %e, "Failed to send stat record to channel");
                    }
                }
                Ok((workload, Err(e))) => {
                    results.error_count += 1;
                    if matches!(e, ScrapeError::ListReplicas { .. }) {
                        results.listing_errors += 1;
                    }
                    self.logger.log_scrape_error(&workload, &e);
                }
                Err(e) => {
                    results.error_count += 1;
                    warn!(error = %e, "Scrape task did not complete");
                }
            }
        }

        results
    }

    async fn report_health(&self, results: &CycleResults) {
        let Some(health) = &self.health else {
            return;
        };

        if results.listing_errors == 0 {
            health.set_healthy(components::REPLICA_LISTER).await;
        } else {
            health
                .set_unhealthy(
                    components::REPLICA_LISTER,
                    format!("Replica listing failed for {} workloads", results.listing_errors),
                )
                .await;
        }

        let total = results.success_count + results.error_count;
        if results.error_count == 0 {
            health.set_healthy(components::SCRAPE_LOOP).await;
        } else if results.success_count == 0 {
            health
                .set_unhealthy(components::SCRAPE_LOOP, "All workload scrapes failed")
                .await;
        } else {
            health
                .set_degraded(
                    components::SCRAPE_LOOP,
                    format!("{} of {} workload scrapes failed", results.error_count, total),
                )
                .await;
        }
    }
}

/// Results from a scrape cycle
#[derive(Debug, Default)]
struct CycleResults {
    success_count: usize,
    error_count: usize,
    listing_errors: usize,
}

/// Builder for creating the scrape loop
pub struct ScrapeLoopBuilder {
    clients: Vec<Arc<ProxyScrapeClient>>,
    config: ScrapeLoopConfig,
    health: Option<HealthRegistry>,
}

impl ScrapeLoopBuilder {
    pub fn new() -> Self {
        Self {
            clients: Vec::new(),
            config: ScrapeLoopConfig::default(),
            health: None,
        }
    }

    /// Add a workload client
    pub fn client(mut self, client: Arc<ProxyScrapeClient>) -> Self {
        self.clients.push(client);
        self
    }

    /// Add several workload clients
    pub fn clients(mut self, clients: impl IntoIterator<Item = Arc<ProxyScrapeClient>>) -> Self {
        self.clients.extend(clients);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Report cycle outcomes to a health registry
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<(ScrapeLoop, mpsc::Receiver<WorkloadStat>)> {
        if self.clients.is_empty() {
            anyhow::bail!("At least one workload is required");
        }
        if self.config.interval.is_zero() {
            anyhow::bail!("Scrape interval must be positive");
        }
        if self.config.buffer_size == 0 {
            anyhow::bail!("Buffer size must be positive");
        }

        let (mut scrape_loop, rx) = ScrapeLoop::new(self.clients, self.config);
        scrape_loop.health = self.health;
        Ok((scrape_loop, rx))
    }
}

impl Default for ScrapeLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
