//! Scrape client for one workload
//!
//! Runs the whole pipeline for a workload: list replicas, pick one, fetch
//! its proxy metrics, parse, extrapolate and compute the request delta.
//! "Nothing to measure" outcomes return a zero record instead of an error
//! so the autoscaler keeps receiving a steady stream of records.

use super::{
    assemble, parse_exposition, select_replica, LabelSelector, MetricsFetcher, ProxyFlavor,
    ReplicaLister, ScrapeState,
};
use crate::error::{FetchError, ScrapeError};
use crate::models::{StatRecord, WorkloadMetric};
use crate::observability::ScraperMetrics;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Fetches proxy metrics pages over HTTP
#[derive(Clone)]
pub struct HttpMetricsFetcher {
    client: Client,
}

impl HttpMetricsFetcher {
    /// Wrap an already configured client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a plain-HTTP client bounded by `timeout`
    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::new(client))
    }
}

#[async_trait]
impl MetricsFetcher for HttpMetricsFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

/// Scrapes one workload's sidecar proxies
pub struct ProxyScrapeClient {
    metric: Arc<WorkloadMetric>,
    flavor: ProxyFlavor,
    lister: Arc<dyn ReplicaLister>,
    fetcher: Arc<dyn MetricsFetcher>,
    state: Arc<ScrapeState>,
    metrics: ScraperMetrics,
}

impl ProxyScrapeClient {
    /// Create a client with its own scrape state
    pub fn new(
        metric: Arc<WorkloadMetric>,
        flavor: ProxyFlavor,
        lister: Arc<dyn ReplicaLister>,
        fetcher: Arc<dyn MetricsFetcher>,
    ) -> Self {
        Self {
            metric,
            flavor,
            lister,
            fetcher,
            state: Arc::new(ScrapeState::new()),
            metrics: ScraperMetrics::new(),
        }
    }

    /// Share scrape state with other clients
    pub fn with_state(mut self, state: Arc<ScrapeState>) -> Self {
        self.state = state;
        self
    }

    pub fn metric(&self) -> &WorkloadMetric {
        &self.metric
    }

    pub fn flavor(&self) -> &ProxyFlavor {
        &self.flavor
    }

    pub fn state(&self) -> &Arc<ScrapeState> {
        &self.state
    }

    /// Run one scrape cycle.
    ///
    /// Errors only for a bad selector, a failed replica listing or a
    /// malformed scrape URL. No running replica, an unreachable proxy or
    /// an unrecognized proxy flavor all yield a zero record and leave the
    /// scrape state untouched.
    pub async fn scrape(&self) -> Result<StatRecord, ScrapeError> {
        let start = Instant::now();
        let result = self.scrape_once().await;

        self.metrics
            .observe_scrape_latency(start.elapsed().as_secs_f64());
        match &result {
            Ok(record) => self.metrics.record_stat(&self.metric.key(), record),
            Err(_) => self.metrics.inc_scrape_errors(),
        }

        result
    }

    async fn scrape_once(&self) -> Result<StatRecord, ScrapeError> {
        let now = Utc::now();
        let key = self.metric.key();

        let selector = LabelSelector::for_workload(&self.metric)?;
        let replicas = self
            .lister
            .list(&self.metric.namespace, &selector)
            .await
            .map_err(|source| ScrapeError::ListReplicas {
                namespace: self.metric.namespace.clone(),
                source,
            })?;

        let Some(selection) = select_replica(&replicas) else {
            debug!(workload = %key, selector = %selector, "No running replicas");
            self.metrics.set_running_replicas(&key, 0);
            self.metrics.inc_empty_scrapes();
            return Ok(StatRecord::empty(now));
        };
        self.metrics
            .set_running_replicas(&key, selection.running as i64);

        let replica = selection.representative;
        let Some(ip) = replica.ip.as_deref() else {
            debug!(workload = %key, replica = %replica.name, "Representative replica has no IP yet");
            self.metrics.inc_empty_scrapes();
            return Ok(StatRecord::empty(now));
        };

        let target = self.flavor.scrape_target(ip, replica, &self.metric);
        if target.is_empty() {
            warn!(workload = %key, proxy = %self.flavor, "Unrecognized proxy flavor, skipping scrape");
            self.metrics.inc_empty_scrapes();
            return Ok(StatRecord::empty(now));
        }

        let url = Url::parse(&target.url).map_err(|source| ScrapeError::InvalidUrl {
            url: target.url.clone(),
            source,
        })?;

        let body = match self.fetcher.fetch(&url).await {
            Ok(body) => body,
            Err(e) => {
                debug!(workload = %key, url = %url, error = %e, "Proxy metrics fetch failed");
                self.metrics.inc_fetch_failures();
                return Ok(StatRecord::empty(now));
            }
        };

        let sample = parse_exposition(&body, &target.total_pattern, &target.active_pattern);
        let record = assemble(sample, selection.running, &key, &self.state, now);

        debug!(
            workload = %key,
            replica = %replica.name,
            running = selection.running,
            total_sample = sample.total_requests,
            active_sample = sample.active_requests,
            request_count = record.request_count,
            "Scraped proxy metrics"
        );
        Ok(record)
    }
}
