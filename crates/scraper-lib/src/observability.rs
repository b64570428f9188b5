//! Observability infrastructure for the proxy scraper
//!
//! Provides:
//! - Prometheus metrics (scrape latency, failure counters, per-workload load estimates)
//! - Structured JSON logging with tracing

use crate::models::StatRecord;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_gauge,
    register_int_gauge_vec, GaugeVec, Histogram, IntCounter, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for scrape latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScraperMetricsInner> = OnceLock::new();

struct ScraperMetricsInner {
    scrape_latency_seconds: Histogram,
    scrapes: IntCounter,
    scrape_errors: IntCounter,
    fetch_failures: IntCounter,
    empty_scrapes: IntCounter,
    workloads_tracked: IntGauge,
    running_replicas: IntGaugeVec,
    request_count: IntGaugeVec,
    average_concurrent_requests: GaugeVec,
}

impl ScraperMetricsInner {
    fn new() -> Self {
        Self {
            scrape_latency_seconds: register_histogram!(
                "proxy_scraper_scrape_latency_seconds",
                "Time spent on one workload scrape, discovery through parsing",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register scrape_latency_seconds"),

            scrapes: register_int_counter!(
                "proxy_scraper_scrapes_total",
                "Total number of workload scrapes attempted"
            )
            .expect("Failed to register scrapes_total"),

            scrape_errors: register_int_counter!(
                "proxy_scraper_scrape_errors_total",
                "Scrapes that failed with an error returned to the caller"
            )
            .expect("Failed to register scrape_errors_total"),

            fetch_failures: register_int_counter!(
                "proxy_scraper_fetch_failures_total",
                "Proxy metrics fetches that failed and produced a zero record"
            )
            .expect("Failed to register fetch_failures_total"),

            empty_scrapes: register_int_counter!(
                "proxy_scraper_empty_scrapes_total",
                "Scrapes with no scrapeable replica that produced a zero record"
            )
            .expect("Failed to register empty_scrapes_total"),

            workloads_tracked: register_int_gauge!(
                "proxy_scraper_workloads_tracked",
                "Number of workloads in the scrape loop"
            )
            .expect("Failed to register workloads_tracked"),

            running_replicas: register_int_gauge_vec!(
                "proxy_scraper_running_replicas",
                "Running replicas seen on the last scrape",
                &["workload"]
            )
            .expect("Failed to register running_replicas"),

            request_count: register_int_gauge_vec!(
                "proxy_scraper_request_count",
                "Requests since the previous scrape, extrapolated to all replicas",
                &["workload"]
            )
            .expect("Failed to register request_count"),

            average_concurrent_requests: register_gauge_vec!(
                "proxy_scraper_average_concurrent_requests",
                "In-flight requests, extrapolated to all replicas",
                &["workload"]
            )
            .expect("Failed to register average_concurrent_requests"),
        }
    }
}

/// Scraper metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ScraperMetrics {
    _private: (),
}

impl Default for ScraperMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScraperMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScraperMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScraperMetricsInner {
        GLOBAL_METRICS.get_or_init(ScraperMetricsInner::new)
    }

    pub fn observe_scrape_latency(&self, duration_secs: f64) {
        self.inner().scrapes.inc();
        self.inner().scrape_latency_seconds.observe(duration_secs);
    }

    pub fn inc_scrape_errors(&self) {
        self.inner().scrape_errors.inc();
    }

    pub fn inc_fetch_failures(&self) {
        self.inner().fetch_failures.inc();
    }

    pub fn inc_empty_scrapes(&self) {
        self.inner().empty_scrapes.inc();
    }

    pub fn set_workloads_tracked(&self, count: i64) {
        self.inner().workloads_tracked.set(count);
    }

    pub fn set_running_replicas(&self, workload: &str, count: i64) {
        self.inner()
            .running_replicas
            .with_label_values(&[workload])
            .set(count);
    }

    /// Publish the latest estimate for a workload
    pub fn record_stat(&self, workload: &str, record: &StatRecord) {
        self.inner()
            .request_count
            .with_label_values(&[workload])
            .set(i64::from(record.request_count));
        self.inner()
            .average_concurrent_requests
            .with_label_values(&[workload])
            .set(record.average_concurrent_requests);
    }
}

/// Structured logger for scraper events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a stat record handed to the autoscaler
    pub fn log_stat(&self, workload: &str, record: &StatRecord) {
        info!(
            event = "stat_produced",
            instance = %self.instance,
            workload = %workload,
            scraper = %record.scraper,
            timestamp = %record.timestamp.to_rfc3339(),
            average_concurrent_requests = record.average_concurrent_requests,
            request_count = record.request_count,
            "Produced load estimate"
        );
    }

    /// Log a scrape that failed hard
    pub fn log_scrape_error(&self, workload: &str, error: &(dyn std::error::Error + 'static)) {
        warn!(
            event = "scrape_failed",
            instance = %self.instance,
            workload = %workload,
            error = %error,
            "Scrape failed"
        );
    }

    pub fn log_startup(&self, version: &str, proxy: &str, workloads: usize) {
        info!(
            event = "scraper_started",
            instance = %self.instance,
            scraper_version = %version,
            proxy = %proxy,
            workloads = workloads,
            "Proxy scraper started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scraper_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Proxy scraper shutting down"
        );
    }
}
