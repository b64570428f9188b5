//! Sidecar proxy scraping
//!
//! This module turns one replica's proxy metrics into a fleet-wide load
//! estimate. A scrape lists the workload's running replicas, picks one,
//! builds the proxy-specific metrics URL, fetches and parses the page and
//! extrapolates the sample by the running-replica count.

mod client;
mod delta;
mod discovery;
mod endpoint;
mod exposition;
mod r#loop;
mod stats;


pub use client::{HttpMetricsFetcher, ProxyScrapeClient};
pub use delta::ScrapeState;
pub use discovery::{select_replica, KubeReplicaLister, LabelSelector, ReplicaSelection};
pub use endpoint::{
    resolve_service_port, ProxyFlavor, ScrapeTarget, DEFAULT_SERVICE_PORT, ENVOY_ADMIN_PORT,
    LINKERD_ADMIN_PORT,
};
pub use exposition::{parse_exposition, ExpositionSample, PARSE_FAILURE_SAMPLE};
pub use r#loop::{ScrapeLoop, ScrapeLoopBuilder, ScrapeLoopConfig, WorkloadStat};
pub use stats::assemble;

use crate::error::FetchError;
use crate::models::Replica;
use anyhow::Result;
use url::Url;

pub use async_trait::async_trait;

/// Source of replicas for a workload
#[async_trait]
pub trait ReplicaLister: Send + Sync {
    /// List replicas in `namespace` whose labels satisfy `selector`
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Replica>>;
}

/// Transport used to fetch a proxy's metrics page
#[async_trait]
pub trait MetricsFetcher: Send + Sync {
    /// Perform one GET and return the plaintext body
    async fn fetch(&self, url: &Url) -> std::result::Result<String, FetchError>;
}
