//! Core data models for the proxy scraper

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity tag stamped on every record this scraper produces
pub const SCRAPER_NAME: &str = "service-scraper";

/// Label keys read from a workload descriptor
pub mod labels {
    pub const APP: &str = "app";
    pub const VERSION: &str = "version";
    pub const CONTAINER_PORT: &str = "container-port";
}

/// Workload whose sidecar proxies are scraped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadMetric {
    pub namespace: String,
    pub name: String,
    /// Must carry `app` and `version`; may carry `container-port`
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl WorkloadMetric {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: HashMap::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Key used for per-workload scrape state (`namespace/name`)
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Label value, or the empty string when absent
    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }

    /// Explicit service port hint, if set and non-empty
    pub fn container_port(&self) -> Option<&str> {
        Some(self.label(labels::CONTAINER_PORT)).filter(|p| !p.is_empty())
    }
}

/// Lifecycle phase of a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl ReplicaPhase {
    /// Map a Kubernetes pod phase string
    pub fn from_phase(phase: &str) -> Self {
        match phase {
            "Pending" => ReplicaPhase::Pending,
            "Running" => ReplicaPhase::Running,
            "Succeeded" => ReplicaPhase::Succeeded,
            "Failed" => ReplicaPhase::Failed,
            _ => ReplicaPhase::Unknown,
        }
    }
}

/// Container declared by a replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    /// Declared container ports, in declaration order
    pub ports: Vec<i32>,
}

/// One discovered instance of a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub name: String,
    pub phase: ReplicaPhase,
    pub ip: Option<String>,
    pub labels: HashMap<String, String>,
    pub containers: Vec<ContainerSpec>,
}

impl Replica {
    pub fn is_running(&self) -> bool {
        self.phase == ReplicaPhase::Running
    }
}

/// Load estimate handed to the autoscaler for one scrape cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub timestamp: DateTime<Utc>,
    pub scraper: String,
    pub average_concurrent_requests: f64,
    /// Requests since the previous scrape; negative after a counter reset
    pub request_count: i32,
}

impl StatRecord {
    /// Zero-valued record used when there is nothing to measure
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            scraper: SCRAPER_NAME.to_string(),
            average_concurrent_requests: 0.0,
            request_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.average_concurrent_requests == 0.0 && self.request_count == 0
    }
}
