//! Proxy-specific scrape endpoints
//!
//! Each supported sidecar exposes its stats on a fixed admin port. The
//! match patterns name the full metric plus the exact label string, which
//! is what keeps the line scanner in `exposition` free of false positives.

use crate::models::{Replica, WorkloadMetric};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Envoy admin port serving `/stats/prometheus`
pub const ENVOY_ADMIN_PORT: u16 = 15090;

/// Linkerd proxy admin port serving `/metrics`
pub const LINKERD_ADMIN_PORT: u16 = 4191;

/// Service port assumed when nothing else names one
pub const DEFAULT_SERVICE_PORT: &str = "80";

/// Sidecar proxy flavor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProxyFlavor {
    Envoy,
    Linkerd,
    /// Any other tag; scrapes for it are skipped
    Unrecognized(String),
}

impl ProxyFlavor {
    pub fn as_str(&self) -> &str {
        match self {
            ProxyFlavor::Envoy => "envoy",
            ProxyFlavor::Linkerd => "linkerd",
            ProxyFlavor::Unrecognized(tag) => tag,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ProxyFlavor::Unrecognized(_))
    }

    /// Build the scrape target for a replica reachable at `ip`
    pub fn scrape_target(
        &self,
        ip: &str,
        replica: &Replica,
        metric: &WorkloadMetric,
    ) -> ScrapeTarget {
        match self {
            ProxyFlavor::Envoy => {
                let port = resolve_service_port(metric, replica);
                let prefix = format!("{}_{}", ip, port);
                ScrapeTarget {
                    url: format!(
                        "http://{}:{}/stats/prometheus",
                        url_host(ip),
                        ENVOY_ADMIN_PORT
                    ),
                    total_pattern: format!(
                        "envoy_http_downstream_rq_total{{http_conn_manager_prefix=\"{}\"}}",
                        prefix
                    ),
                    active_pattern: format!(
                        "envoy_http_downstream_rq_active{{http_conn_manager_prefix=\"{}\"}}",
                        prefix
                    ),
                }
            }
            ProxyFlavor::Linkerd => ScrapeTarget {
                url: format!("http://{}:{}/metrics", url_host(ip), LINKERD_ADMIN_PORT),
                total_pattern: r#"request_handle_us_count{direction="inbound"}"#.to_string(),
                active_pattern: r#"tcp_open_connections{direction="inbound",peer="src",tls="no_identity",no_tls_reason="not_provided_by_remote"}"#.to_string(),
            },
            ProxyFlavor::Unrecognized(_) => ScrapeTarget::default(),
        }
    }
}

impl From<&str> for ProxyFlavor {
    fn from(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("envoy") {
            ProxyFlavor::Envoy
        } else if tag.eq_ignore_ascii_case("linkerd") {
            ProxyFlavor::Linkerd
        } else {
            ProxyFlavor::Unrecognized(tag.to_string())
        }
    }
}

impl From<String> for ProxyFlavor {
    fn from(tag: String) -> Self {
        ProxyFlavor::from(tag.as_str())
    }
}

impl From<ProxyFlavor> for String {
    fn from(flavor: ProxyFlavor) -> Self {
        flavor.as_str().to_string()
    }
}

impl fmt::Display for ProxyFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to scrape and which lines to pick out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeTarget {
    pub url: String,
    /// Substring identifying the cumulative request counter line
    pub total_pattern: String,
    /// Substring identifying the in-flight request line
    pub active_pattern: String,
}

impl ScrapeTarget {
    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
    }
}

/// Port the workload's connection manager listens on.
///
/// Resolution order: the `container-port` label, then the first port of
/// the container named after the workload, then `80`.
pub fn resolve_service_port(metric: &WorkloadMetric, replica: &Replica) -> String {
    if let Some(port) = metric.container_port() {
        return port.to_string();
    }

    replica
        .containers
        .iter()
        .find(|c| c.name == metric.name)
        .and_then(|c| c.ports.first())
        .map(|port| port.to_string())
        .unwrap_or_else(|| DEFAULT_SERVICE_PORT.to_string())
}

// IPv6 literals need brackets in a URL authority
fn url_host(ip: &str) -> String {
    if ip.contains(':') && !ip.starts_with('[') {
        format!("[{}]", ip)
    } else {
        ip.to_string()
    }
}
