//! Scraper configuration

use anyhow::{Context, Result};
use scraper_lib::models::WorkloadMetric;
use scraper_lib::scrape::ProxyFlavor;
use serde::Deserialize;
use tracing::warn;

const DEFAULT_CONFIG_FILE: &str = "/etc/proxy-scraper/config";

/// Scraper configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Instance name from Kubernetes downward API
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Sidecar flavor running next to every workload (`envoy` or `linkerd`)
    #[serde(default = "default_proxy_type")]
    pub proxy_type: ProxyFlavor,

    /// Time between scrape cycles in seconds
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval_secs: u64,

    /// Deadline for one proxy metrics fetch in seconds
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,

    /// Workloads to scrape
    #[serde(default)]
    pub workloads: Vec<WorkloadMetric>,
}

fn default_instance_name() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "proxy-scraper".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_proxy_type() -> ProxyFlavor {
    ProxyFlavor::Envoy
}

fn default_scrape_interval() -> u64 {
    1
}

fn default_scrape_timeout() -> u64 {
    3
}

impl ScraperConfig {
    /// Load configuration from the config file and `SCRAPER_*` environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("SCRAPER_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());

        let builder = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("SCRAPER"));

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let config = builder
            .build()
            .context("Failed to read scraper configuration")?;

        config
            .try_deserialize()
            .context("Invalid scraper configuration")
    }

    /// Reject configurations the scraper cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workloads.is_empty() {
            anyhow::bail!("No workloads configured");
        }
        if self.scrape_interval_secs == 0 {
            anyhow::bail!("scrape_interval_secs must be positive");
        }
        if self.scrape_timeout_secs == 0 {
            anyhow::bail!("scrape_timeout_secs must be positive");
        }
        if !self.proxy_type.is_recognized() {
            warn!(
                proxy = %self.proxy_type,
                "Unrecognized proxy type, every scrape will produce zero records"
            );
        }
        Ok(())
    }
}
