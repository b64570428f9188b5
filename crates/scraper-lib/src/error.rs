//! Error types for the scrape pipeline

use thiserror::Error;

/// Failures that abort a scrape and reach the caller
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid label selector {key}={value:?}: {reason}")]
    InvalidSelector {
        key: String,
        value: String,
        reason: &'static str,
    },

    #[error("failed to list replicas in namespace {namespace}")]
    ListReplicas {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid scrape URL {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Failures fetching a proxy's metrics page
///
/// These never fail a scrape; the client turns them into a zero record.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to proxy failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("proxy returned HTTP {0}")]
    Status(u16),
}
