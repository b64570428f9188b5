//! Sidecar proxy scraping for request-based autoscaling
//!
//! This crate provides the core functionality for:
//! - Replica discovery and selection via label selectors
//! - Envoy and Linkerd metrics endpoint construction
//! - Parsing request counters out of proxy metrics pages
//! - Per-workload request deltas and fleet-wide extrapolation
//! - Health checks and observability

pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod scrape;

pub use error::{FetchError, ScrapeError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScraperMetrics, StructuredLogger};
