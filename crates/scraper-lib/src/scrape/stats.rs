//! Fleet-wide extrapolation of a single-replica sample

use super::{ExpositionSample, ScrapeState};
use crate::models::{StatRecord, SCRAPER_NAME};
use chrono::{DateTime, Utc};

/// Scale `sample` by the running-replica count and derive the request
/// delta for `key`, persisting the new extrapolated total in `state`.
pub fn assemble(
    sample: ExpositionSample,
    replica_count: usize,
    key: &str,
    state: &ScrapeState,
    timestamp: DateTime<Utc>,
) -> StatRecord {
    let factor = i64::try_from(replica_count).unwrap_or(i64::MAX);

    let extrapolated_total = sample.total_requests.saturating_mul(factor);
    let delta = state.record(key, extrapolated_total);

    StatRecord {
        timestamp,
        scraper: SCRAPER_NAME.to_string(),
        average_concurrent_requests: sample.active_requests.saturating_mul(factor) as f64,
        request_count: saturate_request_count(delta),
    }
}

fn saturate_request_count(delta: i64) -> i32 {
    i32::try_from(delta).unwrap_or(if delta < 0 { i32::MIN } else { i32::MAX })
}
