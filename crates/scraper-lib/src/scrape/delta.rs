//! Per-workload cumulative request counters

use dashmap::DashMap;
use tracing::debug;

/// Last extrapolated request total seen for each workload key
///
/// Entries are created on a workload's first successful scrape and are
/// never removed. Updates to one key are atomic; different keys do not
/// contend beyond sharing a shard.
#[derive(Debug, Default)]
pub struct ScrapeState {
    counters: DashMap<String, i64>,
}

impl ScrapeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for `key` and return how far it moved since the last
    /// call. An unseen key starts from 0. A decrease is returned as a
    /// negative delta and still overwrites the stored value.
    pub fn record(&self, key: &str, value: i64) -> i64 {
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        let delta = value.saturating_sub(*entry);
        *entry = value;

        if delta < 0 {
            debug!(workload = %key, value, delta, "Request counter went backwards");
        }

        delta
    }

    /// Last stored value for a workload
    pub fn last(&self, key: &str) -> Option<i64> {
        self.counters.get(key).map(|v| *v)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}
