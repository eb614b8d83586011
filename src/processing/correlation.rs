//! Cross-node correlation
//!
//! A seismic event shakes many buildings at once; a single node spiking on
//! its own is more likely local (a truck, a door). Correlation looks at the
//! latest filtered magnitude of every node and counts how many crossed the
//! threshold within the last few hundred milliseconds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::CorrelationConfig;

/// Latest filtered magnitude seen from one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecentReading {
    pub magnitude: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub is_correlated: bool,
    /// Qualifying node ids, sorted
    pub correlated_nodes: Vec<String>,
    pub event_id: Option<String>,
}

impl CorrelationResult {
    pub fn includes(&self, node_id: &str) -> bool {
        self.is_correlated && self.correlated_nodes.iter().any(|n| n == node_id)
    }
}

/// Shared node → latest reading map.
///
/// Each new reading overwrites its node's entry. Entries older than
/// `stale_after_ms` are purged on every access.
#[derive(Debug, Clone, Default)]
pub struct RecentReadings {
    entries: BTreeMap<String, RecentReading>,
}

impl RecentReadings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node_id: &str, magnitude: f64, timestamp_ms: i64) {
        self.entries.insert(
            node_id.to_string(),
            RecentReading {
                magnitude,
                timestamp_ms,
            },
        );
    }

    /// Drop entries older than `max_age_ms` relative to `now_ms`.
    pub fn clear_old_readings(&mut self, now_ms: i64, max_age_ms: u64) {
        let max_age = i64::try_from(max_age_ms).unwrap_or(i64::MAX);
        self.entries
            .retain(|_, r| now_ms.saturating_sub(r.timestamp_ms) <= max_age);
    }

    pub fn get(&self, node_id: &str) -> Option<&RecentReading> {
        self.entries.get(node_id)
    }

    pub fn remove(&mut self, node_id: &str) {
        self.entries.remove(node_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RecentReading)> {
        self.entries.iter()
    }
}

/// Stateless correlation check over `recent` at time `now_ms`.
///
/// A node qualifies when `now - ts <= window_ms` and
/// `magnitude >= threshold_g`. The event is correlated when at least
/// `min_nodes` qualify; the event id is `event_<now_ms>`.
pub fn check_correlation(
    recent: &RecentReadings,
    now_ms: i64,
    threshold_g: f64,
    window_ms: u64,
    min_nodes: usize,
) -> CorrelationResult {
    let window = i64::try_from(window_ms).unwrap_or(i64::MAX);
    let correlated_nodes: Vec<String> = recent
        .iter()
        .filter(|(_, r)| {
            now_ms.saturating_sub(r.timestamp_ms) <= window && r.magnitude >= threshold_g
        })
        .map(|(id, _)| id.clone())
        .collect();

    let is_correlated = correlated_nodes.len() >= min_nodes;
    CorrelationResult {
        is_correlated,
        event_id: is_correlated.then(|| format!("event_{now_ms}")),
        correlated_nodes,
    }
}

/// Purge stale entries, then run `check_correlation` with configured values.
pub fn correlate(
    recent: &mut RecentReadings,
    now_ms: i64,
    config: &CorrelationConfig,
) -> CorrelationResult {
    recent.clear_old_readings(now_ms, config.stale_after_ms);
    check_correlation(
        recent,
        now_ms,
        config.threshold_g,
        config.window_ms,
        config.min_nodes,
    )
}
