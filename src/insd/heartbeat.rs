//! Heartbeat tracking
//!
//! Every reading is a heartbeat. Nodes known from the registry are seeded
//! with their registration time so a node that never reports still ages.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct HeartbeatMonitor {
    last_seen: HashMap<String, i64>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a node without marking it alive. No-op if already tracked.
    pub fn register(&mut self, node_id: &str, now_ms: i64) {
        self.last_seen.entry(node_id.to_string()).or_insert(now_ms);
    }

    /// Record a heartbeat. Out-of-order timestamps never move `last_seen` back.
    pub fn beat(&mut self, node_id: &str, timestamp_ms: i64) {
        self.last_seen
            .entry(node_id.to_string())
            .and_modify(|t| *t = (*t).max(timestamp_ms))
            .or_insert(timestamp_ms);
    }

    pub fn last_seen(&self, node_id: &str) -> Option<i64> {
        self.last_seen.get(node_id).copied()
    }

    /// Milliseconds since the last heartbeat, 0 if the clock is behind it.
    pub fn elapsed_ms(&self, node_id: &str, now_ms: i64) -> Option<u64> {
        self.last_seen(node_id)
            .map(|t| u64::try_from(now_ms.saturating_sub(t)).unwrap_or(0))
    }

    /// Nodes silent for at least `timeout_ms`, sorted.
    pub fn silent_nodes(&self, now_ms: i64, timeout_ms: u64) -> Vec<String> {
        let mut ids: Vec<String> = self
            .last_seen
            .keys()
            .filter(|id| self.elapsed_ms(id, now_ms).is_some_and(|e| e >= timeout_ms))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &String> {
        self.last_seen.keys()
    }

    pub fn remove(&mut self, node_id: &str) {
        self.last_seen.remove(node_id);
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_and_elapsed() {
        let mut hb = HeartbeatMonitor::new();
        hb.beat("a", 1_000);
        assert_eq!(hb.elapsed_ms("a", 1_250), Some(250));
        assert_eq!(hb.elapsed_ms("missing", 1_250), None);
        assert_eq!(hb.elapsed_ms("a", 900), Some(0));
    }

    #[test]
    fn test_out_of_order_beat_is_ignored() {
        let mut hb = HeartbeatMonitor::new();
        hb.beat("a", 2_000);
        hb.beat("a", 1_500);
        assert_eq!(hb.last_seen("a"), Some(2_000));
    }

    #[test]
    fn test_register_does_not_override_beat() {
        let mut hb = HeartbeatMonitor::new();
        hb.beat("a", 5_000);
        hb.register("a", 0);
        hb.register("b", 0);
        assert_eq!(hb.last_seen("a"), Some(5_000));
        assert_eq!(hb.last_seen("b"), Some(0));
    }

    #[test]
    fn test_silent_nodes() {
        let mut hb = HeartbeatMonitor::new();
        hb.beat("b", 0);
        hb.beat("a", 0);
        hb.beat("c", 9_500);
        assert_eq!(hb.silent_nodes(10_000, 1_000), vec!["a", "b"]);
    }
}
