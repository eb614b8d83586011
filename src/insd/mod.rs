//! Implicit Node Silence Detection (INSD)
//!
//! A node that stopped talking cannot be asked whether it is still standing.
//! INSD answers from the neighborhood instead: did the neighbors feel an
//! event, has the node been silent long enough, and did the neighbors see
//! something structurally abnormal?
//!
//! ## Stages
//!
//! 1. **Event correlation**: at least `n_min` neighbors reported a
//!    correlated event, with intensity `>= event_threshold_g`.
//! 2. **Heartbeat continuity**: the node has been silent for at least
//!    `heartbeat_timeout_ms`.
//! 3. **Neighborhood anomaly**: the worst neighbor damage score is at least
//!    `anomaly_threshold`, or a neighbor flagged a stiffness shift.
//!
//! ## Decision
//!
//! | Stage 1 | Stage 2 | Stage 3 | Decision |
//! |---------|---------|---------|----------|
//! | T | T | T | `ProbableCollapse` |
//! | T | T | F | `SilentUnderReview` |
//! | otherwise ||| `NoConfirmedFailure` |

mod heartbeat;
mod neighborhood;

pub use heartbeat::HeartbeatMonitor;
pub use neighborhood::{haversine_m, Neighborhood};

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{InsdThresholds, NeighborhoodConfig};
use crate::types::Node;

// ============================================================================
// Decision Logic
// ============================================================================

/// Outcome of the three INSD stages for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsdStages {
    pub event_correlation: bool,
    pub heartbeat_lost: bool,
    pub neighborhood_anomaly: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsdDecision {
    NoConfirmedFailure,
    SilentUnderReview,
    ProbableCollapse,
}

impl std::fmt::Display for InsdDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsdDecision::NoConfirmedFailure => write!(f, "NO_CONFIRMED_FAILURE"),
            InsdDecision::SilentUnderReview => write!(f, "SILENT_UNDER_REVIEW"),
            InsdDecision::ProbableCollapse => write!(f, "PROBABLE_COLLAPSE"),
        }
    }
}

/// Pure classification over the three stage booleans.
pub fn decide(stages: InsdStages) -> InsdDecision {
    match (stages.event_correlation, stages.heartbeat_lost, stages.neighborhood_anomaly) {
        (true, true, true) => InsdDecision::ProbableCollapse,
        (true, true, false) => InsdDecision::SilentUnderReview,
        _ => InsdDecision::NoConfirmedFailure,
    }
}

/// Neighborhood evidence gathered for one candidate node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodEvidence {
    /// Neighbors with a correlated event inside the event memory
    pub reporting_neighbors: usize,
    /// Strongest event magnitude among reporting neighbors (g)
    pub event_intensity_g: f64,
    /// Time since the candidate's last heartbeat (ms)
    pub heartbeat_elapsed_ms: u64,
    /// Worst recent neighbor damage score (0-100)
    pub neighbor_anomaly: f64,
    /// A neighbor saw its frequency drop past the stiffness threshold
    pub stiffness_flag: bool,
}

pub fn evaluate_stages(evidence: &NeighborhoodEvidence, thresholds: &InsdThresholds) -> InsdStages {
    InsdStages {
        event_correlation: evidence.reporting_neighbors >= thresholds.n_min
            && evidence.event_intensity_g >= thresholds.event_threshold_g,
        heartbeat_lost: evidence.heartbeat_elapsed_ms >= thresholds.heartbeat_timeout_ms,
        neighborhood_anomaly: evidence.neighbor_anomaly >= thresholds.anomaly_threshold
            || evidence.stiffness_flag,
    }
}

// ============================================================================
// Liveness State
// ============================================================================

/// Externally observed state of a node, re-evaluated on every check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeLiveness {
    #[default]
    Normal,
    ActivelyReporting,
    Silent,
    SilentUnderReview,
    ProbableCollapse,
}

impl std::fmt::Display for NodeLiveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeLiveness::Normal => write!(f, "NORMAL"),
            NodeLiveness::ActivelyReporting => write!(f, "ACTIVELY_REPORTING"),
            NodeLiveness::Silent => write!(f, "SILENT"),
            NodeLiveness::SilentUnderReview => write!(f, "SILENT_UNDER_REVIEW"),
            NodeLiveness::ProbableCollapse => write!(f, "PROBABLE_COLLAPSE"),
        }
    }
}

/// Result of one silence check for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsdAssessment {
    pub node_id: String,
    pub liveness: NodeLiveness,
    /// `None` when INSD thresholds are not configured
    pub decision: Option<InsdDecision>,
    pub stages: InsdStages,
    pub evidence: NeighborhoodEvidence,
}

// ============================================================================
// Silence Detector
// ============================================================================

/// Running maximum of a value over a sliding time window.
///
/// Entries are kept in decreasing value order, so the first entry still
/// inside the window is the window's peak. The newest sample always stays
/// at the back: a node that reported recently is never hidden behind an
/// older, larger peak that has aged out.
#[derive(Debug, Clone, Default, PartialEq)]
struct WindowPeak {
    entries: VecDeque<(i64, f64)>,
}

impl WindowPeak {
    fn push(&mut self, value: f64, timestamp_ms: i64, memory_ms: i64) {
        while self.entries.back().is_some_and(|&(_, v)| v <= value) {
            self.entries.pop_back();
        }
        self.entries.push_back((timestamp_ms, value));
        while self
            .entries
            .front()
            .is_some_and(|&(ts, _)| timestamp_ms.saturating_sub(ts) > memory_ms)
        {
            self.entries.pop_front();
        }
    }

    /// Peak over samples no older than `memory_ms` at `now_ms`, `None` if
    /// nothing was recorded inside the window.
    fn within(&self, now_ms: i64, memory_ms: i64) -> Option<f64> {
        self.entries
            .iter()
            .find(|&&(ts, _)| now_ms.saturating_sub(ts) <= memory_ms)
            .map(|&(_, value)| value)
    }
}

/// What the detector remembers about one node's recent behavior.
#[derive(Debug, Clone, Default, PartialEq)]
struct NodeEvidence {
    /// Correlated events this node took part in
    event: WindowPeak,
    damage: WindowPeak,
    frequency_shift: WindowPeak,
}

/// Owns heartbeats, topology and per-node evidence; evaluates INSD for all
/// tracked nodes on demand.
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    heartbeats: HeartbeatMonitor,
    neighborhood: Neighborhood,
    evidence: HashMap<String, NodeEvidence>,
    last_liveness: HashMap<String, NodeLiveness>,
    config: NeighborhoodConfig,
    thresholds: Option<InsdThresholds>,
}

impl SilenceDetector {
    pub fn new(config: &NeighborhoodConfig, thresholds: Option<InsdThresholds>) -> Self {
        if thresholds.is_none() {
            warn!("No [insd] thresholds configured, silence detection only tracks heartbeats");
        }
        Self {
            heartbeats: HeartbeatMonitor::new(),
            neighborhood: Neighborhood::new(config.radius_m),
            evidence: HashMap::new(),
            last_liveness: HashMap::new(),
            config: config.clone(),
            thresholds,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.thresholds.is_some()
    }

    pub fn thresholds(&self) -> Option<&InsdThresholds> {
        self.thresholds.as_ref()
    }

    /// Register the monitored node set and rebuild the neighbor table.
    pub fn register_nodes(&mut self, nodes: &[Node], now_ms: i64) {
        self.neighborhood.rebuild(nodes);
        for node in nodes {
            self.heartbeats.register(&node.id, now_ms);
        }
        info!(
            nodes = nodes.len(),
            radius_m = self.neighborhood.radius_m(),
            "Neighbor topology built"
        );
    }

    pub fn heartbeat(&mut self, node_id: &str, timestamp_ms: i64) {
        self.heartbeats.beat(node_id, timestamp_ms);
    }

    /// Remember the latest processed evidence for a node.
    pub fn record(
        &mut self,
        node_id: &str,
        timestamp_ms: i64,
        correlated_magnitude: Option<f64>,
        damage_score: f64,
        frequency_shift: f64,
    ) {
        let memory = self.memory_ms();
        let entry = self.evidence.entry(node_id.to_string()).or_default();
        if let Some(magnitude) = correlated_magnitude {
            entry.event.push(magnitude, timestamp_ms, memory);
        }
        entry.damage.push(damage_score, timestamp_ms, memory);
        entry.frequency_shift.push(frequency_shift, timestamp_ms, memory);
    }

    /// Gather neighborhood evidence for `node_id` at `now_ms`.
    pub fn gather_evidence(&self, node_id: &str, now_ms: i64) -> NeighborhoodEvidence {
        let memory = self.memory_ms();
        let mut evidence = NeighborhoodEvidence {
            heartbeat_elapsed_ms: self.heartbeats.elapsed_ms(node_id, now_ms).unwrap_or(0),
            ..NeighborhoodEvidence::default()
        };

        for neighbor in self.neighborhood.neighbors_of(node_id) {
            let Some(record) = self.evidence.get(neighbor) else {
                continue;
            };
            if let Some(intensity) = record.event.within(now_ms, memory) {
                evidence.reporting_neighbors += 1;
                evidence.event_intensity_g = evidence.event_intensity_g.max(intensity);
            }
            if let Some(score) = record.damage.within(now_ms, memory) {
                evidence.neighbor_anomaly = evidence.neighbor_anomaly.max(score);
            }
            if record
                .frequency_shift
                .within(now_ms, memory)
                .is_some_and(|shift| shift >= self.config.stiffness_shift_percent)
            {
                evidence.stiffness_flag = true;
            }
        }
        evidence
    }

    /// Evaluate one node.
    pub fn assess(&self, node_id: &str, now_ms: i64) -> InsdAssessment {
        let evidence = self.gather_evidence(node_id, now_ms);
        let (stages, decision) = match &self.thresholds {
            Some(t) => {
                let stages = evaluate_stages(&evidence, t);
                (stages, Some(decide(stages)))
            }
            None => (InsdStages::default(), None),
        };

        let silent = evidence.heartbeat_elapsed_ms >= self.config.silence_grace_ms;
        let own_event = self
            .evidence
            .get(node_id)
            .and_then(|e| e.event.within(now_ms, self.memory_ms()))
            .is_some();

        let liveness = match decision {
            Some(InsdDecision::ProbableCollapse) => NodeLiveness::ProbableCollapse,
            Some(InsdDecision::SilentUnderReview) => NodeLiveness::SilentUnderReview,
            _ if silent => NodeLiveness::Silent,
            _ if own_event => NodeLiveness::ActivelyReporting,
            _ => NodeLiveness::Normal,
        };

        InsdAssessment {
            node_id: node_id.to_string(),
            liveness,
            decision,
            stages,
            evidence,
        }
    }

    /// Evaluate every tracked node, sorted by id. Logs state changes.
    pub fn check_all(&mut self, now_ms: i64) -> Vec<InsdAssessment> {
        let mut ids: Vec<String> = self.heartbeats.node_ids().cloned().collect();
        ids.sort();

        let assessments: Vec<InsdAssessment> =
            ids.iter().map(|id| self.assess(id, now_ms)).collect();

        for a in &assessments {
            let previous = self
                .last_liveness
                .insert(a.node_id.clone(), a.liveness)
                .unwrap_or_default();
            if previous == a.liveness {
                continue;
            }
            match a.liveness {
                NodeLiveness::ProbableCollapse | NodeLiveness::SilentUnderReview => warn!(
                    node = %a.node_id,
                    from = %previous,
                    to = %a.liveness,
                    reporting_neighbors = a.evidence.reporting_neighbors,
                    intensity_g = a.evidence.event_intensity_g,
                    silent_ms = a.evidence.heartbeat_elapsed_ms,
                    neighbor_anomaly = a.evidence.neighbor_anomaly,
                    "INSD escalation"
                ),
                _ => info!(
                    node = %a.node_id,
                    from = %previous,
                    to = %a.liveness,
                    "Node liveness changed"
                ),
            }
        }
        assessments
    }

    pub fn liveness(&self, node_id: &str) -> NodeLiveness {
        self.last_liveness.get(node_id).copied().unwrap_or_default()
    }

    pub fn heartbeats(&self) -> &HeartbeatMonitor {
        &self.heartbeats
    }

    pub fn neighborhood(&self) -> &Neighborhood {
        &self.neighborhood
    }

    /// Forget one node's heartbeat and evidence. Topology is kept.
    pub fn reset_node(&mut self, node_id: &str, now_ms: i64) {
        self.evidence.remove(node_id);
        self.last_liveness.remove(node_id);
        self.heartbeats.remove(node_id);
        if self.neighborhood.contains(node_id) {
            self.heartbeats.register(node_id, now_ms);
        }
    }

    /// Forget all evidence and restart heartbeat clocks for known nodes at `now_ms`.
    pub fn reset(&mut self, now_ms: i64) {
        self.evidence.clear();
        self.last_liveness.clear();
        let ids: Vec<String> = self.heartbeats.node_ids().cloned().collect();
        self.heartbeats.clear();
        for id in ids.iter().filter(|id| self.neighborhood.contains(id)) {
            self.heartbeats.register(id, now_ms);
        }
    }

    fn memory_ms(&self) -> i64 {
        i64::try_from(self.config.event_memory_ms).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> InsdThresholds {
        InsdThresholds {
            n_min: 2,
            event_threshold_g: 0.5,
            heartbeat_timeout_ms: 3_000,
            anomaly_threshold: 30.0,
        }
    }

    /// Target "t" with neighbors "a" and "b" about 110 m away, "far" outside the radius.
    fn detector() -> SilenceDetector {
        let nodes = vec![
            Node::new("t", "Target", 41.0280, 28.9450),
            Node::new("a", "A", 41.0290, 28.9450),
            Node::new("b", "B", 41.0270, 28.9450),
            Node::new("far", "Far", 41.0319, 28.9519),
        ];
        let mut d = SilenceDetector::new(&NeighborhoodConfig::default(), Some(thresholds()));
        d.register_nodes(&nodes, 0);
        d
    }

    #[test]
    fn test_decision_truth_table() {
        for bits in 0u8..8 {
            let stages = InsdStages {
                event_correlation: bits & 1 != 0,
                heartbeat_lost: bits & 2 != 0,
                neighborhood_anomaly: bits & 4 != 0,
            };
            let expected = match bits {
                7 => InsdDecision::ProbableCollapse,
                3 => InsdDecision::SilentUnderReview,
                _ => InsdDecision::NoConfirmedFailure,
            };
            assert_eq!(decide(stages), expected, "stages {stages:?}");
        }
    }

    #[test]
    fn test_stage_thresholds_are_inclusive() {
        let t = thresholds();
        let evidence = NeighborhoodEvidence {
            reporting_neighbors: 2,
            event_intensity_g: 0.5,
            heartbeat_elapsed_ms: 3_000,
            neighbor_anomaly: 30.0,
            stiffness_flag: false,
        };
        let stages = evaluate_stages(&evidence, &t);
        assert!(stages.event_correlation && stages.heartbeat_lost && stages.neighborhood_anomaly);

        let weak = NeighborhoodEvidence {
            reporting_neighbors: 1,
            ..evidence
        };
        assert!(!evaluate_stages(&weak, &t).event_correlation);
    }

    #[test]
    fn test_stiffness_flag_satisfies_stage_three() {
        let evidence = NeighborhoodEvidence {
            stiffness_flag: true,
            ..NeighborhoodEvidence::default()
        };
        assert!(evaluate_stages(&evidence, &thresholds()).neighborhood_anomaly);
    }

    #[test]
    fn test_probable_collapse_from_neighborhood() {
        let mut d = detector();
        for t in (0..=2_000).step_by(50) {
            d.heartbeat("a", t);
            d.heartbeat("b", t);
            d.heartbeat("far", t);
        }
        d.heartbeat("t", 1_000);
        d.record("a", 1_500, Some(1.4), 55.0, 0.0);
        d.record("b", 1_500, Some(1.2), 20.0, 0.0);

        let a = d.assess("t", 4_500);
        assert_eq!(a.evidence.reporting_neighbors, 2);
        assert!((a.evidence.event_intensity_g - 1.4).abs() < 1e-12);
        assert_eq!(a.evidence.neighbor_anomaly, 55.0);
        assert_eq!(a.decision, Some(InsdDecision::ProbableCollapse));
        assert_eq!(a.liveness, NodeLiveness::ProbableCollapse);
    }

    #[test]
    fn test_under_review_without_anomaly() {
        let mut d = detector();
        d.heartbeat("t", 1_000);
        d.record("a", 1_500, Some(0.9), 5.0, 1.0);
        d.record("b", 1_500, Some(0.8), 5.0, 1.0);
        let a = d.assess("t", 4_500);
        assert_eq!(a.decision, Some(InsdDecision::SilentUnderReview));
        assert_eq!(a.liveness, NodeLiveness::SilentUnderReview);
    }

    #[test]
    fn test_silent_without_event_is_not_failure() {
        let mut d = detector();
        d.heartbeat("t", 1_000);
        let a = d.assess("t", 10_000);
        assert_eq!(a.decision, Some(InsdDecision::NoConfirmedFailure));
        assert_eq!(a.liveness, NodeLiveness::Silent);
    }

    #[test]
    fn test_far_node_evidence_is_ignored() {
        let mut d = detector();
        d.heartbeat("t", 1_000);
        d.record("far", 1_500, Some(2.0), 90.0, 30.0);
        d.record("a", 1_500, Some(2.0), 90.0, 30.0);
        let a = d.assess("t", 4_500);
        assert_eq!(a.evidence.reporting_neighbors, 1);
        assert_eq!(a.decision, Some(InsdDecision::NoConfirmedFailure));
    }

    #[test]
    fn test_event_memory_expires() {
        let mut d = detector();
        d.heartbeat("t", 1_000);
        d.record("a", 1_500, Some(1.0), 80.0, 0.0);
        d.record("b", 1_500, Some(1.0), 80.0, 0.0);
        let a = d.assess("t", 1_500 + 30_001);
        assert_eq!(a.evidence.reporting_neighbors, 0);
        assert_eq!(a.decision, Some(InsdDecision::NoConfirmedFailure));
    }

    #[test]
    fn test_smaller_recent_event_keeps_neighbor_reporting() {
        let mut d = detector();
        for id in ["a", "b"] {
            d.record(id, 0, Some(2.0), 50.0, 0.0);
            d.record(id, 20_000, Some(0.9), 40.0, 0.0);
        }
        d.heartbeat("t", 20_000);

        let a = d.assess("t", 31_000);
        assert_eq!(a.evidence.reporting_neighbors, 2);
        assert!((a.evidence.event_intensity_g - 0.9).abs() < 1e-12);
        assert_eq!(a.evidence.neighbor_anomaly, 40.0);
        assert_eq!(a.decision, Some(InsdDecision::ProbableCollapse));
    }

    #[test]
    fn test_window_peak_tracks_max_inside_window() {
        let mut peak = WindowPeak::default();
        peak.push(2.0, 0, 1_000);
        peak.push(0.5, 600, 1_000);
        peak.push(0.8, 800, 1_000);
        assert_eq!(peak.within(900, 1_000), Some(2.0));
        assert_eq!(peak.within(1_500, 1_000), Some(0.8));
        assert_eq!(peak.within(1_801, 1_000), None);

        peak.push(0.1, 2_500, 1_000);
        assert_eq!(peak.entries.len(), 1, "aged-out entries are dropped on push");
    }

    #[test]
    fn test_reporting_node_liveness() {
        let mut d = detector();
        d.heartbeat("a", 2_000);
        d.record("a", 2_000, Some(0.9), 10.0, 0.0);
        assert_eq!(d.assess("a", 2_100).liveness, NodeLiveness::ActivelyReporting);
        d.heartbeat("b", 2_000);
        assert_eq!(d.assess("b", 2_100).liveness, NodeLiveness::Normal);
    }

    #[test]
    fn test_disabled_detector_still_tracks_silence() {
        let mut d = SilenceDetector::new(&NeighborhoodConfig::default(), None);
        d.heartbeat("x", 0);
        let a = d.assess("x", 5_000);
        assert!(!d.is_enabled());
        assert_eq!(a.decision, None);
        assert_eq!(a.liveness, NodeLiveness::Silent);
    }

    #[test]
    fn test_reset_restores_normal() {
        let mut d = detector();
        d.heartbeat("t", 1_000);
        d.record("a", 1_500, Some(1.4), 55.0, 0.0);
        d.record("b", 1_500, Some(1.2), 55.0, 0.0);
        let before = d.check_all(4_500);
        assert!(before.iter().any(|a| a.liveness == NodeLiveness::ProbableCollapse));

        d.reset(4_500);
        let after = d.check_all(4_600);
        assert!(after.iter().all(|a| a.liveness == NodeLiveness::Normal));
        assert_eq!(after.len(), 4);
    }
}
