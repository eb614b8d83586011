//! Signal Processor
//!
//! The registry that owns every piece of per-node state (filter chain,
//! frequency estimator, magnitude history, baseline) plus the shared
//! recent-readings map and the silence detector.
//!
//! # Stages
//!
//! ```text
//! RAW        reading accepted, heartbeat recorded
//! FILTER     high-pass -> |x| -> moving average, frequency estimate
//! CORRELATE  recent-readings map updated, cross-node check
//! INTERPRET  raw magnitude status + weighted damage score
//! ```
//!
//! Node state is created on first use and lives until `reset` /
//! `reset_node`. Nothing here is global.
//!
//! # Example
//!
//! ```ignore
//! let mut processor = SignalProcessor::new(&MonitorConfig::default());
//! processor.register_nodes(&nodes, now_ms);
//! let results = processor.process_tick(&readings);
//! let assessments = processor.check_silence(now_ms);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::baseline::{BaselineError, FrequencyBaseline};
use crate::config::MonitorConfig;
use crate::insd::{InsdAssessment, SilenceDetector};
use crate::processing::{
    correlate, magnitude_status_table, CorrelationResult, DamageScore, DamageScoreCalculator,
    FeatureExtractor, FilterChain, RecentReadings, ThresholdTable, ZeroCrossingEstimator,
};
use crate::types::{Node, NodeStatus, PipelineResult, PipelineStages, SensorReading, StageMark};

// ============================================================================
// Per-Node State
// ============================================================================

/// Everything the pipeline remembers about one node. Never shared.
#[derive(Debug, Clone)]
struct NodeState {
    filters: FilterChain,
    estimator: ZeroCrossingEstimator,
    features: FeatureExtractor,
    baseline: FrequencyBaseline,
}

impl NodeState {
    fn new(config: &MonitorConfig) -> Self {
        Self {
            filters: FilterChain::new(&config.filters),
            estimator: ZeroCrossingEstimator::new(&config.frequency),
            features: FeatureExtractor::new(&config.features),
            baseline: FrequencyBaseline::new(config.baseline.lock_samples),
        }
    }
}

/// Filter/feature/score output for one reading, before correlation.
#[derive(Debug, Clone)]
struct Analysis {
    filtered_magnitude: f64,
    status: NodeStatus,
    damage: DamageScore,
}

/// Running counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStats {
    pub readings_processed: u64,
    pub ticks_processed: u64,
    pub correlated_events: u64,
    pub last_event_id: Option<String>,
}

// ============================================================================
// Signal Processor
// ============================================================================

pub struct SignalProcessor {
    config: MonitorConfig,
    nodes: HashMap<String, NodeState>,
    recent: RecentReadings,
    calculator: DamageScoreCalculator,
    status_table: ThresholdTable<NodeStatus>,
    detector: SilenceDetector,
    stats: ProcessorStats,
}

impl SignalProcessor {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            nodes: HashMap::new(),
            recent: RecentReadings::new(),
            calculator: DamageScoreCalculator::new(&config.damage),
            status_table: magnitude_status_table(&config.status),
            detector: SilenceDetector::new(&config.neighborhood, config.insd.clone()),
            stats: ProcessorStats::default(),
            config: config.clone(),
        }
    }

    /// Register the monitored node set (builds the INSD neighbor table).
    pub fn register_nodes(&mut self, nodes: &[Node], now_ms: i64) {
        self.detector.register_nodes(nodes, now_ms);
    }

    /// Process a single reading. Correlation is evaluated at the reading's
    /// own timestamp against whatever other nodes have reported so far.
    pub fn process(&mut self, reading: &SensorReading) -> PipelineResult {
        let now_ms = reading.timestamp_ms();
        let analysis = self.analyze(reading);
        let correlation = correlate(&mut self.recent, now_ms, &self.config.correlation);
        self.note_event(&correlation);
        self.finish(reading, analysis, &correlation, now_ms)
    }

    /// Process every reading of one tick, then correlate once for the whole
    /// tick so all nodes that shook together are flagged together.
    pub fn process_tick(&mut self, readings: &[SensorReading]) -> Vec<PipelineResult> {
        let Some(now_ms) = readings.iter().map(SensorReading::timestamp_ms).max() else {
            return Vec::new();
        };

        let analyses: Vec<Analysis> = readings.iter().map(|r| self.analyze(r)).collect();
        let correlation = correlate(&mut self.recent, now_ms, &self.config.correlation);
        self.note_event(&correlation);
        self.stats.ticks_processed += 1;

        readings
            .iter()
            .zip(analyses)
            .map(|(reading, analysis)| {
                self.finish(reading, analysis, &correlation, reading.timestamp_ms())
            })
            .collect()
    }

    /// RAW + FILTER + INTERPRET for one reading; records it for correlation.
    fn analyze(&mut self, reading: &SensorReading) -> Analysis {
        debug_assert!(!reading.node_id.is_empty(), "reading without node_id");

        let ts = reading.timestamp_ms();
        let raw = reading.magnitude;
        self.detector.heartbeat(&reading.node_id, ts);

        let state = self
            .nodes
            .entry(reading.node_id.clone())
            .or_insert_with(|| NodeState::new(&self.config));

        let filtered = state.filters.apply(raw);
        let frequency = state.estimator.estimate(raw);
        let status = self.status_table.lookup(filtered);

        state
            .baseline
            .observe(frequency, state.estimator.is_warm(), status == NodeStatus::Stable);
        let baseline = state.baseline.value().unwrap_or(0.0);

        let features = state.features.extract(filtered, frequency, baseline, ts);
        let damage = self.calculator.calculate(&features);

        self.recent.record(&reading.node_id, filtered, ts);
        self.stats.readings_processed += 1;

        debug!(
            node = %reading.node_id,
            raw = raw,
            filtered = filtered,
            frequency_hz = frequency,
            status = %status,
            score = damage.score,
            "Reading analyzed"
        );

        Analysis {
            filtered_magnitude: filtered,
            status,
            damage,
        }
    }

    /// CORRELATE stage result and INSD bookkeeping.
    fn finish(
        &mut self,
        reading: &SensorReading,
        analysis: Analysis,
        correlation: &CorrelationResult,
        ts: i64,
    ) -> PipelineResult {
        let is_correlated = correlation.includes(&reading.node_id);
        self.detector.record(
            &reading.node_id,
            ts,
            is_correlated.then_some(analysis.filtered_magnitude),
            analysis.damage.score,
            analysis.damage.features.frequency_shift,
        );

        let mark = StageMark::done(ts);
        PipelineResult {
            reading: reading.clone(),
            raw_magnitude: reading.magnitude,
            filtered_magnitude: analysis.filtered_magnitude,
            is_correlated: correlation.is_correlated,
            correlated_nodes: correlation.correlated_nodes.clone(),
            event_id: correlation.event_id.clone(),
            status: analysis.status,
            damage: analysis.damage,
            stages: PipelineStages {
                raw: mark,
                filter: mark,
                correlate: mark,
                interpret: mark,
            },
        }
    }

    fn note_event(&mut self, correlation: &CorrelationResult) {
        if correlation.is_correlated && correlation.event_id != self.stats.last_event_id {
            self.stats.correlated_events += 1;
            self.stats.last_event_id.clone_from(&correlation.event_id);
            debug!(
                event = ?correlation.event_id,
                nodes = correlation.correlated_nodes.len(),
                "Correlated event"
            );
        }
    }

    /// Evaluate silence detection for every tracked node.
    pub fn check_silence(&mut self, now_ms: i64) -> Vec<InsdAssessment> {
        self.detector.check_all(now_ms)
    }

    /// Override a node's baseline frequency, creating its state if needed.
    pub fn set_baseline(&mut self, node_id: &str, frequency_hz: f64) -> Result<(), BaselineError> {
        let config = &self.config;
        self.nodes
            .entry(node_id.to_string())
            .or_insert_with(|| NodeState::new(config))
            .baseline
            .set(frequency_hz)
    }

    pub fn baseline(&self, node_id: &str) -> Option<f64> {
        self.nodes.get(node_id).and_then(|s| s.baseline.value())
    }

    /// Clear one node's state (filters, estimator, history, baseline, evidence).
    pub fn reset_node(&mut self, node_id: &str, now_ms: i64) {
        self.nodes.remove(node_id);
        self.recent.remove(node_id);
        self.detector.reset_node(node_id, now_ms);
    }

    /// Clear all per-node state and the recent-readings map.
    pub fn reset(&mut self, now_ms: i64) {
        let cleared = self.nodes.len();
        self.nodes.clear();
        self.recent.clear();
        self.detector.reset(now_ms);
        self.stats = ProcessorStats::default();
        info!(nodes = cleared, "Signal processor reset");
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    pub fn detector(&self) -> &SilenceDetector {
        &self.detector
    }

    pub fn recent_readings(&self) -> &RecentReadings {
        &self.recent
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}
