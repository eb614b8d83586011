//! Monitor State
//!
//! What a display layer reads: node registry with current statuses, latest
//! reading and result per node, the global stage board, earthquake progress
//! and the building summary. Shared across tasks as `Arc<RwLock<MonitorState>>`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DamageConfig;
use crate::insd::{InsdAssessment, NodeLiveness};
use crate::processing::ThresholdTable;
use crate::types::{Node, NodeStatus, PipelineResult, PipelineStage, SensorReading, StageStatus};

// ============================================================================
// Stage Board
// ============================================================================

/// Global progress of the four stages for the most recent tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBoard {
    pub raw: StageStatus,
    pub filter: StageStatus,
    pub correlate: StageStatus,
    pub interpret: StageStatus,
}

impl StageBoard {
    pub fn get(&self, stage: PipelineStage) -> StageStatus {
        match stage {
            PipelineStage::Raw => self.raw,
            PipelineStage::Filter => self.filter,
            PipelineStage::Correlate => self.correlate,
            PipelineStage::Interpret => self.interpret,
        }
    }

    pub fn set(&mut self, stage: PipelineStage, status: StageStatus) {
        match stage {
            PipelineStage::Raw => self.raw = status,
            PipelineStage::Filter => self.filter = status,
            PipelineStage::Correlate => self.correlate = status,
            PipelineStage::Interpret => self.interpret = status,
        }
    }
}

// ============================================================================
// Building Summary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryBucket {
    Safe,
    Damaged,
    Critical,
    Collapsed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingSummary {
    pub safe: usize,
    pub damaged: usize,
    pub critical: usize,
    pub collapsed: usize,
}

impl BuildingSummary {
    pub fn all_safe(count: usize) -> Self {
        Self {
            safe: count,
            ..Self::default()
        }
    }

    pub fn total(&self) -> usize {
        self.safe + self.damaged + self.critical + self.collapsed
    }

    fn add(&mut self, bucket: SummaryBucket) {
        match bucket {
            SummaryBucket::Safe => self.safe += 1,
            SummaryBucket::Damaged => self.damaged += 1,
            SummaryBucket::Critical => self.critical += 1,
            SummaryBucket::Collapsed => self.collapsed += 1,
        }
    }
}

/// Damage score → summary bucket (score >= bound moves up a bucket).
pub fn summary_table(config: &DamageConfig) -> ThresholdTable<SummaryBucket> {
    ThresholdTable::new(
        vec![
            (config.summary_damaged_at, SummaryBucket::Safe),
            (config.summary_critical_at, SummaryBucket::Damaged),
            (config.summary_collapsed_at, SummaryBucket::Critical),
        ],
        SummaryBucket::Collapsed,
    )
}

// ============================================================================
// Monitor State
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorState {
    /// Node registry, ordered by id
    pub nodes: BTreeMap<String, Node>,
    pub latest_readings: HashMap<String, SensorReading>,
    pub results: HashMap<String, PipelineResult>,
    pub liveness: HashMap<String, NodeLiveness>,
    pub stages: StageBoard,
    /// Largest raw magnitude seen since the last reset (g)
    pub peak_magnitude: f64,
    pub earthquake_active: bool,
    /// 0-100
    pub earthquake_progress: f64,
    pub summary: BuildingSummary,
    pub readings_processed: u64,

    #[serde(skip)]
    summary_buckets: Option<ThresholdTable<SummaryBucket>>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new(&DamageConfig::default())
    }
}

impl MonitorState {
    pub fn new(config: &DamageConfig) -> Self {
        Self {
            nodes: BTreeMap::new(),
            latest_readings: HashMap::new(),
            results: HashMap::new(),
            liveness: HashMap::new(),
            stages: StageBoard::default(),
            peak_magnitude: 0.0,
            earthquake_active: false,
            earthquake_progress: 0.0,
            summary: BuildingSummary::default(),
            readings_processed: 0,
            summary_buckets: Some(summary_table(config)),
        }
    }

    /// Replace the node registry. Every node starts out counted as safe.
    pub fn set_nodes(&mut self, nodes: Vec<Node>) {
        self.nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        self.summary = BuildingSummary::all_safe(self.nodes.len());
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn add_reading(&mut self, reading: &SensorReading) {
        self.peak_magnitude = self.peak_magnitude.max(reading.magnitude);
        self.latest_readings
            .insert(reading.node_id.clone(), reading.clone());
    }

    /// Store a pipeline result and refresh the node's displayed status.
    pub fn set_processed_result(&mut self, result: PipelineResult) {
        let node_id = result.reading.node_id.clone();
        self.readings_processed += 1;
        let status = if self.liveness(&node_id) == NodeLiveness::ProbableCollapse {
            NodeStatus::Collapse
        } else {
            result.status
        };
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.status = status;
        }
        self.results.insert(node_id, result);
    }

    /// Record one tick's worth of readings and results, marking stage progress.
    pub fn apply_tick(&mut self, results: Vec<PipelineResult>) {
        if results.is_empty() {
            return;
        }
        self.update_pipeline_stage(PipelineStage::Raw, StageStatus::Processing);
        for result in results {
            self.add_reading(&result.reading);
            let stages = result.stages;
            self.set_processed_result(result);
            for stage in PipelineStage::ALL {
                let status = if stages.get(stage).complete {
                    StageStatus::Complete
                } else {
                    StageStatus::Processing
                };
                self.update_pipeline_stage(stage, status);
            }
        }
    }

    pub fn update_pipeline_stage(&mut self, stage: PipelineStage, status: StageStatus) {
        self.stages.set(stage, status);
    }

    /// Flag a stage as failed (sensor hardware fault). Never set by the pipeline itself.
    pub fn mark_error(&mut self, stage: PipelineStage) {
        warn!(stage = %stage, "Pipeline stage marked as error");
        self.stages.set(stage, StageStatus::Error);
    }

    /// Apply silence detection results; probable collapse overrides node status.
    pub fn apply_assessments(&mut self, assessments: &[InsdAssessment]) {
        for a in assessments {
            self.liveness.insert(a.node_id.clone(), a.liveness);
            if a.liveness == NodeLiveness::ProbableCollapse {
                if let Some(node) = self.nodes.get_mut(&a.node_id) {
                    node.status = NodeStatus::Collapse;
                }
            }
        }
    }

    pub fn liveness(&self, node_id: &str) -> NodeLiveness {
        self.liveness.get(node_id).copied().unwrap_or_default()
    }

    /// Nodes currently silent (any silent liveness state), sorted.
    pub fn signal_loss_nodes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .liveness
            .iter()
            .filter(|(_, l)| {
                matches!(
                    l,
                    NodeLiveness::Silent
                        | NodeLiveness::SilentUnderReview
                        | NodeLiveness::ProbableCollapse
                )
            })
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn set_earthquake_active(&mut self, active: bool) {
        self.earthquake_active = active;
        self.earthquake_progress = if active { 0.0 } else { 100.0 };
    }

    pub fn set_earthquake_progress(&mut self, progress: f64) {
        self.earthquake_progress = progress.max(0.0).min(100.0);
    }

    /// Recount the building summary from the latest damage scores.
    ///
    /// Nodes without a result count as safe.
    pub fn update_building_summary(&mut self) -> BuildingSummary {
        let mut summary = BuildingSummary::default();
        let table = self
            .summary_buckets
            .get_or_insert_with(|| summary_table(&DamageConfig::default()));
        for result in self.results.values() {
            summary.add(table.lookup(result.damage.score));
        }
        summary.safe += self.nodes.len().saturating_sub(self.results.len());
        self.summary = summary;
        summary
    }

    /// Force every node back to stable and drop all results.
    ///
    /// Processor state is reset separately by the owner of the processor.
    pub fn reset_to_safe(&mut self) {
        for node in self.nodes.values_mut() {
            node.status = NodeStatus::Stable;
        }
        self.results.clear();
        self.latest_readings.clear();
        self.liveness.clear();
        self.stages = StageBoard::default();
        self.peak_magnitude = 0.0;
        self.earthquake_active = false;
        self.earthquake_progress = 0.0;
        self.summary = BuildingSummary::all_safe(self.nodes.len());
        info!(nodes = self.nodes.len(), "Monitor state reset to safe");
    }
}
