//! Shared data structures for the structural monitoring pipeline
//!
//! This module defines the core types that flow between the reading source,
//! the signal processor and the monitor state:
//! - `SensorReading`: one 3-axis accelerometer sample from a node
//! - `Node`: a monitored building location
//! - `NodeStatus`: magnitude-derived / damage-derived status for display
//! - `PipelineStages`, `StageStatus`: per-tick progress of the four stages
//! - `PipelineResult`: everything the processor knows about one reading

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::processing::DamageScore;

// ============================================================================
// Sensor Readings
// ============================================================================

/// A single accelerometer sample produced by a node.
///
/// Immutable once created. `magnitude` is the Euclidean norm of the three
/// axes in g. Readings arrive at a fixed cadence (~20 Hz in the demo).
///
/// Precondition: `node_id` is non-empty. The processor does not validate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorReading {
    pub id: String,
    pub node_id: String,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    /// Euclidean norm of the three axes (g)
    pub magnitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// Build a reading from raw axes, computing the magnitude.
    pub fn from_axes(
        node_id: impl Into<String>,
        accel_x: f64,
        accel_y: f64,
        accel_z: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            node_id: node_id.into(),
            accel_x,
            accel_y,
            accel_z,
            magnitude: magnitude(accel_x, accel_y, accel_z),
            timestamp,
        }
    }

    /// Reading timestamp in milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Euclidean norm of a 3-axis acceleration vector.
pub fn magnitude(x: f64, y: f64, z: f64) -> f64 {
    (x * x + y * y + z * z).sqrt()
}

// ============================================================================
// Nodes
// ============================================================================

/// Display status of a node.
///
/// The first four levels come from raw magnitude thresholds; `Collapse` is
/// only reachable through the damage score or an INSD override.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Stable,
    Anomaly,
    Warning,
    Critical,
    Collapse,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Stable => write!(f, "stable"),
            NodeStatus::Anomaly => write!(f, "anomaly"),
            NodeStatus::Warning => write!(f, "warning"),
            NodeStatus::Critical => write!(f, "critical"),
            NodeStatus::Collapse => write!(f, "collapse"),
        }
    }
}

/// A monitored building location with one (physical or simulated) sensor.
///
/// Nodes are never destroyed during a session; `status` is overwritten by
/// the pipeline and forced back to `Stable` on reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub status: NodeStatus,
    pub lat: f64,
    pub lng: f64,
    pub is_physical: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: NodeStatus::Stable,
            lat,
            lng,
            is_physical: false,
        }
    }
}

// ============================================================================
// Pipeline Stages
// ============================================================================

/// The four stages every reading passes through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Raw,
    Filter,
    Correlate,
    Interpret,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 4] = [
        PipelineStage::Raw,
        PipelineStage::Filter,
        PipelineStage::Correlate,
        PipelineStage::Interpret,
    ];
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Raw => write!(f, "RAW"),
            PipelineStage::Filter => write!(f, "FILTER"),
            PipelineStage::Correlate => write!(f, "CORRELATE"),
            PipelineStage::Interpret => write!(f, "INTERPRET"),
        }
    }
}

/// Progress of one stage as shown by the UI layer.
///
/// `Error` is reserved for sensor hardware faults; the processing logic
/// never produces it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Idle,
    Processing,
    Complete,
    Error,
}

/// Completion mark for a single stage of a single reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StageMark {
    pub complete: bool,
    /// Milliseconds since the Unix epoch (0 when not reached)
    pub timestamp_ms: i64,
}

impl StageMark {
    pub fn done(timestamp_ms: i64) -> Self {
        Self {
            complete: true,
            timestamp_ms,
        }
    }
}

/// Stage completion marks carried by a `PipelineResult`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PipelineStages {
    pub raw: StageMark,
    pub filter: StageMark,
    pub correlate: StageMark,
    pub interpret: StageMark,
}

impl PipelineStages {
    pub fn get(&self, stage: PipelineStage) -> StageMark {
        match stage {
            PipelineStage::Raw => self.raw,
            PipelineStage::Filter => self.filter,
            PipelineStage::Correlate => self.correlate,
            PipelineStage::Interpret => self.interpret,
        }
    }
}

// ============================================================================
// Pipeline Result
// ============================================================================

/// Output of the signal processor for one reading.
///
/// `status` is the raw magnitude-threshold status of the filtered signal.
/// `damage` is the weighted damage assessment. The two are deliberately
/// separate outputs with separate threshold schemes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub reading: SensorReading,
    pub raw_magnitude: f64,
    pub filtered_magnitude: f64,
    pub is_correlated: bool,
    pub correlated_nodes: Vec<String>,
    pub event_id: Option<String>,
    pub status: NodeStatus,
    pub damage: DamageScore,
    pub stages: PipelineStages,
}
