//! Seismos: Building Damage Monitoring
//!
//! Real-time structural health monitoring for a district of instrumented
//! buildings. Each node reports 3-axis acceleration; the pipeline filters
//! it, extracts damage features, scores each building 0-100, correlates
//! shaking across nodes and infers collapse of nodes that go silent.
//!
//! ## Architecture
//!
//! - **Processing**: filters, frequency estimation, features, damage score, correlation
//! - **Baseline**: per-node natural frequency learning
//! - **INSD**: implicit node silence detection from neighborhood evidence
//! - **Pipeline**: per-node registry, monitor state, sources and the async loop
//! - **Simulator**: synthetic readings and earthquakes for demos and tests

pub mod baseline;
pub mod config;
pub mod insd;
pub mod pipeline;
pub mod processing;
pub mod simulator;
pub mod types;

// Re-export monitor configuration
pub use config::{ConfigError, MonitorConfig};

// Re-export commonly used types
pub use types::{
    Node, NodeStatus, PipelineResult, PipelineStage, PipelineStages, SensorReading, StageStatus,
};

// Re-export scoring
pub use processing::{DamageCategory, DamageFeatures, DamageScore, DamageScoreCalculator};

// Re-export pipeline components
pub use pipeline::{MonitorState, ProcessingLoop, SignalProcessor};

// Re-export silence detection
pub use insd::{InsdDecision, NodeLiveness, SilenceDetector};

// Re-export simulator
pub use simulator::{EarthquakeConfig, EarthquakeSimulator, NoiseSource, SeededNoise};
