//! Signal processing module - filters, feature extraction and damage scoring
//!
//! Every stateful component here is per-node and owned by the
//! `SignalProcessor` registry; nothing in this module keeps global state.

mod correlation;
mod damage_score;
mod features;
mod filters;
mod frequency;
mod thresholds;

pub use correlation::{
    check_correlation, correlate, CorrelationResult, RecentReading, RecentReadings,
};
pub use damage_score::{ComponentScores, DamageCategory, DamageScore, DamageScoreCalculator};
pub use features::{frequency_shift_percent, DamageFeatures, FeatureExtractor, MagnitudeHistory};
pub use filters::{FilterChain, HighPassFilter, MovingAverageFilter};
pub use frequency::ZeroCrossingEstimator;
pub use thresholds::{interpret_magnitude, magnitude_status_table, ThresholdTable};
