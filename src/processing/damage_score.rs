//! Damage Scoring Module
//!
//! Deterministic, rule-based damage score for a monitored building. The
//! score is a weighted combination of three features, each first scaled to
//! a 0-100 component score, so every point of the final number can be traced
//! back to a feature.

use serde::{Deserialize, Serialize};

use super::features::DamageFeatures;
use super::thresholds::ThresholdTable;
use crate::config::{DamageConfig, DamageScaling, DamageWeights};
use crate::types::NodeStatus;

// ============================================================================
// Output Types
// ============================================================================

/// Categorical damage classification shown to operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DamageCategory {
    #[default]
    Safe,
    Risky,
    HeavilyDamaged,
}

impl DamageCategory {
    /// Field label used on the operator display.
    pub fn label(&self) -> &'static str {
        match self {
            DamageCategory::Safe => "Güvenli",
            DamageCategory::Risky => "Riskli",
            DamageCategory::HeavilyDamaged => "Ağır Hasarlı",
        }
    }
}

impl std::fmt::Display for DamageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DamageCategory::Safe => write!(f, "safe"),
            DamageCategory::Risky => write!(f, "risky"),
            DamageCategory::HeavilyDamaged => write!(f, "heavily_damaged"),
        }
    }
}

/// Per-component scores (0-100, rounded) for explainability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub frequency_shift_score: f64,
    pub peak_energy_score: f64,
    pub duration_score: f64,
}

/// Damage assessment for one node at one reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageScore {
    /// Integer-valued score in [0, 100]
    pub score: f64,
    pub category: DamageCategory,
    pub components: ComponentScores,
    /// Features the score was computed from
    pub features: DamageFeatures,
    /// Finer-grained status used for color coding
    pub legacy_status: NodeStatus,
}

// ============================================================================
// Calculator
// ============================================================================

/// Weighted damage score calculator.
///
/// # Scoring Algorithm
///
/// - `frequency_shift_score = min(100, |shift| × 4)`: 25% shift = 100 points
/// - `peak_energy_score = min(100, energy × 50)`
/// - `duration_score = min(100, seconds × 10)`: 10 s = 100 points
/// - `score = round(0.50·F + 0.35·E + 0.15·D)`, clamped to [0, 100]
///
/// Frequency shift carries the largest weight: a falling natural frequency
/// means the structure has lost stiffness.
///
/// Weights, scaling factors and category cutoffs are configuration, not
/// derived values.
#[derive(Debug, Clone)]
pub struct DamageScoreCalculator {
    weights: DamageWeights,
    scaling: DamageScaling,
    categories: ThresholdTable<DamageCategory>,
    legacy: ThresholdTable<NodeStatus>,
}

impl Default for DamageScoreCalculator {
    fn default() -> Self {
        Self::new(&DamageConfig::default())
    }
}

impl DamageScoreCalculator {
    pub fn new(config: &DamageConfig) -> Self {
        let [stable, anomaly, warning, critical] = config.legacy_thresholds;
        Self {
            weights: config.weights.clone(),
            scaling: config.scaling.clone(),
            categories: ThresholdTable::new(
                vec![
                    (config.safe_below, DamageCategory::Safe),
                    (config.risky_below, DamageCategory::Risky),
                ],
                DamageCategory::HeavilyDamaged,
            ),
            legacy: ThresholdTable::new(
                vec![
                    (stable, NodeStatus::Stable),
                    (anomaly, NodeStatus::Anomaly),
                    (warning, NodeStatus::Warning),
                    (critical, NodeStatus::Critical),
                ],
                NodeStatus::Collapse,
            ),
        }
    }

    /// Score a feature snapshot. Infallible for every input, including
    /// negative shifts and energy above 1.
    pub fn calculate(&self, features: &DamageFeatures) -> DamageScore {
        let frequency_shift_score =
            (features.frequency_shift.abs() * self.scaling.frequency_shift).min(100.0);
        let peak_energy_score = (features.peak_energy * self.scaling.peak_energy).min(100.0);
        let duration_score = (features.abnormal_duration * self.scaling.duration).min(100.0);

        let weighted = frequency_shift_score * self.weights.frequency_shift
            + peak_energy_score * self.weights.peak_energy
            + duration_score * self.weights.duration;

        // f64::max/min drop NaN in favor of the bound, so the result is always finite
        let score = weighted.round().max(0.0).min(100.0);

        DamageScore {
            score,
            category: self.categorize(score),
            components: ComponentScores {
                frequency_shift_score: frequency_shift_score.round(),
                peak_energy_score: peak_energy_score.round(),
                duration_score: duration_score.round(),
            },
            features: *features,
            legacy_status: self.legacy_status(score),
        }
    }

    pub fn categorize(&self, score: f64) -> DamageCategory {
        self.categories.lookup(score)
    }

    pub fn legacy_status(&self, score: f64) -> NodeStatus {
        self.legacy.lookup(score)
    }
}
