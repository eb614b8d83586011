//! Damage feature extraction
//!
//! Turns the current magnitude and frequency estimate of a node into the
//! three features the damage score is built from:
//! - frequency shift (%) against the node's baseline
//! - peak energy, normalized against the energy ceiling
//! - abnormal duration (s) inside a sliding time window

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::FeatureConfig;

/// Snapshot of features for one reading. Recomputed on every reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageFeatures {
    /// Percent drop from baseline frequency; positive means the frequency fell
    pub frequency_shift: f64,
    /// Magnitude normalized to [0, 1] against the energy ceiling
    pub peak_energy: f64,
    /// Seconds spent at or above the abnormal threshold in the window
    pub abnormal_duration: f64,
    pub current_frequency: f64,
    pub baseline_frequency: f64,
}

/// Percent frequency drop; 0 when the baseline is not positive.
pub fn frequency_shift_percent(baseline_hz: f64, current_hz: f64) -> f64 {
    if baseline_hz > 0.0 {
        ((baseline_hz - current_hz) / baseline_hz) * 100.0
    } else {
        0.0
    }
}

// ============================================================================
// Magnitude History
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct MagnitudeSample {
    magnitude: f64,
    timestamp_ms: i64,
}

/// Time-ordered magnitude samples bounded by a time window and a sample cap.
#[derive(Debug, Clone)]
pub struct MagnitudeHistory {
    samples: VecDeque<MagnitudeSample>,
    window_ms: i64,
    max_samples: usize,
}

impl MagnitudeHistory {
    pub fn new(window_ms: u64, max_samples: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            window_ms: i64::try_from(window_ms).unwrap_or(i64::MAX),
            max_samples: max_samples.max(1),
        }
    }

    /// Append a sample, drop entries older than `timestamp - window`, then cap.
    pub fn push(&mut self, magnitude: f64, timestamp_ms: i64) {
        self.samples.push_back(MagnitudeSample {
            magnitude,
            timestamp_ms,
        });

        let cutoff = timestamp_ms.saturating_sub(self.window_ms);
        while self
            .samples
            .front()
            .is_some_and(|s| s.timestamp_ms < cutoff)
        {
            self.samples.pop_front();
        }

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Time-weighted seconds spent at or above `threshold`.
    ///
    /// Each interval between consecutive samples is counted when the earlier
    /// sample was abnormal.
    pub fn abnormal_duration_secs(&self, threshold: f64) -> f64 {
        let abnormal_ms: i64 = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .filter(|(prev, _)| prev.magnitude >= threshold)
            .map(|(prev, curr)| curr.timestamp_ms - prev.timestamp_ms)
            .sum();
        abnormal_ms as f64 / 1000.0
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ============================================================================
// Feature Extractor
// ============================================================================

/// Per-node feature extractor owning that node's magnitude history.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    history: MagnitudeHistory,
    abnormal_magnitude_g: f64,
    energy_ceiling_g: f64,
}

impl FeatureExtractor {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            history: MagnitudeHistory::new(config.duration_window_ms, config.max_history_samples),
            abnormal_magnitude_g: config.abnormal_magnitude_g,
            energy_ceiling_g: config.energy_ceiling_g,
        }
    }

    pub fn extract(
        &mut self,
        magnitude: f64,
        current_frequency: f64,
        baseline_frequency: f64,
        timestamp_ms: i64,
    ) -> DamageFeatures {
        self.history.push(magnitude, timestamp_ms);

        DamageFeatures {
            frequency_shift: frequency_shift_percent(baseline_frequency, current_frequency),
            peak_energy: (magnitude / self.energy_ceiling_g).min(1.0),
            abnormal_duration: self.history.abnormal_duration_secs(self.abnormal_magnitude_g),
            current_frequency,
            baseline_frequency,
        }
    }

    pub fn history(&self) -> &MagnitudeHistory {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
