//! Baseline Frequency Learning
//!
//! Frequency shift is only meaningful against a building's own natural
//! frequency. Each node learns it during quiet periods:
//!
//! - Only *warm* estimates count (the estimator has a full enough window).
//! - Only estimates taken while the node's magnitude status is `stable`
//!   count, so shaking never contaminates the baseline.
//! - The running mean is used while learning; after `lock_samples`
//!   accepted estimates the baseline locks and stops moving.
//! - An operator-supplied value overrides learning entirely.
//!
//! ## Usage
//!
//! ```ignore
//! let mut baseline = FrequencyBaseline::new(100);
//! baseline.observe(estimate, estimator.is_warm(), status == NodeStatus::Stable);
//! let shift = frequency_shift_percent(baseline.value().unwrap_or(0.0), estimate);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum BaselineError {
    #[error("Baseline frequency must be a positive finite number, got {0}")]
    InvalidFrequency(f64),
}

// ============================================================================
// Learning State
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BaselineState {
    /// Accumulating; the running mean is provisional
    #[default]
    Learning,
    /// Enough samples accepted; value is frozen
    Locked,
    /// Set explicitly; learning disabled until reset
    Overridden,
}

/// Learned baseline frequency for one node.
///
/// Uses Welford's online algorithm so the spread of accepted estimates is
/// available for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrequencyBaseline {
    lock_samples: usize,
    state: BaselineState,
    count: usize,
    mean: f64,
    m2: f64,
}

impl FrequencyBaseline {
    pub fn new(lock_samples: usize) -> Self {
        Self {
            lock_samples: lock_samples.max(1),
            state: BaselineState::Learning,
            count: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Offer one frequency estimate. Returns `true` when this sample locked
    /// the baseline.
    pub fn observe(&mut self, frequency_hz: f64, warm: bool, quiet: bool) -> bool {
        if self.state != BaselineState::Learning || !warm || !quiet || !frequency_hz.is_finite() {
            return false;
        }

        self.count += 1;
        let delta = frequency_hz - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (frequency_hz - self.mean);

        if self.count >= self.lock_samples {
            self.state = BaselineState::Locked;
            debug!(
                baseline_hz = self.mean,
                std_hz = self.std_dev(),
                samples = self.count,
                "Baseline frequency locked"
            );
            return true;
        }
        false
    }

    /// Current baseline (Hz), `None` until the first accepted estimate.
    pub fn value(&self) -> Option<f64> {
        match self.state {
            BaselineState::Learning if self.count == 0 => None,
            _ => Some(self.mean),
        }
    }

    /// Explicitly set the baseline, bypassing learning.
    pub fn set(&mut self, frequency_hz: f64) -> Result<(), BaselineError> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(BaselineError::InvalidFrequency(frequency_hz));
        }
        self.state = BaselineState::Overridden;
        self.mean = frequency_hz;
        self.m2 = 0.0;
        self.count = 1;
        Ok(())
    }

    pub fn state(&self) -> BaselineState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state != BaselineState::Learning
    }

    pub fn sample_count(&self) -> usize {
        self.count
    }

    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.lock_samples);
    }
}
