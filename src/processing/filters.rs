//! Per-node signal filters
//!
//! Raw magnitude passes through a single-pole high-pass (removes gravity and
//! DC offset), is rectified, then smoothed by a short moving average into an
//! envelope-like measure.

use std::collections::VecDeque;
use std::f64::consts::PI;

use crate::config::FilterConfig;

// ============================================================================
// Moving Average
// ============================================================================

/// Fixed-size FIFO mean. Before the buffer fills, averages what it has.
#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    buffer: VecDeque<f64>,
    size: usize,
}

impl MovingAverageFilter {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            buffer: VecDeque::with_capacity(size),
            size,
        }
    }

    pub fn apply(&mut self, value: f64) -> f64 {
        self.buffer.push_back(value);
        if self.buffer.len() > self.size {
            self.buffer.pop_front();
        }
        self.buffer.iter().sum::<f64>() / self.buffer.len() as f64
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// ============================================================================
// High-Pass
// ============================================================================

/// Single-pole IIR high-pass in discrete time-constant form.
///
/// `alpha = RC / (RC + dt)`, `RC = 1 / (2π·fc)`, `dt = 1 / fs`,
/// `y[n] = alpha · (y[n-1] + x[n] - x[n-1])`.
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    alpha: f64,
    prev_raw: f64,
    prev_filtered: f64,
}

impl HighPassFilter {
    pub fn new(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let rc = 1.0 / (2.0 * PI * cutoff_hz);
        let dt = 1.0 / sample_rate_hz;
        Self {
            alpha: rc / (rc + dt),
            prev_raw: 0.0,
            prev_filtered: 0.0,
        }
    }

    pub fn apply(&mut self, value: f64) -> f64 {
        let filtered = self.alpha * (self.prev_filtered + value - self.prev_raw);
        self.prev_raw = value;
        self.prev_filtered = filtered;
        filtered
    }

    pub fn reset(&mut self) {
        self.prev_raw = 0.0;
        self.prev_filtered = 0.0;
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

// ============================================================================
// Filter Chain
// ============================================================================

/// One node's filter state: high-pass → |·| → moving average.
#[derive(Debug, Clone)]
pub struct FilterChain {
    highpass: HighPassFilter,
    moving_average: MovingAverageFilter,
}

impl FilterChain {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            highpass: HighPassFilter::new(config.highpass_cutoff_hz, config.sample_rate_hz),
            moving_average: MovingAverageFilter::new(config.moving_average_window),
        }
    }

    /// Filter one raw magnitude into the envelope used downstream.
    pub fn apply(&mut self, raw_magnitude: f64) -> f64 {
        let hp = self.highpass.apply(raw_magnitude);
        self.moving_average.apply(hp.abs())
    }

    pub fn reset(&mut self) {
        self.highpass.reset();
        self.moving_average.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average_partial_buffer() {
        let mut ma = MovingAverageFilter::new(5);
        assert_eq!(ma.apply(2.0), 2.0);
        assert_eq!(ma.apply(4.0), 3.0);
        assert_eq!(ma.len(), 2);
    }

    #[test]
    fn test_moving_average_evicts_oldest() {
        let mut ma = MovingAverageFilter::new(3);
        for v in [1.0, 2.0, 3.0] {
            ma.apply(v);
        }
        // window is now [2, 3, 10]
        assert!((ma.apply(10.0) - 5.0).abs() < 1e-12);
        assert_eq!(ma.len(), 3);
    }

    #[test]
    fn test_moving_average_output_within_window_bounds() {
        let mut ma = MovingAverageFilter::new(5);
        let inputs = [0.3, -1.2, 4.5, 0.0, 2.2, -0.7, 9.1, 3.3, -4.0, 0.5];
        for (i, &v) in inputs.iter().enumerate() {
            let out = ma.apply(v);
            let start = i.saturating_sub(4);
            let window = &inputs[start..=i];
            let lo = window.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            assert!(out >= lo - 1e-12 && out <= hi + 1e-12, "step {i}: {out} not in [{lo}, {hi}]");
        }
    }

    #[test]
    fn test_highpass_alpha_matches_time_constant() {
        let hp = HighPassFilter::new(0.5, 100.0);
        let rc = 1.0 / (2.0 * PI * 0.5);
        let expected = rc / (rc + 0.01);
        assert!((hp.alpha() - expected).abs() < 1e-12);
        assert!(hp.alpha() > 0.96 && hp.alpha() < 0.97);
    }

    #[test]
    fn test_highpass_rejects_dc() {
        let mut hp = HighPassFilter::new(0.5, 100.0);
        let first = hp.apply(1.0);
        let mut last = first;
        for _ in 0..2_000 {
            last = hp.apply(1.0);
        }
        assert!(first > 0.9);
        assert!(last.abs() < 1e-6, "constant input should decay to 0, got {last}");
    }

    #[test]
    fn test_reset_reproduces_output_sequence() {
        let mut chain = FilterChain::new(&FilterConfig::default());
        let inputs = [1.0, 1.02, 0.97, 1.5, 0.4, 1.0, 1.0, 2.3];
        let first: Vec<f64> = inputs.iter().map(|&v| chain.apply(v)).collect();
        chain.reset();
        let second: Vec<f64> = inputs.iter().map(|&v| chain.apply(v)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_chain_output_is_non_negative() {
        let mut chain = FilterChain::new(&FilterConfig::default());
        for i in 0..100 {
            let v = if i % 2 == 0 { 1.5 } else { 0.1 };
            assert!(chain.apply(v) >= 0.0);
        }
    }
}
