//! Zero-crossing dominant frequency estimator
//!
//! Counts sign changes of the mean-removed raw magnitude over a rolling
//! window. Cheap enough to run on every reading, and good enough to track a
//! building's first-mode frequency drifting downward as stiffness is lost.

use std::collections::VecDeque;

use crate::config::FrequencyConfig;

/// Rolling-window frequency estimate for one node.
#[derive(Debug, Clone)]
pub struct ZeroCrossingEstimator {
    window: VecDeque<f64>,
    window_size: usize,
    min_samples: usize,
    default_hz: f64,
    sample_rate_hz: f64,
    min_hz: f64,
    max_hz: f64,
}

impl ZeroCrossingEstimator {
    pub fn new(config: &FrequencyConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window_size),
            window_size: config.window_size.max(1),
            min_samples: config.min_samples,
            default_hz: config.default_hz,
            sample_rate_hz: config.sample_rate_hz,
            min_hz: config.min_hz,
            max_hz: config.max_hz,
        }
    }

    /// Push one raw magnitude and return the current estimate (Hz).
    ///
    /// Returns `default_hz` until `min_samples` have been seen.
    pub fn estimate(&mut self, magnitude: f64) -> f64 {
        self.window.push_back(magnitude);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }

        if !self.is_warm() {
            return self.default_hz;
        }

        let len = self.window.len() as f64;
        let mean = self.window.iter().sum::<f64>() / len;

        let crossings = self
            .window
            .iter()
            .map(|v| v - mean)
            .collect::<Vec<_>>()
            .windows(2)
            .filter(|pair| {
                let (prev, curr) = (pair[0], pair[1]);
                (prev < 0.0 && curr >= 0.0) || (prev >= 0.0 && curr < 0.0)
            })
            .count();

        let duration_s = len / self.sample_rate_hz;
        let frequency = (crossings as f64 / 2.0) / duration_s;
        frequency.max(self.min_hz).min(self.max_hz)
    }

    /// True once enough samples are buffered for a real estimate.
    pub fn is_warm(&self) -> bool {
        self.window.len() >= self.min_samples
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> ZeroCrossingEstimator {
        ZeroCrossingEstimator::new(&FrequencyConfig::default())
    }

    #[test]
    fn test_cold_start_returns_default() {
        let mut est = estimator();
        for i in 0..9 {
            let v = if i % 2 == 0 { 1.0 } else { -1.0 };
            assert_eq!(est.estimate(v), 5.0);
        }
        assert!(!est.is_warm());
    }

    #[test]
    fn test_period_four_square_wave() {
        let mut est = estimator();
        let mut last = 0.0;
        for i in 0..50 {
            let v = if (i / 2) % 2 == 0 { 1.0 } else { -1.0 };
            last = est.estimate(v);
        }
        // 24 crossings over 2.5 s
        assert!((last - 4.8).abs() < 1e-9, "got {last}");
    }

    #[test]
    fn test_alternating_sequence() {
        let mut est = estimator();
        let mut last = 0.0;
        for i in 0..50 {
            last = est.estimate(if i % 2 == 0 { 1.0 } else { -1.0 });
        }
        // 49 crossings over 2.5 s
        assert!((last - 9.8).abs() < 1e-9, "got {last}");
    }

    #[test]
    fn test_constant_signal_clamps_to_min() {
        let mut est = estimator();
        let mut last = 0.0;
        for _ in 0..20 {
            last = est.estimate(1.0);
        }
        assert_eq!(last, 0.5);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut est = estimator();
        for i in 0..500 {
            est.estimate(f64::from(i));
        }
        assert_eq!(est.sample_count(), 50);
    }

    #[test]
    fn test_estimate_always_within_clamp() {
        let mut est = estimator();
        for i in 0..200 {
            let v = ((i * 7919) % 13) as f64 - 6.0;
            let f = est.estimate(v);
            assert!((0.5..=20.0).contains(&f), "estimate {f} escaped the clamp");
        }
    }

    #[test]
    fn test_reset_reproduces_output_sequence() {
        let mut est = estimator();
        let inputs: Vec<f64> = (0..60).map(|i| (f64::from(i) * 0.9).sin()).collect();
        let first: Vec<f64> = inputs.iter().map(|&v| est.estimate(v)).collect();
        est.reset();
        let second: Vec<f64> = inputs.iter().map(|&v| est.estimate(v)).collect();
        assert_eq!(first, second);
    }
}
