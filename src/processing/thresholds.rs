//! Ordered threshold tables
//!
//! Every categorical classification in the pipeline (raw magnitude status,
//! damage category, legacy status, building summary bucket) is an ordered
//! list of `(upper_bound, category)` pairs plus a category for everything at
//! or above the last bound. A single `lookup` replaces cascading if/else.

use serde::{Deserialize, Serialize};

use crate::config::StatusThresholds;
use crate::types::NodeStatus;

/// Ordered `(upper_bound, category)` table.
///
/// `lookup(v)` returns the category of the first entry with `v < bound`,
/// or `above` when no bound is exceeded. Bounds must be ascending; NaN
/// falls through to `above`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable<T> {
    bands: Vec<(f64, T)>,
    above: T,
}

impl<T: Copy> ThresholdTable<T> {
    pub fn new(bands: Vec<(f64, T)>, above: T) -> Self {
        debug_assert!(
            bands.windows(2).all(|w| w[0].0 < w[1].0),
            "threshold bounds must be strictly ascending"
        );
        Self { bands, above }
    }

    pub fn lookup(&self, value: f64) -> T {
        self.bands
            .iter()
            .find(|(bound, _)| value < *bound)
            .map_or(self.above, |(_, category)| *category)
    }

    pub fn bounds(&self) -> impl Iterator<Item = f64> + '_ {
        self.bands.iter().map(|(b, _)| *b)
    }
}

/// Table mapping filtered magnitude (g) to the raw status output.
///
/// Default: < 0.2 stable, < 0.5 anomaly, < 1.0 warning, else critical.
/// The raw path never yields `Collapse`.
pub fn magnitude_status_table(t: &StatusThresholds) -> ThresholdTable<NodeStatus> {
    ThresholdTable::new(
        vec![
            (t.stable_below_g, NodeStatus::Stable),
            (t.anomaly_below_g, NodeStatus::Anomaly),
            (t.warning_below_g, NodeStatus::Warning),
        ],
        NodeStatus::Critical,
    )
}

/// Classify a filtered magnitude with the raw threshold scheme.
pub fn interpret_magnitude(filtered_magnitude: f64, t: &StatusThresholds) -> NodeStatus {
    magnitude_status_table(t).lookup(filtered_magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Band {
        Low,
        Mid,
        High,
    }

    fn table() -> ThresholdTable<Band> {
        ThresholdTable::new(vec![(10.0, Band::Low), (20.0, Band::Mid)], Band::High)
    }

    #[test]
    fn test_lookup_upper_bound_is_exclusive() {
        let t = table();
        assert_eq!(t.lookup(9.999), Band::Low);
        assert_eq!(t.lookup(10.0), Band::Mid);
        assert_eq!(t.lookup(19.999), Band::Mid);
        assert_eq!(t.lookup(20.0), Band::High);
    }

    #[test]
    fn test_lookup_negative_and_nan() {
        let t = table();
        assert_eq!(t.lookup(-5.0), Band::Low);
        assert_eq!(t.lookup(f64::NAN), Band::High);
    }

    #[test]
    fn test_interpret_magnitude_defaults() {
        let t = StatusThresholds::default();
        assert_eq!(interpret_magnitude(0.001, &t), NodeStatus::Stable);
        assert_eq!(interpret_magnitude(0.2, &t), NodeStatus::Anomaly);
        assert_eq!(interpret_magnitude(0.49, &t), NodeStatus::Anomaly);
        assert_eq!(interpret_magnitude(0.5, &t), NodeStatus::Warning);
        assert_eq!(interpret_magnitude(1.0, &t), NodeStatus::Critical);
        assert_eq!(interpret_magnitude(3.0, &t), NodeStatus::Critical);
    }
}
