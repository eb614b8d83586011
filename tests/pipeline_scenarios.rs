//! End-to-end pipeline scenarios
//!
//! Feeds synthetic readings through `SignalProcessor` and `MonitorState`
//! the same way the processing loop does.

use chrono::{DateTime, TimeZone, Utc};
use seismos::config::MonitorConfig;
use seismos::pipeline::{MonitorState, SignalProcessor};
use seismos::processing::{
    check_correlation, DamageCategory, DamageFeatures, DamageScoreCalculator, FilterChain,
    FeatureExtractor, RecentReadings, ZeroCrossingEstimator,
};
use seismos::simulator::{
    generate_demo_nodes, EarthquakeConfig, EarthquakeSimulator, FixedNoise, SeededNoise,
};
use seismos::types::{Node, NodeStatus, SensorReading};

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap()
}

fn reading(node: &str, magnitude: f64, ts_ms: i64) -> SensorReading {
    SensorReading::from_axes(node, 0.0, 0.0, magnitude, at(ts_ms))
}

// ============================================================================
// Quiet input
// ============================================================================

#[test]
fn near_zero_readings_stay_stable() {
    let mut processor = SignalProcessor::new(&MonitorConfig::default());
    for i in 0..20 {
        let result = processor.process(&reading("node-1", 0.001, i * 50));
        assert_eq!(result.status, NodeStatus::Stable, "reading {i}");
        assert!(!result.is_correlated);
        assert_eq!(result.damage.category, DamageCategory::Safe);
    }
    assert_eq!(processor.stats().readings_processed, 20);
}

// ============================================================================
// Correlation
// ============================================================================

#[test]
fn strong_shaking_on_two_nodes_in_one_tick_is_correlated() {
    let mut processor = SignalProcessor::new(&MonitorConfig::default());
    let results =
        processor.process_tick(&[reading("node-1", 1.5, 1_000), reading("node-2", 1.5, 1_000)]);

    assert_eq!(results.len(), 2);
    for r in &results {
        assert!(r.is_correlated, "{} should be correlated", r.reading.node_id);
        assert_eq!(r.correlated_nodes, vec!["node-1".to_string(), "node-2".to_string()]);
        assert!(r.event_id.is_some());
        assert!(r.stages.correlate.complete);
    }
    assert_eq!(processor.stats().correlated_events, 1);
}

#[test]
fn strong_shaking_within_window_correlates_sequentially() {
    let mut processor = SignalProcessor::new(&MonitorConfig::default());
    let first = processor.process(&reading("node-1", 1.5, 1_000));
    assert!(!first.is_correlated, "a single node never correlates");

    let second = processor.process(&reading("node-2", 1.5, 1_300));
    assert!(second.is_correlated);
    assert_eq!(second.correlated_nodes.len(), 2);
}

#[test]
fn shaking_outside_window_is_not_correlated() {
    let mut processor = SignalProcessor::new(&MonitorConfig::default());
    processor.process(&reading("node-1", 1.5, 1_000));
    let late = processor.process(&reading("node-2", 1.5, 1_600));
    assert!(!late.is_correlated);
}

#[test]
fn correlation_needs_two_qualifying_nodes() {
    let mut recent = RecentReadings::new();
    recent.record("a", 0.6, 1_000);
    recent.record("b", 0.6, 1_200);
    let both = check_correlation(&recent, 1_300, 0.5, 500, 2);
    assert!(both.is_correlated);
    assert_eq!(both.correlated_nodes, vec!["a".to_string(), "b".to_string()]);

    let mut recent = RecentReadings::new();
    recent.record("a", 0.6, 1_000);
    recent.record("b", 0.1, 1_200);
    assert!(!check_correlation(&recent, 1_300, 0.5, 500, 2).is_correlated);
}

// ============================================================================
// Scoring
// ============================================================================

#[test]
fn category_boundaries_are_exclusive_upper_bounds() {
    let calc = DamageScoreCalculator::default();
    assert_eq!(calc.categorize(29.0), DamageCategory::Safe);
    assert_eq!(calc.categorize(30.0), DamageCategory::Risky);
    assert_eq!(calc.categorize(59.0), DamageCategory::Risky);
    assert_eq!(calc.categorize(60.0), DamageCategory::HeavilyDamaged);
}

#[test]
fn score_is_bounded_for_extreme_features() {
    let calc = DamageScoreCalculator::default();
    for (shift, energy, duration) in [(-500.0, 3.0, 1e6), (0.0, -1.0, -5.0), (f64::NAN, 0.5, 1.0)] {
        let score = calc.calculate(&DamageFeatures {
            frequency_shift: shift,
            peak_energy: energy,
            abnormal_duration: duration,
            current_frequency: 5.0,
            baseline_frequency: 5.0,
        });
        assert!((0.0..=100.0).contains(&score.score), "score {} out of range", score.score);
    }
}

// ============================================================================
// Reset idempotence
// ============================================================================

#[test]
fn reset_reproduces_identical_outputs() {
    let config = MonitorConfig::default();
    let input: Vec<f64> = (0..60).map(|i| ((i as f64) * 0.7).sin().abs() * 1.2).collect();

    let mut chain = FilterChain::new(&config.filters);
    let mut estimator = ZeroCrossingEstimator::new(&config.frequency);
    let mut extractor = FeatureExtractor::new(&config.features);

    let run = |chain: &mut FilterChain,
               est: &mut ZeroCrossingEstimator,
               ext: &mut FeatureExtractor| {
        input
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                let f = chain.apply(m);
                let hz = est.estimate(m);
                ext.extract(f, hz, 5.0, i as i64 * 50)
            })
            .collect::<Vec<_>>()
    };

    let first = run(&mut chain, &mut estimator, &mut extractor);
    chain.reset();
    estimator.reset();
    extractor.reset();
    let second = run(&mut chain, &mut estimator, &mut extractor);
    assert_eq!(first, second);
}

#[test]
fn processor_reset_forgets_all_nodes() {
    let mut processor = SignalProcessor::new(&MonitorConfig::default());
    let baseline: Vec<_> = (0..15).map(|i| processor.process(&reading("n", 0.3, i * 50))).collect();

    processor.reset(0);
    assert_eq!(processor.node_count(), 0);
    assert!(processor.recent_readings().is_empty());

    let replay: Vec<_> = (0..15).map(|i| processor.process(&reading("n", 0.3, i * 50))).collect();
    for (a, b) in baseline.iter().zip(&replay) {
        assert_eq!(a.filtered_magnitude, b.filtered_magnitude);
        assert_eq!(a.damage, b.damage);
    }
}

// ============================================================================
// Monitor state
// ============================================================================

#[test]
fn state_tracks_peak_summary_and_reset() {
    let config = MonitorConfig::default();
    let nodes = vec![Node::new("a", "A", 41.03, 28.95), Node::new("b", "B", 41.03, 28.95)];
    let mut state = MonitorState::new(&config.damage);
    state.set_nodes(nodes);

    let mut processor = SignalProcessor::new(&config);
    let results = processor.process_tick(&[reading("a", 1.5, 0), reading("b", 0.001, 0)]);
    state.apply_tick(results);

    assert_eq!(state.readings_processed, 2);
    assert_eq!(state.peak_magnitude, 1.5);
    assert_eq!(state.node("a").map(|n| n.status), Some(NodeStatus::Critical));
    let summary = state.update_building_summary();
    assert_eq!(summary.total(), 2);

    state.reset_to_safe();
    assert!(state.results.is_empty());
    assert!(state.nodes.values().all(|n| n.status == NodeStatus::Stable));
    assert_eq!(state.summary.safe, 2);
}

// ============================================================================
// Simulator into pipeline
// ============================================================================

#[test]
fn simulated_earthquake_correlates_and_raises_scores() {
    let config = MonitorConfig::default();
    let mut sim_config = config.simulation.clone();
    sim_config.node_count = 10;
    let nodes = generate_demo_nodes(&sim_config, &mut SeededNoise::new(11));
    let mut sim =
        EarthquakeSimulator::new(nodes.clone(), &sim_config, Box::new(SeededNoise::new(11)));
    let mut processor = SignalProcessor::new(&config);
    processor.register_nodes(&nodes, 0);

    for i in 0..20 {
        processor.process_tick(&sim.background_tick(at(i * 100)));
    }

    let quake = EarthquakeConfig::at_node(&nodes, "node-1", 2.0, 2_000).unwrap();
    sim.trigger_earthquake(quake).unwrap();
    let mut t = 2_000;
    let mut correlated = false;
    let mut max_score: f64 = 0.0;
    while let Some(tick) = sim.earthquake_tick(at(t)) {
        for r in processor.process_tick(&tick.readings) {
            correlated |= r.is_correlated;
            max_score = max_score.max(r.damage.score);
        }
        t += 50;
    }

    assert!(correlated);
    assert!(max_score > 0.0);
    assert!(processor.stats().correlated_events >= 1);
}

#[test]
fn fixed_noise_background_is_silent_signal() {
    let config = MonitorConfig::default();
    let nodes = generate_demo_nodes(&config.simulation, &mut FixedNoise::constant(0.5));
    let mut sim =
        EarthquakeSimulator::new(nodes, &config.simulation, Box::new(FixedNoise::constant(0.5)));
    let mut processor = SignalProcessor::new(&config);
    let results = processor.process_tick(&sim.background_tick(at(0)));
    assert_eq!(results.len(), 80);
    assert!(results.iter().all(|r| r.filtered_magnitude == 0.0 && r.status == NodeStatus::Stable));
}
