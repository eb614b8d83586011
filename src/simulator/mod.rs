//! Earthquake Simulator
//!
//! Synthetic reading producer for demos and tests. It is an external data
//! source as far as the pipeline is concerned: it only ever emits
//! `SensorReading`s.
//!
//! - Background ticks: every node reports tiny uniform noise.
//! - Earthquake ticks: a sine envelope over the event duration, attenuated
//!   by distance from the epicenter and randomized per node, with a vertical
//!   bias on z.
//! - Optional structural failure: a node whose instantaneous intensity
//!   exceeds `failure_intensity` stops reporting until reset.
//!
//! All randomness goes through [`NoiseSource`] so tests can inject a fixed
//! sequence.

pub mod scheduler;

use std::collections::HashSet;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::defaults::{
    DEFAULT_EARTHQUAKE_DURATION_MS, DEMO_INTENSITY_MIN_G, DEMO_INTENSITY_SPREAD_G,
    DISTANCE_ATTENUATION_PER_DEG, MIN_DISTANCE_FACTOR, VERTICAL_BIAS,
};
use crate::config::SimulationConfig;
use crate::types::{Node, SensorReading};
use scheduler::{Scheduler, TimerKind};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum SimulatorError {
    #[error("Unknown epicenter node: {0}")]
    UnknownEpicenter(String),

    #[error("Earthquake intensity must be a positive finite number, got {0}")]
    InvalidIntensity(f64),

    #[error("Earthquake duration must be > 0 ms")]
    InvalidDuration,

    #[error("Simulator has no nodes")]
    NoNodes,
}

// ============================================================================
// Noise Injection
// ============================================================================

/// Source of uniform samples in `[0, 1)`.
pub trait NoiseSource: Send {
    fn next_unit(&mut self) -> f64;
}

/// `StdRng`-backed noise; seeded for reproducible runs.
pub struct SeededNoise {
    rng: StdRng,
}

impl SeededNoise {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::new)
    }
}

impl NoiseSource for SeededNoise {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed sequence, cycling when exhausted.
pub struct FixedNoise {
    values: Vec<f64>,
    index: usize,
}

impl FixedNoise {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, index: 0 }
    }

    /// Always returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl NoiseSource for FixedNoise {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.5;
        }
        let v = self.values[self.index % self.values.len()];
        self.index = self.index.wrapping_add(1);
        v
    }
}

// ============================================================================
// Demo Nodes
// ============================================================================

/// `count` nodes named `node-1..` / `Bina 1..` at random positions inside
/// the configured bounding box.
pub fn generate_demo_nodes(config: &SimulationConfig, noise: &mut dyn NoiseSource) -> Vec<Node> {
    (1..=config.node_count)
        .map(|i| {
            let lat = config.min_lat + noise.next_unit() * (config.max_lat - config.min_lat);
            let lng = config.min_lng + noise.next_unit() * (config.max_lng - config.min_lng);
            Node::new(format!("node-{i}"), format!("Bina {i}"), lat, lng)
        })
        .collect()
}

/// Demo layout for a site plus the noise stream positioned after it.
///
/// The simulator binary and a `--stdin` monitor given the same seed and
/// `[simulation]` section derive identical node positions.
pub fn demo_site(config: &SimulationConfig, seed: Option<u64>) -> (Vec<Node>, SeededNoise) {
    let mut noise = SeededNoise::from_optional_seed(seed);
    let nodes = generate_demo_nodes(config, &mut noise);
    (nodes, noise)
}

// ============================================================================
// Earthquake Parameters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarthquakeConfig {
    /// Peak intensity (g), typically 0.5-2.0
    pub intensity_g: f64,
    pub duration_ms: u64,
    pub epicenter_lat: f64,
    pub epicenter_lng: f64,
    /// Nodes whose instantaneous intensity exceeds this stop reporting
    #[serde(default)]
    pub failure_intensity: Option<f64>,
}

impl EarthquakeConfig {
    /// Event centered on an existing node.
    pub fn at_node(
        nodes: &[Node],
        node_id: &str,
        intensity_g: f64,
        duration_ms: u64,
    ) -> Result<Self, SimulatorError> {
        let node = nodes
            .iter()
            .find(|n| n.id == node_id)
            .ok_or_else(|| SimulatorError::UnknownEpicenter(node_id.to_string()))?;
        let config = Self {
            intensity_g,
            duration_ms,
            epicenter_lat: node.lat,
            epicenter_lng: node.lng,
            failure_intensity: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Dashboard-style random event: 1.5-2.0 g for 6 s at a random node.
    pub fn random_demo(
        nodes: &[Node],
        noise: &mut dyn NoiseSource,
    ) -> Result<Self, SimulatorError> {
        if nodes.is_empty() {
            return Err(SimulatorError::NoNodes);
        }
        let idx = ((noise.next_unit() * nodes.len() as f64) as usize).min(nodes.len() - 1);
        let intensity = DEMO_INTENSITY_MIN_G + noise.next_unit() * DEMO_INTENSITY_SPREAD_G;
        Self::at_node(nodes, &nodes[idx].id, intensity, DEFAULT_EARTHQUAKE_DURATION_MS)
    }

    pub fn with_failure_intensity(mut self, threshold_g: f64) -> Self {
        self.failure_intensity = Some(threshold_g);
        self
    }

    pub fn validate(&self) -> Result<(), SimulatorError> {
        if !self.intensity_g.is_finite() || self.intensity_g <= 0.0 {
            return Err(SimulatorError::InvalidIntensity(self.intensity_g));
        }
        if self.duration_ms == 0 {
            return Err(SimulatorError::InvalidDuration);
        }
        Ok(())
    }
}

/// Attenuation by lat/lng distance in degrees: `max(0.3, 1 - 50·d)`.
pub fn distance_factor(node: &Node, epicenter_lat: f64, epicenter_lng: f64) -> f64 {
    let d = (node.lat - epicenter_lat).hypot(node.lng - epicenter_lng);
    (1.0 - d * DISTANCE_ATTENUATION_PER_DEG).max(MIN_DISTANCE_FACTOR)
}

#[derive(Debug, Clone)]
struct ActiveEarthquake {
    config: EarthquakeConfig,
    tick: u64,
    total_ticks: u64,
}

/// Readings and progress from one earthquake tick.
#[derive(Debug, Clone)]
pub struct EarthquakeTick {
    pub readings: Vec<SensorReading>,
    /// 0-100
    pub progress: f64,
    pub complete: bool,
    /// Nodes that failed during this tick
    pub newly_failed: Vec<String>,
}

// ============================================================================
// Simulator
// ============================================================================

pub struct EarthquakeSimulator {
    nodes: Vec<Node>,
    noise: Box<dyn NoiseSource>,
    idle_noise_g: f64,
    tick_ms: u64,
    active: Option<ActiveEarthquake>,
    failed: HashSet<String>,
}

impl EarthquakeSimulator {
    pub fn new(nodes: Vec<Node>, config: &SimulationConfig, noise: Box<dyn NoiseSource>) -> Self {
        Self {
            nodes,
            noise,
            idle_noise_g: config.idle_noise_g,
            tick_ms: config.earthquake_tick_ms.max(1),
            active: None,
            failed: HashSet::new(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn noise_mut(&mut self) -> &mut dyn NoiseSource {
        self.noise.as_mut()
    }

    fn axis(&mut self, scale: f64) -> f64 {
        (self.noise.next_unit() - 0.5) * scale
    }

    /// One background reading per reporting node.
    pub fn background_tick(&mut self, timestamp: DateTime<Utc>) -> Vec<SensorReading> {
        let noise = self.idle_noise_g;
        let ids: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| !self.failed.contains(&n.id))
            .map(|n| n.id.clone())
            .collect();
        ids.into_iter()
            .map(|id| {
                let (x, y, z) = (self.axis(noise), self.axis(noise), self.axis(noise));
                SensorReading::from_axes(id, x, y, z, timestamp)
            })
            .collect()
    }

    /// Arm a new earthquake, replacing any running one.
    pub fn trigger_earthquake(&mut self, config: EarthquakeConfig) -> Result<(), SimulatorError> {
        config.validate()?;
        let total_ticks = config.duration_ms.div_ceil(self.tick_ms).max(1);
        info!(
            intensity_g = config.intensity_g,
            duration_ms = config.duration_ms,
            epicenter_lat = config.epicenter_lat,
            epicenter_lng = config.epicenter_lng,
            "Earthquake triggered"
        );
        self.active = Some(ActiveEarthquake {
            config,
            tick: 0,
            total_ticks,
        });
        Ok(())
    }

    pub fn is_earthquake_active(&self) -> bool {
        self.active.is_some()
    }

    /// Advance the active earthquake by one tick. `None` when idle.
    pub fn earthquake_tick(&mut self, timestamp: DateTime<Utc>) -> Option<EarthquakeTick> {
        let mut quake = self.active.take()?;
        quake.tick += 1;
        let fraction = quake.tick as f64 / quake.total_ticks as f64;
        let envelope = (fraction * PI).sin();

        let mut readings = Vec::with_capacity(self.nodes.len());
        let mut newly_failed = Vec::new();
        let nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|n| !self.failed.contains(&n.id))
            .cloned()
            .collect();

        for node in &nodes {
            let distance =
                distance_factor(node, quake.config.epicenter_lat, quake.config.epicenter_lng);
            let random = 0.5 + self.noise.next_unit();
            let intensity = quake.config.intensity_g * envelope * distance * random;

            let x = self.axis(intensity);
            let y = self.axis(intensity);
            let z = self.axis(intensity) + intensity * VERTICAL_BIAS;
            readings.push(SensorReading::from_axes(node.id.clone(), x, y, z, timestamp));

            if quake.config.failure_intensity.is_some_and(|f| intensity > f) {
                warn!(
                    node = %node.id,
                    intensity_g = intensity,
                    "Simulated structural failure, node goes silent"
                );
                self.failed.insert(node.id.clone());
                newly_failed.push(node.id.clone());
            }
        }

        let complete = quake.tick >= quake.total_ticks;
        let progress = (fraction * 100.0).min(100.0);
        if complete {
            info!(ticks = quake.tick, failed = self.failed.len(), "Earthquake complete");
        } else {
            self.active = Some(quake);
        }

        Some(EarthquakeTick {
            readings,
            progress,
            complete,
            newly_failed,
        })
    }

    pub fn failed_nodes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.failed.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop any earthquake and bring failed nodes back.
    pub fn reset(&mut self) {
        self.active = None;
        self.failed.clear();
    }
}

// ============================================================================
// Live Driver
// ============================================================================

pub type SharedSimulator = Arc<Mutex<EarthquakeSimulator>>;

/// A poisoned lock only means a tick panicked; the simulator state is still usable.
fn lock(sim: &SharedSimulator) -> MutexGuard<'_, EarthquakeSimulator> {
    sim.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Runs the simulator on timers, pushing each tick into a channel.
///
/// At most one idle interval and one earthquake interval run at a time.
pub struct SimulationController {
    simulator: SharedSimulator,
    scheduler: Scheduler,
    tx: mpsc::Sender<Vec<SensorReading>>,
    idle_tick: Duration,
    earthquake_tick: Duration,
}

impl SimulationController {
    pub fn new(
        simulator: EarthquakeSimulator,
        config: &SimulationConfig,
        tx: mpsc::Sender<Vec<SensorReading>>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            simulator: Arc::new(Mutex::new(simulator)),
            scheduler,
            tx,
            idle_tick: Duration::from_millis(config.idle_tick_ms.max(1)),
            earthquake_tick: Duration::from_millis(config.earthquake_tick_ms.max(1)),
        }
    }

    pub fn simulator(&self) -> SharedSimulator {
        Arc::clone(&self.simulator)
    }

    /// Random demo earthquake drawn from the simulator's own noise source.
    pub fn random_earthquake(&self) -> Result<EarthquakeConfig, SimulatorError> {
        let mut sim = lock(&self.simulator);
        let nodes = sim.nodes().to_vec();
        EarthquakeConfig::random_demo(&nodes, sim.noise_mut())
    }

    /// Start background noise.
    pub fn start(&mut self) {
        let sim = Arc::clone(&self.simulator);
        let tx = self.tx.clone();
        self.scheduler.start_interval(TimerKind::Idle, self.idle_tick, move || {
            let batch = lock(&sim).background_tick(Utc::now());
            send(&tx, batch)
        });
        info!(period_ms = self.idle_tick.as_millis() as u64, "Simulator started");
    }

    /// Start an earthquake. `on_progress` gets 0-100 after every tick;
    /// `on_complete` runs once after the last tick.
    pub fn trigger_earthquake<P, C>(
        &mut self,
        config: EarthquakeConfig,
        mut on_progress: P,
        on_complete: C,
    ) -> Result<(), SimulatorError>
    where
        P: FnMut(f64) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        lock(&self.simulator).trigger_earthquake(config)?;

        let sim = Arc::clone(&self.simulator);
        let tx = self.tx.clone();
        let mut on_complete = Some(on_complete);
        self.scheduler
            .start_interval(TimerKind::Earthquake, self.earthquake_tick, move || {
                let Some(tick) = lock(&sim).earthquake_tick(Utc::now()) else {
                    return scheduler::TickFlow::Stop;
                };
                on_progress(tick.progress);
                let flow = send(&tx, tick.readings);
                if tick.complete {
                    if let Some(done) = on_complete.take() {
                        done();
                    }
                    return scheduler::TickFlow::Stop;
                }
                flow
            });
        Ok(())
    }

    /// Cancel every timer.
    pub fn stop(&mut self) {
        self.scheduler.stop_all();
        info!("Simulator stopped");
    }

    /// Cancel the earthquake timer and bring failed nodes back online.
    pub fn reset(&mut self) {
        self.scheduler.stop(TimerKind::Earthquake);
        lock(&self.simulator).reset();
    }

    pub fn is_running(&self, kind: TimerKind) -> bool {
        self.scheduler.is_running(kind)
    }
}

/// Non-blocking send; a closed channel stops the timer, a full one drops the tick.
fn send(tx: &mpsc::Sender<Vec<SensorReading>>, batch: Vec<SensorReading>) -> scheduler::TickFlow {
    if batch.is_empty() {
        return scheduler::TickFlow::Continue;
    }
    match tx.try_send(batch) {
        Ok(()) => scheduler::TickFlow::Continue,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Reading channel full, dropping tick");
            scheduler::TickFlow::Continue
        }
        Err(mpsc::error::TrySendError::Closed(_)) => scheduler::TickFlow::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_config(count: usize) -> SimulationConfig {
        SimulationConfig {
            node_count: count,
            ..SimulationConfig::default()
        }
    }

    fn simulator(count: usize, noise: Box<dyn NoiseSource>) -> EarthquakeSimulator {
        let cfg = sim_config(count);
        let nodes = generate_demo_nodes(&cfg, &mut SeededNoise::new(1));
        EarthquakeSimulator::new(nodes, &cfg, noise)
    }

    #[test]
    fn test_demo_nodes_inside_bounding_box() {
        let cfg = SimulationConfig::default();
        let nodes = generate_demo_nodes(&cfg, &mut SeededNoise::new(42));
        assert_eq!(nodes.len(), 80);
        assert_eq!(nodes[0].id, "node-1");
        assert_eq!(nodes[79].name, "Bina 80");
        for n in &nodes {
            assert!((cfg.min_lat..cfg.max_lat).contains(&n.lat));
            assert!((cfg.min_lng..cfg.max_lng).contains(&n.lng));
            assert!(!n.is_physical);
        }
    }

    #[test]
    fn test_seeded_nodes_are_reproducible() {
        let cfg = SimulationConfig::default();
        let a = generate_demo_nodes(&cfg, &mut SeededNoise::new(7));
        let b = generate_demo_nodes(&cfg, &mut SeededNoise::new(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_background_noise_is_tiny() {
        let mut sim = simulator(10, Box::new(SeededNoise::new(3)));
        let batch = sim.background_tick(Utc::now());
        assert_eq!(batch.len(), 10);
        // each axis within ±0.0005 g
        assert!(batch.iter().all(|r| r.magnitude < 0.001));
    }

    #[test]
    fn test_fixed_noise_gives_zero_background() {
        let mut sim = simulator(3, Box::new(FixedNoise::constant(0.5)));
        let batch = sim.background_tick(Utc::now());
        assert!(batch.iter().all(|r| r.magnitude == 0.0));
    }

    #[test]
    fn test_distance_factor_floor() {
        let node = Node::new("a", "A", 41.03, 28.95);
        assert_eq!(distance_factor(&node, 41.03, 28.95), 1.0);
        assert!((distance_factor(&node, 41.03, 28.948) - 0.9).abs() < 1e-9);
        assert_eq!(distance_factor(&node, 40.0, 28.0), 0.3);
    }

    #[test]
    fn test_earthquake_envelope_and_completion() {
        let mut sim = simulator(1, Box::new(FixedNoise::constant(0.5)));
        let epicenter = sim.nodes()[0].clone();
        let config = EarthquakeConfig::at_node(sim.nodes(), &epicenter.id, 2.0, 200).unwrap();
        sim.trigger_earthquake(config).unwrap();

        // 200 ms / 50 ms = 4 ticks; noise 0.5 -> random factor 1.0, x = y = 0
        let mut zs = Vec::new();
        let mut last = None;
        while let Some(tick) = sim.earthquake_tick(Utc::now()) {
            zs.push(tick.readings[0].accel_z);
            last = Some(tick);
        }
        let last = last.unwrap();
        assert!(last.complete);
        assert_eq!(last.progress, 100.0);
        assert_eq!(zs.len(), 4);
        // peak at the middle tick: 2.0 * sin(π/2) * 0.3
        assert!((zs[1] - 0.6).abs() < 1e-9);
        assert!(zs[3].abs() < 1e-9);
        assert!(!sim.is_earthquake_active());
    }

    #[test]
    fn test_failure_intensity_silences_node() {
        let mut sim = simulator(5, Box::new(FixedNoise::constant(0.5)));
        let id = sim.nodes()[0].id.clone();
        let config = EarthquakeConfig::at_node(sim.nodes(), &id, 2.0, 1_000)
            .unwrap()
            .with_failure_intensity(0.4);
        sim.trigger_earthquake(config).unwrap();

        let mut failed = Vec::new();
        while let Some(tick) = sim.earthquake_tick(Utc::now()) {
            failed.extend(tick.newly_failed);
        }
        assert!(failed.contains(&id));
        let batch = sim.background_tick(Utc::now());
        assert!(batch.iter().all(|r| r.node_id != id));

        sim.reset();
        assert!(sim.failed_nodes().is_empty());
        assert_eq!(sim.background_tick(Utc::now()).len(), 5);
    }

    #[test]
    fn test_invalid_earthquake_rejected() {
        let mut sim = simulator(2, Box::new(SeededNoise::new(1)));
        let nodes = sim.nodes().to_vec();
        assert_eq!(
            EarthquakeConfig::at_node(&nodes, "node-99", 1.0, 1_000),
            Err(SimulatorError::UnknownEpicenter("node-99".to_string()))
        );
        let mut bad = EarthquakeConfig::at_node(&nodes, "node-1", 1.0, 1_000).unwrap();
        bad.duration_ms = 0;
        assert_eq!(sim.trigger_earthquake(bad), Err(SimulatorError::InvalidDuration));
        assert!(EarthquakeConfig::at_node(&nodes, "node-1", f64::NAN, 1_000).is_err());
    }

    #[test]
    fn test_random_demo_parameters() {
        let mut sim = simulator(10, Box::new(SeededNoise::new(9)));
        let nodes = sim.nodes().to_vec();
        let cfg = EarthquakeConfig::random_demo(&nodes, sim.noise_mut()).unwrap();
        assert!((1.5..2.0).contains(&cfg.intensity_g));
        assert_eq!(cfg.duration_ms, 6_000);
        assert!(nodes.iter().any(|n| n.lat == cfg.epicenter_lat && n.lng == cfg.epicenter_lng));
        assert_eq!(
            EarthquakeConfig::random_demo(&[], sim.noise_mut()),
            Err(SimulatorError::NoNodes)
        );
    }

    #[tokio::test]
    async fn test_controller_runs_earthquake_to_completion() {
        let cfg = sim_config(3);
        let nodes = generate_demo_nodes(&cfg, &mut SeededNoise::new(5));
        let sim = EarthquakeSimulator::new(nodes.clone(), &cfg, Box::new(SeededNoise::new(5)));
        let (tx, mut rx) = mpsc::channel(256);
        let mut controller = SimulationController::new(sim, &cfg, tx, Scheduler::new());

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let quake = EarthquakeConfig::at_node(&nodes, "node-1", 1.8, 200).unwrap();
        controller
            .trigger_earthquake(quake, |_| {}, move || {
                let _ = done_tx.send(());
            })
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .unwrap()
            .unwrap();
        let mut batches = 0;
        while let Ok(batch) = rx.try_recv() {
            assert_eq!(batch.len(), 3);
            batches += 1;
        }
        assert_eq!(batches, 4);
        controller.stop();
        assert!(!controller.is_running(TimerKind::Earthquake));
    }
}
