//! Earthquake Scenario Simulation
//!
//! Generates sensor readings for a district of instrumented buildings and
//! writes them to stdout as JSON, one tick (array of readings) per line.
//! The scenario runs in virtual time:
//! - Quiet period (background noise, baseline learning)
//! - Earthquake (sine envelope, distance attenuation)
//! - Aftermath (background noise, failed nodes stay silent)
//!
//! # Usage
//! ```bash
//! ./simulation --seed 7 --failure-intensity 1.2 | ./seismos --stdin --seed 7
//! ```

use chrono::{DateTime, Utc};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use seismos::config::defaults::DEFAULT_EARTHQUAKE_DURATION_MS;
use seismos::config::MonitorConfig;
use seismos::simulator::{demo_site, EarthquakeConfig, EarthquakeSimulator};
use seismos::types::{magnitude, SensorReading};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "seismos-simulation")]
#[command(about = "Earthquake scenario generator for Seismos testing")]
#[command(version = "1.0")]
struct Args {
    /// Site config (only the [simulation] section is used)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of buildings (overrides config)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=10_000))]
    nodes: Option<u32>,

    /// Seconds of background noise before the earthquake
    #[arg(long, default_value = "5")]
    quiet_secs: u64,

    /// Seconds of background noise after the earthquake
    #[arg(long, default_value = "5")]
    aftermath_secs: u64,

    /// Peak intensity in g (default: random 1.5-2.0)
    #[arg(short, long)]
    intensity: Option<f64>,

    /// Earthquake duration in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_EARTHQUAKE_DURATION_MS)]
    duration_ms: u64,

    /// Buildings shaking harder than this (g) stop reporting
    #[arg(long)]
    failure_intensity: Option<f64>,

    /// Gaussian sensor noise added to every axis (g, standard deviation)
    #[arg(long, default_value = "0.0")]
    sensor_noise_g: f64,

    /// Pace output in real time instead of as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Suppress mission log (only output readings)
    #[arg(short, long)]
    quiet: bool,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

// ============================================================================
// Scenario Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Quiet,
    Earthquake,
    Aftermath,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Quiet => "Quiet (baseline learning)",
            Phase::Earthquake => "EARTHQUAKE",
            Phase::Aftermath => "Aftermath",
        }
    }
}

/// Adds zero-mean Gaussian measurement noise on top of simulated readings.
struct SensorNoise {
    rng: StdRng,
    dist: Option<Normal<f64>>,
}

impl SensorNoise {
    fn new(std_dev_g: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        let dist = (std_dev_g > 0.0).then(|| Normal::new(0.0, std_dev_g).ok()).flatten();
        Self { rng, dist }
    }

    fn apply(&mut self, readings: &mut [SensorReading]) {
        let Some(dist) = self.dist else { return };
        for r in readings.iter_mut() {
            r.accel_x += dist.sample(&mut self.rng);
            r.accel_y += dist.sample(&mut self.rng);
            r.accel_z += dist.sample(&mut self.rng);
            r.magnitude = magnitude(r.accel_x, r.accel_y, r.accel_z);
        }
    }
}

// ============================================================================
// Output Helpers
// ============================================================================

fn format_time(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}.{:03}", secs / 60, secs % 60, ms % 1000)
}

fn log_mission(time_ms: u64, message: &str, quiet: bool) {
    if !quiet {
        eprintln!("[{}] {}", format_time(time_ms), message);
    }
}

fn at(start: DateTime<Utc>, offset_ms: u64) -> DateTime<Utc> {
    start + chrono::Duration::milliseconds(offset_ms as i64)
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Config warnings go to stderr with the mission log
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => MonitorConfig::load_from_file(path)?,
        None => MonitorConfig::load(),
    };
    let mut sim_config = config.simulation.clone();
    if let Some(n) = args.nodes {
        sim_config.node_count = n as usize;
    }

    let (nodes, noise) = demo_site(&sim_config, args.seed);
    let mut simulator = EarthquakeSimulator::new(nodes.clone(), &sim_config, Box::new(noise));
    let mut sensor_noise = SensorNoise::new(args.sensor_noise_g, args.seed);

    let mut quake = EarthquakeConfig::random_demo(&nodes, simulator.noise_mut())?;
    if let Some(intensity) = args.intensity {
        quake.intensity_g = intensity;
    }
    quake.duration_ms = args.duration_ms;
    quake.failure_intensity = args.failure_intensity;
    quake.validate()?;

    let tick_ms = sim_config.earthquake_tick_ms.max(1);
    let idle_ms = sim_config.idle_tick_ms.max(1);
    let quake_start = args.quiet_secs * 1000;
    let quake_end = quake_start + quake.duration_ms;
    let total_ms = quake_end + args.aftermath_secs * 1000;

    // Mission briefing
    let rule = "=".repeat(70);
    log_mission(0, &rule, args.quiet);
    log_mission(0, "SEISMOS EARTHQUAKE SIMULATION v1.0", args.quiet);
    log_mission(0, &rule, args.quiet);
    log_mission(0, &format!("  Buildings: {}", nodes.len()), args.quiet);
    log_mission(0, &format!("  Intensity: {:.2} g", quake.intensity_g), args.quiet);
    log_mission(0, &format!("  Duration: {} ms", quake.duration_ms), args.quiet);
    log_mission(
        0,
        &format!("  Epicenter: {:.5}, {:.5}", quake.epicenter_lat, quake.epicenter_lng),
        args.quiet,
    );
    if let Some(f) = quake.failure_intensity {
        log_mission(0, &format!("  Failure intensity: {:.2} g", f), args.quiet);
    }
    if let Some(seed) = args.seed {
        log_mission(0, &format!("  Random seed: {}", seed), args.quiet);
    }
    log_mission(0, &rule, args.quiet);

    let start = Utc::now();
    let wall_start = Instant::now();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut phase = Phase::Quiet;
    let mut ticks_written = 0u64;
    let mut readings_written = 0u64;
    let mut last_progress_decile = 0;
    log_mission(0, &format!(">>> PHASE: {}", phase.name()), args.quiet);

    let mut t = 0u64;
    while t <= total_ms {
        if phase == Phase::Quiet && t >= quake_start {
            phase = Phase::Earthquake;
            log_mission(t, &format!(">>> PHASE: {}", phase.name()), args.quiet);
            simulator.trigger_earthquake(quake.clone())?;
        }

        let ts = at(start, t);
        let mut batches = Vec::with_capacity(2);
        if t % idle_ms == 0 {
            batches.push(simulator.background_tick(ts));
        }
        if let Some(tick) = simulator.earthquake_tick(ts) {
            for id in &tick.newly_failed {
                log_mission(t, &format!("    {} stopped reporting", id), args.quiet);
            }
            let decile = (tick.progress / 10.0) as u32;
            if decile > last_progress_decile {
                last_progress_decile = decile;
                log_mission(t, &format!("    Progress: {:.0}%", tick.progress), args.quiet);
            }
            batches.push(tick.readings);
            if tick.complete {
                phase = Phase::Aftermath;
                log_mission(t, &format!(">>> PHASE: {}", phase.name()), args.quiet);
            }
        }

        for mut batch in batches {
            if batch.is_empty() {
                continue;
            }
            sensor_noise.apply(&mut batch);
            writeln!(out, "{}", serde_json::to_string(&batch)?)?;
            ticks_written += 1;
            readings_written += batch.len() as u64;
        }
        out.flush()?;

        t += tick_ms;
        if args.realtime {
            let target = Duration::from_millis(t);
            let elapsed = wall_start.elapsed();
            if elapsed < target {
                std::thread::sleep(target - elapsed);
            }
        }
    }

    drop(out);

    // Mission debrief
    log_mission(total_ms, &rule, args.quiet);
    log_mission(total_ms, "SIMULATION COMPLETE", args.quiet);
    log_mission(total_ms, &format!("Ticks: {}", ticks_written), args.quiet);
    log_mission(total_ms, &format!("Readings: {}", readings_written), args.quiet);
    log_mission(
        total_ms,
        &format!("Failed buildings: {}", simulator.failed_nodes().len()),
        args.quiet,
    );
    log_mission(
        total_ms,
        &format!("Real time: {:.1}s", wall_start.elapsed().as_secs_f64()),
        args.quiet,
    );
    log_mission(total_ms, &rule, args.quiet);

    Ok(())
}
