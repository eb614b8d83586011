//! Seismos - Building Damage Monitor
//!
//! Real-time structural damage monitoring for a district of instrumented
//! buildings.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in simulator, earthquake after 10 s
//! cargo run --release -- --quake-after-secs 10
//!
//! # Process readings produced elsewhere
//! ./simulation --seed 7 | ./seismos --stdin --seed 7
//! ```
//!
//! # Environment Variables
//!
//! - `SEISMOS_CONFIG`: Path to the site config (default: `./seismos.toml`)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use seismos::config::defaults::{DEFAULT_EARTHQUAKE_DURATION_MS, READING_CHANNEL_CAPACITY};
use seismos::config::MonitorConfig;
use seismos::pipeline::{
    build_monitor, ChannelSource, LoopCommand, MonitorState, ProcessingLoop, StdinSource,
};
use seismos::simulator::scheduler::Scheduler;
use seismos::simulator::{demo_site, EarthquakeSimulator, SimulationController};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "seismos")]
#[command(about = "Seismic building damage monitor")]
#[command(version)]
struct CliArgs {
    /// Read JSON readings from stdin instead of running the simulator.
    /// Needs the producer's --seed to rebuild its building layout.
    #[arg(long, requires = "seed")]
    stdin: bool,

    /// Site config file (overrides SEISMOS_CONFIG and ./seismos.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Trigger an earthquake this many seconds after start (simulator mode)
    #[arg(long)]
    quake_after_secs: Option<u64>,

    /// Peak earthquake intensity in g (default: random 1.5-2.0)
    #[arg(long)]
    intensity: Option<f64>,

    /// Earthquake duration in milliseconds
    #[arg(long, default_value_t = DEFAULT_EARTHQUAKE_DURATION_MS)]
    duration_ms: u64,

    /// Nodes shaking harder than this (g) stop reporting
    #[arg(long)]
    failure_intensity: Option<f64>,

    /// Reset every building to safe this many seconds after the earthquake ends
    #[arg(long)]
    reset_after_secs: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    run_secs: Option<u64>,

    /// Random seed for reproducible node layout and noise
    #[arg(long)]
    seed: Option<u64>,

    /// Number of buildings (overrides config, must match the producer in stdin mode)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=10_000))]
    nodes: Option<u32>,
}

/// Earthquake timeline for simulator mode.
#[derive(Debug, Clone)]
struct Scenario {
    quake_after: Duration,
    intensity: Option<f64>,
    duration_ms: u64,
    failure_intensity: Option<f64>,
    reset_after: Option<Duration>,
}

impl Scenario {
    fn from_args(args: &CliArgs) -> Option<Self> {
        args.quake_after_secs.map(|secs| Self {
            quake_after: Duration::from_secs(secs),
            intensity: args.intensity,
            duration_ms: args.duration_ms,
            failure_intensity: args.failure_intensity,
            reset_after: args.reset_after_secs.map(Duration::from_secs),
        })
    }
}

/// Progress notifications from the earthquake timer.
#[derive(Debug)]
enum QuakeEvent {
    Progress(f64),
    Complete,
}

// ============================================================================
// Simulator Mode
// ============================================================================

async fn run_simulator(
    config: MonitorConfig,
    scenario: Option<Scenario>,
    seed: Option<u64>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let (nodes, noise) = demo_site(&config.simulation, seed);
    info!(nodes = nodes.len(), site = %config.site.name, "Demo buildings generated");

    let now_ms = chrono::Utc::now().timestamp_millis();
    let (processor, state) = build_monitor(&config, nodes.clone(), now_ms);
    let state = Arc::new(RwLock::new(state));

    let (tx, mut source) = ChannelSource::channel(READING_CHANNEL_CAPACITY);
    let (cmd_tx, cmd_rx) = mpsc::channel(4);

    let simulator = EarthquakeSimulator::new(nodes, &config.simulation, Box::new(noise));
    let mut controller = SimulationController::new(
        simulator,
        &config.simulation,
        tx,
        Scheduler::with_parent(cancel_token.child_token()),
    );
    controller.start();

    let director = tokio::spawn(direct_scenario(
        controller,
        scenario,
        Arc::clone(&state),
        cmd_tx,
        cancel_token.clone(),
    ));

    let processing_loop = ProcessingLoop::new(processor, Arc::clone(&state), cancel_token.clone())
        .with_commands(cmd_rx);
    let (_processor, stats) = processing_loop.run(&mut source).await;

    cancel_token.cancel();
    director
        .await
        .context("Scenario task panicked")?
        .context("Scenario failed")?;

    info!(
        ticks = stats.ticks,
        readings = stats.readings,
        events = stats.correlated_events,
        probable_collapses = stats.probable_collapses,
        "Simulation finished"
    );
    Ok(())
}

/// Drive the earthquake timeline and mirror its progress into the state.
async fn direct_scenario(
    mut controller: SimulationController,
    scenario: Option<Scenario>,
    state: Arc<RwLock<MonitorState>>,
    commands: mpsc::Sender<LoopCommand>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let Some(scenario) = scenario else {
        cancel_token.cancelled().await;
        controller.stop();
        return Ok(());
    };

    tokio::select! {
        _ = cancel_token.cancelled() => {
            controller.stop();
            return Ok(());
        }
        _ = tokio::time::sleep(scenario.quake_after) => {}
    }

    let mut quake = controller.random_earthquake()?;
    if let Some(intensity) = scenario.intensity {
        quake.intensity_g = intensity;
    }
    quake.duration_ms = scenario.duration_ms;
    quake.failure_intensity = scenario.failure_intensity;

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let progress_tx = event_tx.clone();
    state.write().await.set_earthquake_active(true);
    controller.trigger_earthquake(
        quake,
        move |p| {
            let _ = progress_tx.send(QuakeEvent::Progress(p));
        },
        move || {
            let _ = event_tx.send(QuakeEvent::Complete);
        },
    )?;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                controller.stop();
                return Ok(());
            }
            event = events.recv() => match event {
                Some(QuakeEvent::Progress(p)) => state.write().await.set_earthquake_progress(p),
                Some(QuakeEvent::Complete) | None => break,
            }
        }
    }

    state.write().await.set_earthquake_active(false);
    let summary = state.write().await.update_building_summary();
    info!(
        safe = summary.safe,
        damaged = summary.damaged,
        critical = summary.critical,
        collapsed = summary.collapsed,
        "Earthquake finished"
    );

    if let Some(delay) = scenario.reset_after {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                controller.stop();
                return Ok(());
            }
            _ = tokio::time::sleep(delay) => {}
        }
        controller.reset();
        if commands.send(LoopCommand::ResetToSafe).await.is_err() {
            warn!("Processing loop gone, reset skipped");
        }
    }

    cancel_token.cancelled().await;
    controller.stop();
    Ok(())
}

// ============================================================================
// Stdin Mode
// ============================================================================

async fn run_stdin(
    config: MonitorConfig,
    seed: u64,
    cancel_token: CancellationToken,
) -> Result<()> {
    let (nodes, _) = demo_site(&config.simulation, Some(seed));
    info!(nodes = nodes.len(), seed, "Building layout rebuilt for input");

    let now_ms = chrono::Utc::now().timestamp_millis();
    let (processor, state) = build_monitor(&config, nodes, now_ms);
    let state = Arc::new(RwLock::new(state));
    let processing_loop = ProcessingLoop::new(processor, Arc::clone(&state), cancel_token);
    let (processor, stats) = processing_loop.run(&mut StdinSource::stdin()).await;

    let state = state.read().await;
    info!(
        nodes = processor.node_count(),
        readings = stats.readings,
        events = stats.correlated_events,
        peak_g = state.peak_magnitude,
        silent = state.signal_loss_nodes().len(),
        "Input processed"
    );
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => MonitorConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => MonitorConfig::load(),
    };
    if let Some(n) = args.nodes {
        config.simulation.node_count = n as usize;
    }
    info!(
        site = %config.site.name,
        insd = config.insd.is_some(),
        "Seismos building damage monitor starting"
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down");
        shutdown_token.cancel();
    });

    if let Some(secs) = args.run_secs {
        let deadline_token = cancel_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!(secs, "Run time elapsed, shutting down");
            deadline_token.cancel();
        });
    }

    match (args.stdin, args.seed) {
        (true, Some(seed)) => {
            info!("Input: stdin (JSON readings)");
            run_stdin(config, seed, cancel_token).await?;
        }
        (true, None) => anyhow::bail!("--stdin needs --seed to rebuild the building layout"),
        (false, _) => {
            info!("Input: built-in earthquake simulator");
            let scenario = Scenario::from_args(&args);
            run_simulator(config, scenario, args.seed, cancel_token).await?;
        }
    }

    info!("Seismos shutdown complete");
    Ok(())
}
