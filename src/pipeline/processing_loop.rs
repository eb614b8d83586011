//! Unified reading processing loop shared across all input modes.
//!
//! Pulls ticks from a [`ReadingSource`], runs them through the
//! [`SignalProcessor`], publishes results into the shared [`MonitorState`],
//! and periodically evaluates silence detection and logs a summary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::processor::SignalProcessor;
use super::source::{ReadingEvent, ReadingSource};
use super::state::MonitorState;
use crate::config::defaults::{SIGNAL_LOSS_CHECK_INTERVAL_MS, SUMMARY_LOG_INTERVAL_SECS};
use crate::insd::NodeLiveness;

/// Out-of-band requests to the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    /// Return every node to stable and clear all processor state.
    ResetToSafe,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub ticks: u64,
    pub readings: u64,
    pub correlated_events: u64,
    pub silence_checks: u64,
    pub probable_collapses: usize,
}

/// Source-relative clock: the latest reading timestamp advanced by the wall
/// time elapsed since it arrived. Works for both live and replayed input.
#[derive(Debug, Clone, Copy)]
struct SourceClock {
    last_ts_ms: Option<i64>,
    received_at: Instant,
}

impl SourceClock {
    fn new() -> Self {
        Self {
            last_ts_ms: None,
            received_at: Instant::now(),
        }
    }

    fn observe(&mut self, ts_ms: i64) {
        if self.last_ts_ms.map_or(true, |t| ts_ms >= t) {
            self.last_ts_ms = Some(ts_ms);
            self.received_at = Instant::now();
        }
    }

    fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.received_at.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.last_ts_ms
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
            .saturating_add(elapsed)
    }
}

/// Owns the processor and drives it from a source until EOF or cancellation.
pub struct ProcessingLoop {
    processor: SignalProcessor,
    state: Arc<RwLock<MonitorState>>,
    cancel_token: CancellationToken,
    commands: Option<mpsc::Receiver<LoopCommand>>,
    silence_interval: Duration,
    summary_interval: Duration,
}

impl ProcessingLoop {
    pub fn new(
        processor: SignalProcessor,
        state: Arc<RwLock<MonitorState>>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            processor,
            state,
            cancel_token,
            commands: None,
            silence_interval: Duration::from_millis(SIGNAL_LOSS_CHECK_INTERVAL_MS),
            summary_interval: Duration::from_secs(SUMMARY_LOG_INTERVAL_SECS),
        }
    }

    pub fn with_commands(mut self, rx: mpsc::Receiver<LoopCommand>) -> Self {
        self.commands = Some(rx);
        self
    }

    pub fn with_silence_interval(mut self, interval: Duration) -> Self {
        self.silence_interval = interval;
        self
    }

    pub fn with_summary_interval(mut self, interval: Duration) -> Self {
        self.summary_interval = interval;
        self
    }

    /// Run until the source is exhausted or the token is cancelled.
    ///
    /// Returns the processor (so callers can inspect it) and final stats.
    pub async fn run<S: ReadingSource>(mut self, source: &mut S) -> (SignalProcessor, LoopStats) {
        let mut stats = LoopStats::default();
        let mut clock = SourceClock::new();
        let mut silence_tick = tokio::time::interval(self.silence_interval);
        let mut summary_tick = tokio::time::interval(self.summary_interval);
        // The first interval tick completes immediately
        silence_tick.tick().await;
        summary_tick.tick().await;

        info!(source = source.source_name(), "Processing readings");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                Some(cmd) = recv_command(&mut self.commands) => {
                    self.handle_command(cmd, clock.now_ms()).await;
                }
                _ = silence_tick.tick() => {
                    stats.silence_checks += 1;
                    self.check_silence(clock.now_ms(), &mut stats).await;
                }
                _ = summary_tick.tick() => {
                    self.log_summary().await;
                }
                result = source.next_tick() => {
                    match result {
                        Ok(ReadingEvent::Tick(batch)) => {
                            for r in &batch {
                                clock.observe(r.timestamp_ms());
                            }
                            stats.ticks += 1;
                            stats.readings += batch.len() as u64;
                            let results = self.processor.process_tick(&batch);
                            self.state.write().await.apply_tick(results);
                        }
                        Ok(ReadingEvent::Eof) => {
                            info!(readings = stats.readings, "Source reached end");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Source error");
                            break;
                        }
                    }
                }
            }
        }

        // One last evaluation so the final state reflects the end of input
        self.check_silence(clock.now_ms(), &mut stats).await;
        let summary = self.state.write().await.update_building_summary();
        stats.correlated_events = self.processor.stats().correlated_events;

        info!(
            ticks = stats.ticks,
            readings = stats.readings,
            events = stats.correlated_events,
            safe = summary.safe,
            damaged = summary.damaged,
            critical = summary.critical,
            collapsed = summary.collapsed,
            "Processing finished"
        );

        (self.processor, stats)
    }

    async fn check_silence(&mut self, now_ms: i64, stats: &mut LoopStats) {
        let assessments = self.processor.check_silence(now_ms);
        stats.probable_collapses = assessments
            .iter()
            .filter(|a| a.liveness == NodeLiveness::ProbableCollapse)
            .count();
        self.state.write().await.apply_assessments(&assessments);
    }

    async fn handle_command(&mut self, cmd: LoopCommand, now_ms: i64) {
        match cmd {
            LoopCommand::ResetToSafe => {
                self.processor.reset(now_ms);
                self.state.write().await.reset_to_safe();
            }
        }
    }

    async fn log_summary(&self) {
        let mut state = self.state.write().await;
        let s = state.update_building_summary();
        info!(
            safe = s.safe,
            damaged = s.damaged,
            critical = s.critical,
            collapsed = s.collapsed,
            peak_g = state.peak_magnitude,
            silent = state.signal_loss_nodes().len(),
            "Building summary"
        );
    }
}

/// Pending forever when no command channel is attached (or it closed).
async fn recv_command(rx: &mut Option<mpsc::Receiver<LoopCommand>>) -> Option<LoopCommand> {
    match rx {
        Some(rx) => match rx.recv().await {
            Some(cmd) => Some(cmd),
            None => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}
