//! Processing Pipeline Module
//!
//! ```text
//! ReadingSource ──tick──▶ SignalProcessor ──results──▶ MonitorState
//!                              │                          ▲
//!                              └── SilenceDetector ── every 1 s (INSD)
//! ```
//!
//! Each tick is processed synchronously; the only cross-node state is the
//! recent-readings map inside the processor, written by a single owner.

mod processor;
mod state;
pub mod processing_loop;
pub mod source;

pub use processing_loop::{LoopCommand, LoopStats, ProcessingLoop};
pub use processor::{ProcessorStats, SignalProcessor};
pub use source::{
    ChannelSource, LineSource, ReadingEvent, ReadingSource, SourceError, StdinSource,
};
pub use state::*;

use crate::config::MonitorConfig;
use crate::types::Node;

/// Processor and state for a known node set, with the neighbor table built
/// and heartbeat clocks started at `now_ms`.
pub fn build_monitor(
    config: &MonitorConfig,
    nodes: Vec<Node>,
    now_ms: i64,
) -> (SignalProcessor, MonitorState) {
    let mut processor = SignalProcessor::new(config);
    processor.register_nodes(&nodes, now_ms);
    let mut state = MonitorState::new(&config.damage);
    state.set_nodes(nodes);
    (processor, state)
}
