//! System-wide default constants.
//!
//! Values that are not operator tunables (they shape the runtime, not the
//! signal analysis) live here instead of in `MonitorConfig`.

// ============================================================================
// Processing Loop
// ============================================================================

/// Interval between periodic silence / signal-loss checks (ms).
pub const SIGNAL_LOSS_CHECK_INTERVAL_MS: u64 = 1_000;

/// Interval between building summary log lines (seconds).
pub const SUMMARY_LOG_INTERVAL_SECS: u64 = 10;

/// Capacity of the bounded reading channel between simulator and loop.
///
/// 80 nodes at 20 Hz = 1 600 readings/s; 4 096 gives ~2.5 s of slack.
pub const READING_CHANNEL_CAPACITY: usize = 4_096;

// ============================================================================
// Earthquake Scenario
// ============================================================================

/// Default earthquake duration when none is given (ms).
pub const DEFAULT_EARTHQUAKE_DURATION_MS: u64 = 6_000;

/// Lower bound of the randomly drawn demo intensity (g).
pub const DEMO_INTENSITY_MIN_G: f64 = 1.5;

/// Width of the randomly drawn demo intensity range (g).
pub const DEMO_INTENSITY_SPREAD_G: f64 = 0.5;

/// Distance attenuation per degree of lat/lng offset from the epicenter.
pub const DISTANCE_ATTENUATION_PER_DEG: f64 = 50.0;

/// Floor on the distance attenuation factor.
pub const MIN_DISTANCE_FACTOR: f64 = 0.3;

/// Fraction of intensity added to the vertical axis.
pub const VERTICAL_BIAS: f64 = 0.3;

// ============================================================================
// Geometry
// ============================================================================

/// Mean Earth radius used for neighbor distances (m).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
