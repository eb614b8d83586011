//! Monitor Configuration - all pipeline constants as operator-tunable TOML values
//!
//! Each struct implements `Default` with the reference constants, so a
//! missing config file yields the reference behavior. The one exception is
//! `[insd]`: its thresholds have no defaults and the section must be given
//! explicitly for silence detection to run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a monitored site.
///
/// Load with `MonitorConfig::load()` which searches:
/// 1. `$SEISMOS_CONFIG` env var
/// 2. `./seismos.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// Site identification
    #[serde(default)]
    pub site: SiteInfo,

    /// High-pass / moving-average filter chain
    #[serde(default)]
    pub filters: FilterConfig,

    /// Zero-crossing frequency estimator
    #[serde(default)]
    pub frequency: FrequencyConfig,

    /// Feature extraction windows
    #[serde(default)]
    pub features: FeatureConfig,

    /// Damage score weights, scaling and categories
    #[serde(default)]
    pub damage: DamageConfig,

    /// Raw magnitude status thresholds
    #[serde(default)]
    pub status: StatusThresholds,

    /// Cross-node correlation
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// Baseline frequency learning
    #[serde(default)]
    pub baseline: BaselineConfig,

    /// Neighbor topology and evidence windows for INSD
    #[serde(default)]
    pub neighborhood: NeighborhoodConfig,

    /// INSD thresholds. `None` disables silence detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insd: Option<InsdThresholds>,

    /// Demo simulator
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl MonitorConfig {
    /// Load configuration using the standard search order:
    /// 1. `$SEISMOS_CONFIG` environment variable
    /// 2. `./seismos.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("SEISMOS_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(
                            path = %p.display(),
                            site = %config.site.name,
                            "Loaded monitor config from SEISMOS_CONFIG"
                        );
                        return config;
                    }
                    Err(e) => {
                        warn!(
                            path = %p.display(),
                            error = %e,
                            "Failed to load config from SEISMOS_CONFIG, falling back"
                        );
                    }
                }
            } else {
                warn!(path = %path, "SEISMOS_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("seismos.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(site = %config.site.name, "Loaded monitor config from ./seismos.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./seismos.toml, using defaults");
                }
            }
        }

        info!("No seismos.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys only produce warnings; range and consistency problems
    /// are errors.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Monitor config saved");
        Ok(())
    }

    /// Validate all tunables for internal consistency.
    ///
    /// Rules:
    /// - Damage weights must sum to approximately 1.0
    /// - Category thresholds must be strictly ascending
    /// - Windows, rates and sample caps must be positive
    /// - The high-pass cutoff must sit below Nyquist
    /// - Every value must be finite
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let w = &self.damage.weights;
        let weight_sum = w.frequency_shift + w.peak_energy + w.duration;
        if !(0.95..=1.05).contains(&weight_sum) {
            errors.push(format!(
                "damage.weights must sum to ~1.0, got {weight_sum:.2}"
            ));
        }

        Self::check_ascending(
            &[self.damage.safe_below, self.damage.risky_below],
            "damage.safe_below/risky_below",
            &mut errors,
        );
        Self::check_ascending(
            &self.damage.legacy_thresholds,
            "damage.legacy_thresholds",
            &mut errors,
        );
        Self::check_ascending(
            &[
                self.damage.summary_damaged_at,
                self.damage.summary_critical_at,
                self.damage.summary_collapsed_at,
            ],
            "damage.summary thresholds",
            &mut errors,
        );
        Self::check_ascending(
            &[self.status.stable_below_g, self.status.anomaly_below_g, self.status.warning_below_g],
            "status thresholds",
            &mut errors,
        );

        if self.filters.moving_average_window == 0 {
            errors.push("filters.moving_average_window must be > 0".to_string());
        }
        if self.frequency.window_size < self.frequency.min_samples {
            errors.push(format!(
                "frequency.window_size ({}) must be >= frequency.min_samples ({})",
                self.frequency.window_size, self.frequency.min_samples
            ));
        }
        if self.frequency.min_samples < 2 {
            errors.push("frequency.min_samples must be >= 2".to_string());
        }
        if self.frequency.min_hz >= self.frequency.max_hz {
            errors.push(format!(
                "frequency.min_hz ({:.2}) must be < frequency.max_hz ({:.2})",
                self.frequency.min_hz, self.frequency.max_hz
            ));
        }
        if self.features.max_history_samples == 0 {
            errors.push("features.max_history_samples must be > 0".to_string());
        }
        if self.features.duration_window_ms == 0 {
            errors.push("features.duration_window_ms must be > 0".to_string());
        }
        if self.correlation.min_nodes < 2 {
            errors.push("correlation.min_nodes must be >= 2".to_string());
        }
        if self.baseline.lock_samples == 0 {
            errors.push("baseline.lock_samples must be > 0".to_string());
        }
        if let Some(insd) = &self.insd {
            if insd.n_min == 0 {
                errors.push("insd.n_min must be > 0".to_string());
            }
            if insd.heartbeat_timeout_ms == 0 {
                errors.push("insd.heartbeat_timeout_ms must be > 0".to_string());
            }
        }

        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        // Reject NaN/Inf in any config value (sweep all f64 fields via serialization)
        if let Ok(value) = toml::Value::try_from(self) {
            let bad = super::validation::non_finite_keys(&value, "");
            if !bad.is_empty() {
                errors.push(format!(
                    "Config contains NaN or Inf values ({}), all tunables must be finite numbers",
                    bad.join(", ")
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_ascending(values: &[f64], name: &str, errors: &mut Vec<String>) {
        if values.iter().any(|v| !v.is_finite()) {
            errors.push(format!("{name}: values must be finite (got {values:?})"));
            return;
        }
        if values.windows(2).any(|pair| pair[0] >= pair[1]) {
            errors.push(format!("{name}: values must be strictly ascending (got {values:?})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({0:?}): {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({0:?}): {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Site Info
// ============================================================================

/// Identification metadata, only used in logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteInfo {
    #[serde(default = "default_site_name")]
    pub name: String,

    #[serde(default)]
    pub region: String,
}

fn default_site_name() -> String {
    "Unnamed Site".to_string()
}

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            region: String::new(),
        }
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Filter chain applied to raw magnitude: high-pass, rectify, moving average.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterConfig {
    /// Moving average FIFO length (samples)
    #[serde(default = "default_ma_window")]
    pub moving_average_window: usize,

    /// High-pass cutoff (Hz)
    #[serde(default = "default_hp_cutoff")]
    pub highpass_cutoff_hz: f64,

    /// Sample rate assumed by the high-pass time constant (Hz)
    #[serde(default = "default_hp_sample_rate")]
    pub sample_rate_hz: f64,
}

fn default_ma_window() -> usize {
    5
}
fn default_hp_cutoff() -> f64 {
    0.5
}
fn default_hp_sample_rate() -> f64 {
    100.0
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            moving_average_window: default_ma_window(),
            highpass_cutoff_hz: default_hp_cutoff(),
            sample_rate_hz: default_hp_sample_rate(),
        }
    }
}

// ============================================================================
// Frequency Estimator
// ============================================================================

/// Zero-crossing dominant frequency estimator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrequencyConfig {
    /// Rolling window of raw magnitudes (samples)
    #[serde(default = "default_freq_window")]
    pub window_size: usize,

    /// Samples required before an estimate is computed
    #[serde(default = "default_freq_min_samples")]
    pub min_samples: usize,

    /// Returned while the window is still filling (typical building frequency)
    #[serde(default = "default_freq_default_hz")]
    pub default_hz: f64,

    /// Reading cadence (Hz)
    #[serde(default = "default_freq_sample_rate")]
    pub sample_rate_hz: f64,

    /// Lower clamp (Hz)
    #[serde(default = "default_freq_min_hz")]
    pub min_hz: f64,

    /// Upper clamp (Hz)
    #[serde(default = "default_freq_max_hz")]
    pub max_hz: f64,
}

fn default_freq_window() -> usize {
    50
}
fn default_freq_min_samples() -> usize {
    10
}
fn default_freq_default_hz() -> f64 {
    5.0
}
fn default_freq_sample_rate() -> f64 {
    20.0
}
fn default_freq_min_hz() -> f64 {
    0.5
}
fn default_freq_max_hz() -> f64 {
    20.0
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            window_size: default_freq_window(),
            min_samples: default_freq_min_samples(),
            default_hz: default_freq_default_hz(),
            sample_rate_hz: default_freq_sample_rate(),
            min_hz: default_freq_min_hz(),
            max_hz: default_freq_max_hz(),
        }
    }
}

// ============================================================================
// Feature Extraction
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureConfig {
    /// Magnitude at or above which time counts as abnormal (g)
    #[serde(default = "default_abnormal_magnitude")]
    pub abnormal_magnitude_g: f64,

    /// Sliding window for abnormal duration (ms)
    #[serde(default = "default_duration_window")]
    pub duration_window_ms: u64,

    /// Hard cap on history length per node (samples)
    #[serde(default = "default_max_history")]
    pub max_history_samples: usize,

    /// Magnitude that maps to peak energy 1.0 (g)
    #[serde(default = "default_energy_ceiling")]
    pub energy_ceiling_g: f64,
}

fn default_abnormal_magnitude() -> f64 {
    0.5
}
fn default_duration_window() -> u64 {
    10_000
}
fn default_max_history() -> usize {
    200
}
fn default_energy_ceiling() -> f64 {
    2.0
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            abnormal_magnitude_g: default_abnormal_magnitude(),
            duration_window_ms: default_duration_window(),
            max_history_samples: default_max_history(),
            energy_ceiling_g: default_energy_ceiling(),
        }
    }
}

// ============================================================================
// Damage Score
// ============================================================================

/// Component weights. Tunable constants, not derived values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DamageWeights {
    #[serde(default = "default_w_freq")]
    pub frequency_shift: f64,
    #[serde(default = "default_w_energy")]
    pub peak_energy: f64,
    #[serde(default = "default_w_duration")]
    pub duration: f64,
}

fn default_w_freq() -> f64 {
    0.50
}
fn default_w_energy() -> f64 {
    0.35
}
fn default_w_duration() -> f64 {
    0.15
}

impl Default for DamageWeights {
    fn default() -> Self {
        Self {
            frequency_shift: default_w_freq(),
            peak_energy: default_w_energy(),
            duration: default_w_duration(),
        }
    }
}

/// Multipliers converting raw features into 0-100 component scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DamageScaling {
    /// Points per percent of frequency shift (25% shift = 100 points)
    #[serde(default = "default_s_freq")]
    pub frequency_shift: f64,
    /// Points per unit of normalized energy
    #[serde(default = "default_s_energy")]
    pub peak_energy: f64,
    /// Points per second of abnormal duration (10 s = 100 points)
    #[serde(default = "default_s_duration")]
    pub duration: f64,
}

fn default_s_freq() -> f64 {
    4.0
}
fn default_s_energy() -> f64 {
    50.0
}
fn default_s_duration() -> f64 {
    10.0
}

impl Default for DamageScaling {
    fn default() -> Self {
        Self {
            frequency_shift: default_s_freq(),
            peak_energy: default_s_energy(),
            duration: default_s_duration(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DamageConfig {
    #[serde(default)]
    pub weights: DamageWeights,

    #[serde(default)]
    pub scaling: DamageScaling,

    /// Scores below this are `safe`
    #[serde(default = "default_safe_below")]
    pub safe_below: f64,

    /// Scores below this (and >= safe_below) are `risky`
    #[serde(default = "default_risky_below")]
    pub risky_below: f64,

    /// Upper bounds for stable / anomaly / warning / critical; above is collapse
    #[serde(default = "default_legacy_thresholds")]
    pub legacy_thresholds: [f64; 4],

    /// Building summary buckets (score >= value)
    #[serde(default = "default_summary_damaged")]
    pub summary_damaged_at: f64,
    #[serde(default = "default_summary_critical")]
    pub summary_critical_at: f64,
    #[serde(default = "default_summary_collapsed")]
    pub summary_collapsed_at: f64,
}

fn default_safe_below() -> f64 {
    30.0
}
fn default_risky_below() -> f64 {
    60.0
}
fn default_legacy_thresholds() -> [f64; 4] {
    [15.0, 30.0, 50.0, 70.0]
}
fn default_summary_damaged() -> f64 {
    30.0
}
fn default_summary_critical() -> f64 {
    70.0
}
fn default_summary_collapsed() -> f64 {
    90.0
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            weights: DamageWeights::default(),
            scaling: DamageScaling::default(),
            safe_below: default_safe_below(),
            risky_below: default_risky_below(),
            legacy_thresholds: default_legacy_thresholds(),
            summary_damaged_at: default_summary_damaged(),
            summary_critical_at: default_summary_critical(),
            summary_collapsed_at: default_summary_collapsed(),
        }
    }
}

// ============================================================================
// Raw Magnitude Status
// ============================================================================

/// Thresholds on filtered magnitude (g) for the raw status output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusThresholds {
    #[serde(default = "default_stable_below")]
    pub stable_below_g: f64,
    #[serde(default = "default_anomaly_below")]
    pub anomaly_below_g: f64,
    #[serde(default = "default_warning_below")]
    pub warning_below_g: f64,
}

fn default_stable_below() -> f64 {
    0.2
}
fn default_anomaly_below() -> f64 {
    0.5
}
fn default_warning_below() -> f64 {
    1.0
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            stable_below_g: default_stable_below(),
            anomaly_below_g: default_anomaly_below(),
            warning_below_g: default_warning_below(),
        }
    }
}

// ============================================================================
// Correlation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationConfig {
    /// Filtered magnitude a node must reach to count (g)
    #[serde(default = "default_corr_threshold")]
    pub threshold_g: f64,

    /// Maximum age of a qualifying reading (ms)
    #[serde(default = "default_corr_window")]
    pub window_ms: u64,

    /// Entries older than this are purged from the recent-readings map (ms)
    #[serde(default = "default_corr_stale")]
    pub stale_after_ms: u64,

    /// Nodes required for an event to count as correlated
    #[serde(default = "default_corr_min_nodes")]
    pub min_nodes: usize,
}

fn default_corr_threshold() -> f64 {
    0.5
}
fn default_corr_window() -> u64 {
    500
}
fn default_corr_stale() -> u64 {
    5_000
}
fn default_corr_min_nodes() -> usize {
    2
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            threshold_g: default_corr_threshold(),
            window_ms: default_corr_window(),
            stale_after_ms: default_corr_stale(),
            min_nodes: default_corr_min_nodes(),
        }
    }
}

// ============================================================================
// Baseline Learning
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BaselineConfig {
    /// Warm frequency estimates averaged before the baseline locks
    #[serde(default = "default_lock_samples")]
    pub lock_samples: usize,
}

fn default_lock_samples() -> usize {
    100
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            lock_samples: default_lock_samples(),
        }
    }
}

// ============================================================================
// Neighborhood / INSD
// ============================================================================

/// How neighborhood evidence is gathered for silence detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeighborhoodConfig {
    /// Nodes within this ground distance are neighbors (m)
    #[serde(default = "default_radius")]
    pub radius_m: f64,

    /// How long a correlated event counts as "reported" by a neighbor (ms)
    #[serde(default = "default_event_memory")]
    pub event_memory_ms: u64,

    /// Frequency shift (%) at which a neighbor flags a stiffness change
    #[serde(default = "default_stiffness_shift")]
    pub stiffness_shift_percent: f64,

    /// Time without a reading before a node counts as silent (ms)
    #[serde(default = "default_silence_grace")]
    pub silence_grace_ms: u64,
}

fn default_radius() -> f64 {
    300.0
}
fn default_event_memory() -> u64 {
    30_000
}
fn default_stiffness_shift() -> f64 {
    10.0
}
fn default_silence_grace() -> u64 {
    1_000
}

impl Default for NeighborhoodConfig {
    fn default() -> Self {
        Self {
            radius_m: default_radius(),
            event_memory_ms: default_event_memory(),
            stiffness_shift_percent: default_stiffness_shift(),
            silence_grace_ms: default_silence_grace(),
        }
    }
}

/// INSD thresholds. Every field is required; there are no built-in values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsdThresholds {
    /// Minimum neighbors reporting an event (N_MIN)
    pub n_min: usize,
    /// Minimum event intensity among reporting neighbors, g (EVENT_THRESHOLD)
    pub event_threshold_g: f64,
    /// Silence required for heartbeat loss, ms (HEARTBEAT_TIMEOUT)
    pub heartbeat_timeout_ms: u64,
    /// Minimum neighbor damage score, 0-100 (ANOMALY_THRESHOLD)
    pub anomaly_threshold: f64,
}

// ============================================================================
// Simulation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    #[serde(default = "default_node_count")]
    pub node_count: usize,

    #[serde(default = "default_min_lat")]
    pub min_lat: f64,
    #[serde(default = "default_max_lat")]
    pub max_lat: f64,
    #[serde(default = "default_min_lng")]
    pub min_lng: f64,
    #[serde(default = "default_max_lng")]
    pub max_lng: f64,

    /// Background noise cadence (ms)
    #[serde(default = "default_idle_tick")]
    pub idle_tick_ms: u64,

    /// Earthquake cadence (ms)
    #[serde(default = "default_quake_tick")]
    pub earthquake_tick_ms: u64,

    /// Peak-to-peak background noise per axis (g)
    #[serde(default = "default_idle_noise")]
    pub idle_noise_g: f64,
}

fn default_node_count() -> usize {
    80
}
fn default_min_lat() -> f64 {
    41.0260
}
fn default_max_lat() -> f64 {
    41.0320
}
fn default_min_lng() -> f64 {
    28.9420
}
fn default_max_lng() -> f64 {
    28.9520
}
fn default_idle_tick() -> u64 {
    100
}
fn default_quake_tick() -> u64 {
    50
}
fn default_idle_noise() -> f64 {
    0.001
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            node_count: default_node_count(),
            min_lat: default_min_lat(),
            max_lat: default_max_lat(),
            min_lng: default_min_lng(),
            max_lng: default_max_lng(),
            idle_tick_ms: default_idle_tick(),
            earthquake_tick_ms: default_quake_tick(),
            idle_noise_g: default_idle_noise(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok(), "{:?}", config.validate());
        assert!(config.insd.is_none());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = MonitorConfig::from_toml_str("").unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = MonitorConfig::from_toml_str(
            r#"
[correlation]
window_ms = 750
"#,
        )
        .unwrap();
        assert_eq!(config.correlation.window_ms, 750);
        assert_eq!(config.correlation.threshold_g, 0.5);
        assert_eq!(config.filters.moving_average_window, 5);
    }

    #[test]
    fn test_insd_section_requires_every_field() {
        let result = MonitorConfig::from_toml_str(
            r#"
[insd]
n_min = 2
event_threshold_g = 0.5
"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_, _))));
    }

    #[test]
    fn test_insd_section_parses() {
        let config = MonitorConfig::from_toml_str(
            r#"
[insd]
n_min = 2
event_threshold_g = 0.5
heartbeat_timeout_ms = 3000
anomaly_threshold = 40.0
"#,
        )
        .unwrap();
        let insd = config.insd.unwrap();
        assert_eq!(insd.n_min, 2);
        assert_eq!(insd.heartbeat_timeout_ms, 3000);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = MonitorConfig::default();
        config.damage.weights.duration = 0.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("damage.weights"));
    }

    #[test]
    fn test_category_thresholds_must_ascend() {
        let mut config = MonitorConfig::default();
        config.damage.risky_below = 20.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_rejected() {
        let mut config = MonitorConfig::default();
        config.features.energy_ceiling_g = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_preserves_values() {
        let mut config = MonitorConfig::default();
        config.site.name = "Balat".to_string();
        config.insd = Some(InsdThresholds {
            n_min: 3,
            event_threshold_g: 0.8,
            heartbeat_timeout_ms: 2_000,
            anomaly_threshold: 30.0,
        });
        let text = config.to_toml().unwrap();
        let parsed = MonitorConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
