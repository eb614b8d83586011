//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `MonitorConfig`.
///
/// Maintained by hand to match the struct hierarchy in monitor_config.rs.
/// Any new field added to `MonitorConfig` must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [site]
        "site",
        "site.name",
        "site.region",
        // [filters]
        "filters",
        "filters.moving_average_window",
        "filters.highpass_cutoff_hz",
        "filters.sample_rate_hz",
        // [frequency]
        "frequency",
        "frequency.window_size",
        "frequency.min_samples",
        "frequency.default_hz",
        "frequency.sample_rate_hz",
        "frequency.min_hz",
        "frequency.max_hz",
        // [features]
        "features",
        "features.abnormal_magnitude_g",
        "features.duration_window_ms",
        "features.max_history_samples",
        "features.energy_ceiling_g",
        // [damage]
        "damage",
        "damage.weights",
        "damage.weights.frequency_shift",
        "damage.weights.peak_energy",
        "damage.weights.duration",
        "damage.scaling",
        "damage.scaling.frequency_shift",
        "damage.scaling.peak_energy",
        "damage.scaling.duration",
        "damage.safe_below",
        "damage.risky_below",
        "damage.legacy_thresholds",
        "damage.summary_damaged_at",
        "damage.summary_critical_at",
        "damage.summary_collapsed_at",
        // [status]
        "status",
        "status.stable_below_g",
        "status.anomaly_below_g",
        "status.warning_below_g",
        // [correlation]
        "correlation",
        "correlation.threshold_g",
        "correlation.window_ms",
        "correlation.stale_after_ms",
        "correlation.min_nodes",
        // [baseline]
        "baseline",
        "baseline.lock_samples",
        // [neighborhood]
        "neighborhood",
        "neighborhood.radius_m",
        "neighborhood.event_memory_ms",
        "neighborhood.stiffness_shift_percent",
        "neighborhood.silence_grace_ms",
        // [insd]
        "insd",
        "insd.n_min",
        "insd.event_threshold_g",
        "insd.heartbeat_timeout_ms",
        "insd.anomaly_threshold",
        // [simulation]
        "simulation",
        "simulation.node_count",
        "simulation.min_lat",
        "simulation.max_lat",
        "simulation.min_lng",
        "simulation.max_lng",
        "simulation.idle_tick_ms",
        "simulation.earthquake_tick_ms",
        "simulation.idle_noise_g",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

/// Dotted paths of every float (including inside arrays) that is NaN or infinite.
pub fn non_finite_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    match value {
        toml::Value::Float(f) if !f.is_finite() => vec![prefix.to_string()],
        toml::Value::Array(items) => items
            .iter()
            .enumerate()
            .flat_map(|(i, v)| non_finite_keys(v, &format!("{prefix}[{i}]")))
            .collect(),
        toml::Value::Table(table) => table
            .iter()
            .flat_map(|(k, v)| {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                non_finite_keys(v, &path)
            })
            .collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        match best {
            Some((best_key, best_dist))
                if dist > best_dist || (dist == best_dist && k >= best_key) => {}
            _ => best = Some((k, dist)),
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate physical ranges on a parsed `MonitorConfig`.
///
/// Returns (errors, warnings). Errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_physical_ranges(
    config: &super::MonitorConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let f = &config.filters;
    if f.sample_rate_hz.is_nan() || f.sample_rate_hz <= 0.0 {
        errors.push(format!(
            "filters.sample_rate_hz = {:.2} must be > 0",
            f.sample_rate_hz
        ));
    } else if f.highpass_cutoff_hz.is_nan()
        || f.highpass_cutoff_hz <= 0.0
        || f.highpass_cutoff_hz >= f.sample_rate_hz / 2.0
    {
        errors.push(format!(
            "filters.highpass_cutoff_hz = {:.2} must be in (0, Nyquist = {:.2})",
            f.highpass_cutoff_hz,
            f.sample_rate_hz / 2.0
        ));
    }

    if config.frequency.sample_rate_hz.is_nan() || config.frequency.sample_rate_hz <= 0.0 {
        errors.push(format!(
            "frequency.sample_rate_hz = {:.2} must be > 0 (used as divisor)",
            config.frequency.sample_rate_hz
        ));
    }
    if config.frequency.min_hz.is_nan() || config.frequency.min_hz < 0.0 {
        errors.push(format!(
            "frequency.min_hz = {:.2} cannot be negative",
            config.frequency.min_hz
        ));
    }

    if config.features.energy_ceiling_g.is_nan() || config.features.energy_ceiling_g <= 0.0 {
        errors.push(format!(
            "features.energy_ceiling_g = {:.2} must be > 0 (used as divisor)",
            config.features.energy_ceiling_g
        ));
    }

    let w = &config.damage.weights;
    for (name, value) in [
        ("damage.weights.frequency_shift", w.frequency_shift),
        ("damage.weights.peak_energy", w.peak_energy),
        ("damage.weights.duration", w.duration),
    ] {
        if value < 0.0 {
            errors.push(format!("{name} = {value:.2} cannot be negative"));
        }
    }

    // Category cutoffs outside the score range can never trigger
    for (name, value) in [
        ("damage.safe_below", config.damage.safe_below),
        ("damage.risky_below", config.damage.risky_below),
    ] {
        if !(0.0..=100.0).contains(&value) {
            warnings.push(ValidationWarning {
                field: name.to_string(),
                message: format!("{name} = {value:.1} is outside the score range (0-100)"),
                suggestion: None,
            });
        }
    }

    let c = &config.correlation;
    if c.window_ms > c.stale_after_ms {
        warnings.push(ValidationWarning {
            field: "correlation.window_ms".to_string(),
            message: format!(
                "correlation.window_ms ({}) exceeds stale_after_ms ({}), entries are purged before they expire",
                c.window_ms, c.stale_after_ms
            ),
            suggestion: None,
        });
    }
    if !(0.05..=5.0).contains(&c.threshold_g) {
        warnings.push(ValidationWarning {
            field: "correlation.threshold_g".to_string(),
            message: format!(
                "correlation.threshold_g = {:.2} is outside typical range (0.05-5 g)",
                c.threshold_g
            ),
            suggestion: None,
        });
    }

    if config.neighborhood.radius_m.is_nan() || config.neighborhood.radius_m <= 0.0 {
        errors.push(format!(
            "neighborhood.radius_m = {:.1} must be > 0",
            config.neighborhood.radius_m
        ));
    }

    if let Some(insd) = &config.insd {
        if insd.heartbeat_timeout_ms < config.neighborhood.silence_grace_ms {
            warnings.push(ValidationWarning {
                field: "insd.heartbeat_timeout_ms".to_string(),
                message: format!(
                    "insd.heartbeat_timeout_ms ({}) is shorter than neighborhood.silence_grace_ms ({})",
                    insd.heartbeat_timeout_ms, config.neighborhood.silence_grace_ms
                ),
                suggestion: None,
            });
        }
    }

    let s = &config.simulation;
    if s.min_lat >= s.max_lat || s.min_lng >= s.max_lng {
        errors.push("simulation bounding box is empty (min must be < max)".to_string());
    }
    if s.idle_tick_ms == 0 || s.earthquake_tick_ms == 0 {
        errors.push("simulation tick intervals must be > 0".to_string());
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
