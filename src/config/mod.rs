//! Monitor Configuration Module
//!
//! Provides site configuration loaded from TOML files. Every tunable of the
//! signal pipeline (filter windows, scoring weights, category thresholds,
//! correlation window, INSD thresholds) lives here instead of in the code.
//!
//! ## Loading Order
//!
//! 1. `SEISMOS_CONFIG` environment variable (path to TOML file)
//! 2. `seismos.toml` in the current working directory
//! 3. Built-in defaults (the reference constants)
//!
//! ## Usage
//!
//! ```ignore
//! let config = MonitorConfig::load();
//! let processor = SignalProcessor::new(&config);
//! ```
//!
//! The configuration is passed explicitly to the components that need it;
//! there is no process-wide config singleton.

mod monitor_config;
pub mod defaults;
pub mod validation;

pub use monitor_config::*;
