// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for the monitoring engine
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Values can be layered: defaults, then a TOML file, then
//! `MCPWATCH_*` environment variables.
//!
//! ```toml
//! top_tools = 5
//!
//! [windows]
//! five_min_secs = 300
//!
//! [estimator]
//! relative_accuracy = 0.01
//!
//! [registry]
//! liveness_timeout_secs = 90
//! ```

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    #[serde(default)]
    pub windows: WindowDurations,

    #[serde(default)]
    pub estimator: EstimatorConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Number of tools listed in the overview's top-tools table.
    #[serde(default = "default_top_tools")]
    pub top_tools: usize,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_top_tools() -> usize {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            windows: WindowDurations::default(),
            estimator: EstimatorConfig::default(),
            registry: RegistryConfig::default(),
            top_tools: default_top_tools(),
            log: LogConfig::default(),
        }
    }
}

/// Durations of the three rolling windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowDurations {
    #[serde(default = "default_five_min")]
    pub five_min_secs: u64,

    #[serde(default = "default_one_hour")]
    pub one_hour_secs: u64,

    #[serde(default = "default_twenty_four_hour")]
    pub twenty_four_hour_secs: u64,
}

fn default_five_min() -> u64 {
    300
}

fn default_one_hour() -> u64 {
    3600
}

fn default_twenty_four_hour() -> u64 {
    86_400
}

impl Default for WindowDurations {
    fn default() -> Self {
        Self {
            five_min_secs: default_five_min(),
            one_hour_secs: default_one_hour(),
            twenty_four_hour_secs: default_twenty_four_hour(),
        }
    }
}

/// Latency estimator and slot ring settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimatorConfig {
    /// DDSketch relative accuracy (alpha). Quantiles are within
    /// `alpha * value` of the true sample.
    #[serde(default = "default_relative_accuracy")]
    pub relative_accuracy: f64,

    /// Width of a fine slot. Bounds how late an event may be evicted from
    /// the five minute and one hour windows.
    #[serde(default = "default_fine_resolution")]
    pub fine_resolution_secs: u64,

    /// Width of a coarse slot, used once data is older than `fine_horizon_secs`.
    #[serde(default = "default_coarse_resolution")]
    pub coarse_resolution_secs: u64,

    #[serde(default = "default_fine_horizon")]
    pub fine_horizon_secs: u64,

    /// Retained-sample horizon. Anything older is dropped.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Size of the per-tool recent error ring.
    #[serde(default = "default_recent_errors")]
    pub recent_errors: usize,
}

fn default_relative_accuracy() -> f64 {
    0.01
}

fn default_fine_resolution() -> u64 {
    10
}

fn default_coarse_resolution() -> u64 {
    300
}

fn default_fine_horizon() -> u64 {
    7_500 // two one-hour windows plus slack
}

fn default_retention() -> u64 {
    172_800 // 48 hours
}

fn default_recent_errors() -> usize {
    20
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            relative_accuracy: default_relative_accuracy(),
            fine_resolution_secs: default_fine_resolution(),
            coarse_resolution_secs: default_coarse_resolution(),
            fine_horizon_secs: default_fine_horizon(),
            retention_secs: default_retention(),
            recent_errors: default_recent_errors(),
        }
    }
}

impl EstimatorConfig {
    pub fn fine_resolution_us(&self) -> u64 {
        self.fine_resolution_secs.saturating_mul(1_000_000)
    }

    pub fn coarse_resolution_us(&self) -> u64 {
        self.coarse_resolution_secs.saturating_mul(1_000_000)
    }

    pub fn fine_horizon_us(&self) -> u64 {
        self.fine_horizon_secs.saturating_mul(1_000_000)
    }

    pub fn retention_us(&self) -> u64 {
        self.retention_secs.saturating_mul(1_000_000)
    }
}

/// Connection registry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Sessions with no activity for this long are expired by reconciliation.
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,

    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Distinct clients tracked for usage stats; the rest count as "other".
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,
}

fn default_liveness_timeout() -> u64 {
    90 // 3 x 30s heartbeat
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_max_tracked_clients() -> usize {
    256
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            liveness_timeout_secs: default_liveness_timeout(),
            reconcile_interval_secs: default_reconcile_interval(),
            max_tracked_clients: default_max_tracked_clients(),
        }
    }
}

impl RegistryConfig {
    pub fn liveness_timeout_us(&self) -> u64 {
        self.liveness_timeout_secs.saturating_mul(1_000_000)
    }

    /// Get the reconciliation interval as a Duration.
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Logging bootstrap settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

/// Upper bound for every configured duration (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 86_400;

impl MonitorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: MonitorConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `MCPWATCH_*` environment overrides on top of the current values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> Result<T> {
            raw.trim().parse().map_err(|_| {
                MonitorError::InvalidConfig(format!("{} has an invalid value: {:?}", key, raw))
            })
        }

        macro_rules! override_field {
            ($key:literal, $field:expr) => {
                if let Some(raw) = lookup($key) {
                    $field = parse($key, raw)?;
                    tracing::debug!(key = $key, "applied environment override");
                }
            };
        }

        override_field!("MCPWATCH_FIVE_MIN_SECS", self.windows.five_min_secs);
        override_field!("MCPWATCH_ONE_HOUR_SECS", self.windows.one_hour_secs);
        override_field!(
            "MCPWATCH_TWENTY_FOUR_HOUR_SECS",
            self.windows.twenty_four_hour_secs
        );
        override_field!(
            "MCPWATCH_RELATIVE_ACCURACY",
            self.estimator.relative_accuracy
        );
        override_field!("MCPWATCH_RETENTION_SECS", self.estimator.retention_secs);
        override_field!(
            "MCPWATCH_LIVENESS_TIMEOUT_SECS",
            self.registry.liveness_timeout_secs
        );
        override_field!(
            "MCPWATCH_RECONCILE_INTERVAL_SECS",
            self.registry.reconcile_interval_secs
        );
        override_field!("MCPWATCH_TOP_TOOLS", self.top_tools);
        override_field!("MCPWATCH_LOG_FILTER", self.log.filter);

        if let Some(raw) = lookup("MCPWATCH_LOG_FORMAT") {
            self.log.format = match raw.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(MonitorError::InvalidConfig(format!(
                        "MCPWATCH_LOG_FORMAT must be json or pretty, got {:?}",
                        other
                    )))
                }
            };
        }

        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let w = &self.windows;
        let e = &self.estimator;
        let r = &self.registry;

        let positive = [
            ("windows.five_min_secs", w.five_min_secs),
            ("windows.one_hour_secs", w.one_hour_secs),
            ("windows.twenty_four_hour_secs", w.twenty_four_hour_secs),
            ("estimator.fine_resolution_secs", e.fine_resolution_secs),
            ("estimator.coarse_resolution_secs", e.coarse_resolution_secs),
            ("estimator.fine_horizon_secs", e.fine_horizon_secs),
            ("estimator.retention_secs", e.retention_secs),
            ("registry.liveness_timeout_secs", r.liveness_timeout_secs),
            ("registry.reconcile_interval_secs", r.reconcile_interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
            if value > MAX_DURATION_SECS {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} must not exceed {}s, got {}",
                    name, MAX_DURATION_SECS, value
                )));
            }
        }

        if !(w.five_min_secs < w.one_hour_secs && w.one_hour_secs < w.twenty_four_hour_secs) {
            return Err(MonitorError::InvalidConfig(
                "window durations must be strictly increasing".to_string(),
            ));
        }

        if !(e.relative_accuracy > 0.0 && e.relative_accuracy < 1.0) {
            return Err(MonitorError::InvalidConfig(format!(
                "estimator.relative_accuracy must be in (0, 1), got {}",
                e.relative_accuracy
            )));
        }

        if e.fine_resolution_secs > e.coarse_resolution_secs {
            return Err(MonitorError::InvalidConfig(
                "estimator.fine_resolution_secs must not exceed coarse_resolution_secs"
                    .to_string(),
            ));
        }

        if e.fine_horizon_secs < 2 * w.one_hour_secs {
            return Err(MonitorError::InvalidConfig(format!(
                "estimator.fine_horizon_secs must cover two one-hour windows ({}s)",
                2 * w.one_hour_secs
            )));
        }

        if e.retention_secs < w.twenty_four_hour_secs {
            return Err(MonitorError::InvalidConfig(
                "estimator.retention_secs must cover the largest window".to_string(),
            ));
        }

        if e.recent_errors == 0 {
            return Err(MonitorError::InvalidConfig(
                "estimator.recent_errors must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
