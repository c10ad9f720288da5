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

//! Process-level logging setup.

use anyhow::Context;
use mcpwatch_core::{LogConfig, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the event filter. `RUST_LOG`, when set and non-empty, replaces the
/// configured directive.
pub fn build_filter(config: &LogConfig, rust_log: Option<&str>) -> anyhow::Result<EnvFilter> {
    let directive = match rust_log.map(str::trim) {
        Some(env) if !env.is_empty() => env,
        _ => config.filter.as_str(),
    };
    EnvFilter::try_new(directive).with_context(|| format!("invalid log filter '{}'", directive))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(config, rust_log.as_deref())?;

    let json_layer = (config.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let pretty_layer = (config.format == LogFormat::Pretty).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .context("global tracing subscriber already installed")?;

    tracing::debug!(format = ?config.format, filter = %config.filter, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_prefers_rust_log() {
        let config = LogConfig::default();
        let filter = build_filter(&config, Some("mcpwatch_storage=trace")).unwrap();
        assert_eq!(filter.to_string(), "mcpwatch_storage=trace");
    }

    #[test]
    fn test_filter_falls_back_to_config() {
        let config = LogConfig {
            filter: "warn".to_string(),
            ..Default::default()
        };
        assert_eq!(build_filter(&config, None).unwrap().to_string(), "warn");
        assert_eq!(build_filter(&config, Some("  ")).unwrap().to_string(), "warn");
    }

    #[test]
    fn test_invalid_filter() {
        let config = LogConfig {
            filter: "mcpwatch=notalevel".to_string(),
            ..Default::default()
        };
        assert!(build_filter(&config, None).is_err());
    }

    #[test]
    fn test_second_init_fails() {
        let config = LogConfig {
            format: LogFormat::Json,
            ..Default::default()
        };
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
