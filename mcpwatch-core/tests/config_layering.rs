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

use mcpwatch_core::{BucketClock, LogFormat, MonitorConfig, MonitorError, Window};
use std::io::Write;

const FILE: &str = r#"
top_tools = 8

[windows]
five_min_secs = 120

[registry]
liveness_timeout_secs = 45

[log]
format = "json"
"#;

#[test]
fn test_file_then_environment() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FILE.as_bytes()).unwrap();

    let mut config = MonitorConfig::from_toml_file(file.path()).unwrap();
    assert_eq!(config.top_tools, 8);
    assert_eq!(config.windows.five_min_secs, 120);
    assert_eq!(config.windows.one_hour_secs, 3_600);
    assert_eq!(config.registry.liveness_timeout_secs, 45);
    assert_eq!(config.log.format, LogFormat::Json);

    std::env::set_var("MCPWATCH_LIVENESS_TIMEOUT_SECS", "150");
    std::env::set_var("MCPWATCH_LOG_FORMAT", "pretty");
    let applied = config.apply_env_overrides();
    std::env::remove_var("MCPWATCH_LIVENESS_TIMEOUT_SECS");
    std::env::remove_var("MCPWATCH_LOG_FORMAT");

    applied.unwrap();
    assert_eq!(config.registry.liveness_timeout_secs, 150);
    assert_eq!(config.log.format, LogFormat::Pretty);
    config.validate().unwrap();

    let clock = BucketClock::new(config.windows);
    assert_eq!(clock.duration_secs(Window::FiveMin), 120);
}

#[test]
fn test_invalid_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[windows]\nfive_min_secs = 7200\n").unwrap();

    let err = MonitorConfig::from_toml_file(file.path()).unwrap_err();
    assert!(matches!(err, MonitorError::InvalidConfig(_)));
}

#[test]
fn test_missing_file() {
    let err = MonitorConfig::from_toml_file("/nonexistent/mcpwatch.toml").unwrap_err();
    assert!(matches!(err, MonitorError::Io(_)));
}
