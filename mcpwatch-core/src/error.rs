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

//! Monitoring error types
//!
//! Only the read side and configuration loading surface these. The write
//! side (`record_*`) logs and swallows failures instead.

use thiserror::Error;

/// Result type for monitoring operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur in the monitoring engine
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Window identifier not known to the bucket clock
    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Event rejected before aggregation
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error (configuration files only)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::ser::Error> for MonitorError {
    fn from(e: toml::ser::Error) -> Self {
        MonitorError::Serialization(e.to_string())
    }
}
