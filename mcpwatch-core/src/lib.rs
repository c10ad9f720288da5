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

//! mcpwatch Core
//!
//! Domain types shared by the storage and query layers: ingested events,
//! rolling windows, the time source, static tool groups, configuration and
//! the error taxonomy.

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod group;
pub mod sink;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    EstimatorConfig, LogConfig, LogFormat, MonitorConfig, RegistryConfig, WindowDurations,
};
pub use error::{MonitorError, Result};
pub use event::{
    parse_user_agent, ClientInfo, ConnectionEvent, ConnectionEventKind, ToolCallEvent,
    ToolOutcome,
};
pub use group::{display_tool_name, ToolGroup};
pub use sink::{instrument, MonitoringSink, NoopSink};
pub use window::{BucketClock, Window};
