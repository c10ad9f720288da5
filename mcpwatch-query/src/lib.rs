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

//! mcpwatch Query
//!
//! Read-side projections over the aggregation structures, and the
//! [`Monitor`] facade that ties ingestion and queries together.
//!
//! ```no_run
//! use mcpwatch_core::{MonitorConfig, MonitoringSink, ToolOutcome, Window};
//! use mcpwatch_query::Monitor;
//!
//! let monitor = Monitor::new(MonitorConfig::default()).unwrap();
//! monitor.record_tool_call("searchSpringDocs", 42, ToolOutcome::Success, None);
//! let overview = monitor.get_overview(Window::FiveMin);
//! println!("{} requests", overview.total_requests);
//! ```

pub mod monitor;
pub mod projection;
pub mod snapshot;

pub use monitor::Monitor;
pub use projection::{aggregate_group, Projector};
pub use snapshot::{
    ClientUsage, ClientUsageSnapshot, EngineStats, ErrorDetail, EventCount, GroupSnapshot,
    HealthStatus, LatencyPercentiles, OverviewSnapshot, ReconcileReport, TimeSeriesPoint,
    ToolDetailSnapshot, ToolSummary, Trend, TrendDirection, WindowedMetric, TREND_STABLE_BAND,
};
