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

//! Read-side snapshot types
//!
//! Plain serializable values; recomputed on every query and never mutated
//! afterwards. Rates are fractions in [0, 1], latencies are milliseconds.

use chrono::{DateTime, Utc};
use mcpwatch_core::{ConnectionEventKind, ToolGroup, Window};
use serde::{Deserialize, Serialize};

/// Relative change inside this band (either way) is reported as stable.
pub const TREND_STABLE_BAND: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
    /// No previous-window activity to compare against.
    Neutral,
}

impl TrendDirection {
    /// Direction of a relative change (`0.10` = +10%).
    pub fn from_change(change: Option<f64>) -> Self {
        match change {
            None => TrendDirection::Neutral,
            Some(c) if c > TREND_STABLE_BAND => TrendDirection::Up,
            Some(c) if c < -TREND_STABLE_BAND => TrendDirection::Down,
            Some(_) => TrendDirection::Stable,
        }
    }
}

/// Change relative to the immediately preceding window of equal length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    /// `(current - previous) / previous` of request count.
    pub request_change: Option<f64>,
    /// `(current - previous) / previous` of average latency.
    pub latency_change: Option<f64>,
    /// `current - previous` of error rate.
    pub error_rate_delta: Option<f64>,
    pub direction: TrendDirection,
    pub latency_direction: TrendDirection,
}

impl Trend {
    pub fn neutral() -> Self {
        Self {
            request_change: None,
            latency_change: None,
            error_rate_delta: None,
            direction: TrendDirection::Neutral,
            latency_direction: TrendDirection::Neutral,
        }
    }

    /// Compare two windows. Neutral whenever the previous window saw no
    /// requests.
    pub fn between(
        current_requests: u64,
        current_avg_ms: f64,
        current_error_rate: f64,
        previous_requests: u64,
        previous_avg_ms: f64,
        previous_error_rate: f64,
    ) -> Self {
        if previous_requests == 0 {
            return Self::neutral();
        }
        let request_change =
            Some((current_requests as f64 - previous_requests as f64) / previous_requests as f64);
        let latency_change = if previous_avg_ms > 0.0 && current_requests > 0 {
            Some((current_avg_ms - previous_avg_ms) / previous_avg_ms)
        } else {
            None
        };
        Self {
            request_change,
            latency_change,
            error_rate_delta: Some(current_error_rate - previous_error_rate),
            direction: TrendDirection::from_change(request_change),
            latency_direction: TrendDirection::from_change(latency_change),
        }
    }
}

/// Traffic-light classification used by dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Success,
    Warning,
    Danger,
}

impl HealthStatus {
    pub fn for_latency(avg_ms: f64) -> Self {
        if avg_ms < 200.0 {
            HealthStatus::Success
        } else if avg_ms < 500.0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Danger
        }
    }

    pub fn for_error_rate(rate: f64) -> Self {
        if rate < 0.01 {
            HealthStatus::Success
        } else if rate < 0.05 {
            HealthStatus::Warning
        } else {
            HealthStatus::Danger
        }
    }
}

/// Statistics of one tool over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedMetric {
    pub tool_name: String,
    pub display_name: String,
    pub group: ToolGroup,
    pub window: Window,
    pub requests: u64,
    pub successes: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub trend: Trend,
    pub latency_status: HealthStatus,
    pub error_status: HealthStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub session_id: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDetailSnapshot {
    pub tool_name: String,
    pub display_name: String,
    pub group: ToolGroup,
    pub window: Window,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub metrics: WindowedMetric,
    pub percentiles: LatencyPercentiles,
    /// Most recent first.
    pub recent_errors: Vec<ErrorDetail>,
    /// Requests per series bucket, oldest first.
    pub request_series: Vec<TimeSeriesPoint>,
    /// Average latency per series bucket, oldest first.
    pub latency_series: Vec<TimeSeriesPoint>,
}

/// Compact per-tool row for the overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub tool_name: String,
    pub display_name: String,
    pub group: ToolGroup,
    pub requests: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCount {
    pub kind: ConnectionEventKind,
    pub display_name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewSnapshot {
    pub window: Window,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,

    pub total_requests: u64,
    pub successes: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub requests_per_second: f64,
    pub requests_per_minute: f64,
    pub trend: Trend,

    pub requests_5m: u64,
    pub requests_1h: u64,
    pub requests_24h: u64,

    pub active_connections: u64,
    pub connections_24h: u64,
    pub disconnections_24h: u64,
    pub connection_errors_24h: u64,
    /// Every connection event kind over the last 24 hours.
    pub event_distribution: Vec<EventCount>,

    pub top_tools: Vec<ToolSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    /// `None` for an ad-hoc list of tool names.
    pub group: Option<ToolGroup>,
    pub display_name: String,
    pub description: String,
    pub window: Window,
    pub tools: Vec<WindowedMetric>,
    pub total_requests: u64,
    pub total_errors: u64,
    /// Request-weighted mean of member averages.
    pub avg_latency_ms: f64,
    pub error_rate: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUsage {
    pub user_agent: String,
    pub client_name: String,
    pub client_version: Option<String>,
    pub display_name: String,
    pub connections: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUsageSnapshot {
    pub top_clients: Vec<ClientUsage>,
    pub other_clients: Vec<ClientUsage>,
    pub total_clients: usize,
    pub total_connections: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub tracked_tools: usize,
    pub active_sessions: u64,
    pub tracked_clients: usize,
    pub fine_slots: usize,
    pub coarse_slots: usize,
    pub connection_event_slots: usize,
    pub memory_bytes: usize,
}

/// Outcome of one synchronous reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub expired_sessions: usize,
    pub freed_slots: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_direction_band() {
        assert_eq!(TrendDirection::from_change(None), TrendDirection::Neutral);
        assert_eq!(TrendDirection::from_change(Some(0.05)), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_change(Some(0.051)), TrendDirection::Up);
        assert_eq!(TrendDirection::from_change(Some(-0.2)), TrendDirection::Down);
    }

    #[test]
    fn test_trend_between() {
        let t = Trend::between(150, 20.0, 0.1, 100, 10.0, 0.05);
        assert_eq!(t.request_change, Some(0.5));
        assert_eq!(t.latency_change, Some(1.0));
        assert!((t.error_rate_delta.unwrap() - 0.05).abs() < 1e-12);
        assert_eq!(t.direction, TrendDirection::Up);
    }

    #[test]
    fn test_trend_neutral_without_history() {
        assert_eq!(Trend::between(10, 5.0, 0.0, 0, 0.0, 0.0), Trend::neutral());
    }

    #[test]
    fn test_trend_drop_to_zero() {
        let t = Trend::between(0, 0.0, 0.0, 40, 12.0, 0.25);
        assert_eq!(t.request_change, Some(-1.0));
        assert_eq!(t.latency_change, None);
        assert_eq!(t.error_rate_delta, Some(-0.25));
        assert_eq!(t.direction, TrendDirection::Down);
    }

    #[test]
    fn test_health_thresholds() {
        assert_eq!(HealthStatus::for_latency(199.9), HealthStatus::Success);
        assert_eq!(HealthStatus::for_latency(200.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::for_latency(500.0), HealthStatus::Danger);
        assert_eq!(HealthStatus::for_error_rate(0.0), HealthStatus::Success);
        assert_eq!(HealthStatus::for_error_rate(0.03), HealthStatus::Warning);
        assert_eq!(HealthStatus::for_error_rate(0.3), HealthStatus::Danger);
    }
}
