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

//! Query/Projection Service
//!
//! Assembles snapshots from the tool table and the connection registry.
//! Projections never mutate state. Cost is proportional to the number of
//! tracked tools times the (bounded) slot count, never to event history.
//!
//! Cross-tool views lock one tool at a time, so different tools may be
//! observed at slightly different instants within one call.

use crate::snapshot::{
    ClientUsage, ClientUsageSnapshot, EngineStats, ErrorDetail, EventCount, GroupSnapshot,
    HealthStatus, LatencyPercentiles, OverviewSnapshot, TimeSeriesPoint, ToolDetailSnapshot,
    ToolSummary, Trend, WindowedMetric,
};
use mcpwatch_core::clock::to_datetime;
use mcpwatch_core::{
    display_tool_name, parse_user_agent, BucketClock, ConnectionEventKind, ToolGroup, Window,
};
use mcpwatch_storage::{ConnectionRegistry, ToolMetricsTable, WindowStats, OVERFLOW_CLIENT};
use std::collections::HashSet;

/// Clients listed individually in the usage summary.
const TOP_CLIENTS: usize = 5;

/// Read-only view over the engine state.
pub struct Projector<'a> {
    pub table: &'a ToolMetricsTable,
    pub registry: &'a ConnectionRegistry,
    pub clock: &'a BucketClock,
    pub top_tools: usize,
    /// Width of time series buckets in tool detail.
    pub series_bucket_us: u64,
    pub recent_error_limit: usize,
}

/// Current and previous window bounds for one query.
#[derive(Debug, Clone, Copy)]
struct Span {
    after: u64,
    prev_after: u64,
    prev_until: u64,
}

impl Span {
    fn new(clock: &BucketClock, window: Window, now_us: u64) -> Self {
        let (prev_after, prev_until) = clock.previous_range(window, now_us);
        Self {
            after: clock.lookback_start(window, now_us),
            prev_after,
            prev_until,
        }
    }
}

impl<'a> Projector<'a> {
    fn trend(current: &WindowStats, previous: &WindowStats) -> Trend {
        Trend::between(
            current.requests(),
            current.latency.avg_ms(),
            current.error_rate(),
            previous.requests(),
            previous.latency.avg_ms(),
            previous.error_rate(),
        )
    }

    fn metric_from(
        name: &str,
        window: Window,
        current: &WindowStats,
        previous: &WindowStats,
    ) -> WindowedMetric {
        let avg = current.latency.avg_ms();
        let error_rate = current.error_rate();
        WindowedMetric {
            tool_name: name.to_string(),
            display_name: display_tool_name(name),
            group: ToolGroup::for_tool(name),
            window,
            requests: current.requests(),
            successes: current.successes,
            errors: current.errors,
            error_rate,
            success_rate: current.success_rate(),
            avg_latency_ms: avg,
            min_latency_ms: current.latency.min_ms(),
            max_latency_ms: current.latency.max_ms(),
            p95_latency_ms: current.latency.p95(),
            trend: Self::trend(current, previous),
            latency_status: HealthStatus::for_latency(avg),
            error_status: HealthStatus::for_error_rate(error_rate),
        }
    }

    /// Window metric for one tool. Unknown tools yield an all-zero metric.
    pub fn windowed_metric(&self, name: &str, window: Window, now_us: u64) -> WindowedMetric {
        let span = Span::new(self.clock, window, now_us);
        let current = self.table.tool_stats(name, span.after, u64::MAX);
        let previous = self.table.tool_stats(name, span.prev_after, span.prev_until);
        Self::metric_from(name, window, &current, &previous)
    }

    /// One metric per tracked tool, busiest first.
    pub fn tool_metrics(&self, window: Window, now_us: u64) -> Vec<WindowedMetric> {
        let span = Span::new(self.clock, window, now_us);
        let mut metrics: Vec<WindowedMetric> = self
            .table
            .entries()
            .iter()
            .map(|entry| {
                let current = entry.stats(span.after, u64::MAX);
                let previous = entry.stats(span.prev_after, span.prev_until);
                Self::metric_from(entry.name(), window, &current, &previous)
            })
            .collect();
        metrics.sort_by(|a, b| {
            b.requests
                .cmp(&a.requests)
                .then_with(|| a.tool_name.cmp(&b.tool_name))
        });
        metrics
    }

    pub fn overview(&self, window: Window, now_us: u64) -> OverviewSnapshot {
        let span = Span::new(self.clock, window, now_us);
        let current = self.table.overall_stats(span.after, u64::MAX);
        let previous = self.table.overall_stats(span.prev_after, span.prev_until);

        let requests_in = |w: Window| {
            if w == window {
                current.requests()
            } else {
                self.table
                    .overall_stats(self.clock.lookback_start(w, now_us), u64::MAX)
                    .requests()
            }
        };

        let day_start = self.clock.lookback_start(Window::TwentyFourHour, now_us);
        let event_counts = self.registry.event_counts_since(day_start);
        let count_of = |kind: ConnectionEventKind| {
            event_counts
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, c)| *c)
                .unwrap_or(0)
        };

        let window_secs = self.clock.duration_secs(window).max(1) as f64;
        let rps = current.requests() as f64 / window_secs;

        let top_tools = self
            .tool_metrics(window, now_us)
            .into_iter()
            .filter(|m| m.requests > 0)
            .take(self.top_tools)
            .map(|m| ToolSummary {
                tool_name: m.tool_name,
                display_name: m.display_name,
                group: m.group,
                requests: m.requests,
                error_rate: m.error_rate,
                avg_latency_ms: m.avg_latency_ms,
            })
            .collect();

        OverviewSnapshot {
            window,
            period_start: to_datetime(span.after),
            period_end: to_datetime(now_us),
            last_updated: to_datetime(now_us),
            total_requests: current.requests(),
            successes: current.successes,
            errors: current.errors,
            error_rate: current.error_rate(),
            success_rate: current.success_rate(),
            avg_latency_ms: current.latency.avg_ms(),
            min_latency_ms: current.latency.min_ms(),
            max_latency_ms: current.latency.max_ms(),
            p95_latency_ms: current.latency.p95(),
            requests_per_second: rps,
            requests_per_minute: rps * 60.0,
            trend: Self::trend(&current, &previous),
            requests_5m: requests_in(Window::FiveMin),
            requests_1h: requests_in(Window::OneHour),
            requests_24h: requests_in(Window::TwentyFourHour),
            active_connections: self.registry.active_count(),
            connections_24h: count_of(ConnectionEventKind::Connected),
            disconnections_24h: count_of(ConnectionEventKind::Disconnected),
            connection_errors_24h: count_of(ConnectionEventKind::Error),
            event_distribution: event_counts
                .iter()
                .map(|(kind, count)| EventCount {
                    kind: *kind,
                    display_name: kind.display_name().to_string(),
                    count: *count,
                })
                .collect(),
            top_tools,
        }
    }

    pub fn tool_detail(&self, name: &str, window: Window, now_us: u64) -> ToolDetailSnapshot {
        let span = Span::new(self.clock, window, now_us);
        let (current, previous, errors, series) = match self.table.get(name) {
            Some(entry) => (
                entry.stats(span.after, u64::MAX),
                entry.stats(span.prev_after, span.prev_until),
                entry.recent_errors(span.after, self.recent_error_limit),
                entry.latency_series(span.after, self.series_bucket_us),
            ),
            None => (
                self.table.tool_stats(name, span.after, u64::MAX),
                self.table.tool_stats(name, span.prev_after, span.prev_until),
                Vec::new(),
                Vec::new(),
            ),
        };

        let latency = &current.latency;
        let percentiles = LatencyPercentiles {
            p50: latency.quantile(0.50),
            p75: latency.quantile(0.75),
            p90: latency.quantile(0.90),
            p95: latency.quantile(0.95),
            p99: latency.quantile(0.99),
            max: latency.max_ms(),
        };

        ToolDetailSnapshot {
            tool_name: name.to_string(),
            display_name: display_tool_name(name),
            group: ToolGroup::for_tool(name),
            window,
            period_start: to_datetime(span.after),
            period_end: to_datetime(now_us),
            metrics: Self::metric_from(name, window, &current, &previous),
            percentiles,
            recent_errors: errors
                .into_iter()
                .map(|e| ErrorDetail {
                    timestamp: to_datetime(e.occurred_at_us),
                    message: e.message,
                    session_id: e.session_id,
                    duration_ms: e.duration_ms,
                })
                .collect(),
            request_series: series
                .iter()
                .map(|p| TimeSeriesPoint {
                    timestamp: to_datetime(p.start_us),
                    value: p.count as f64,
                })
                .collect(),
            latency_series: series
                .iter()
                .map(|p| TimeSeriesPoint {
                    timestamp: to_datetime(p.start_us),
                    value: p.avg_ms,
                })
                .collect(),
        }
    }

    /// Weighted summary over an arbitrary list of tool names. Duplicate
    /// names are counted once.
    pub fn group_summary<S: AsRef<str>>(
        &self,
        tool_names: &[S],
        window: Window,
        now_us: u64,
    ) -> GroupSnapshot {
        let mut seen: HashSet<&str> = HashSet::new();
        let tools: Vec<WindowedMetric> = tool_names
            .iter()
            .map(|n| n.as_ref())
            .filter(|name| seen.insert(*name))
            .map(|name| self.windowed_metric(name, window, now_us))
            .collect();
        aggregate_group(None, "Custom", "Ad-hoc tool selection", window, tools)
    }

    /// Every static group with its members, plus `Other` when ungrouped
    /// tools have activity.
    pub fn tool_groups(&self, window: Window, now_us: u64) -> Vec<GroupSnapshot> {
        let all = self.tool_metrics(window, now_us);
        let mut groups: Vec<GroupSnapshot> = ToolGroup::STATIC
            .iter()
            .map(|group| {
                let members: Vec<WindowedMetric> =
                    all.iter().filter(|m| m.group == *group).cloned().collect();
                aggregate_group(
                    Some(*group),
                    group.display_name(),
                    group.description(),
                    window,
                    members,
                )
            })
            .collect();

        let ungrouped: Vec<WindowedMetric> = all
            .into_iter()
            .filter(|m| m.group == ToolGroup::Other && m.requests > 0)
            .collect();
        if !ungrouped.is_empty() {
            let other = ToolGroup::Other;
            groups.push(aggregate_group(
                Some(other),
                other.display_name(),
                other.description(),
                window,
                ungrouped,
            ));
        }
        groups
    }

    /// Connections per client over the last 24 hours.
    pub fn client_usage(&self, now_us: u64) -> ClientUsageSnapshot {
        let since = self.clock.lookback_start(Window::TwentyFourHour, now_us);
        let counts = self.registry.client_counts_since(since);
        let total_connections = counts.iter().map(|c| c.connections).sum();
        let total_clients = counts.len();

        let mut usage: Vec<ClientUsage> = counts
            .into_iter()
            .map(|c| {
                let (client_name, client_version) = if c.user_agent == OVERFLOW_CLIENT {
                    (c.user_agent.clone(), None)
                } else {
                    parse_user_agent(&c.user_agent)
                };
                let display_name = match &client_version {
                    Some(v) => format!("{} v{}", client_name, v),
                    None => client_name.clone(),
                };
                ClientUsage {
                    user_agent: c.user_agent,
                    client_name,
                    client_version,
                    display_name,
                    connections: c.connections,
                }
            })
            .collect();

        let other_clients = if usage.len() > TOP_CLIENTS {
            usage.split_off(TOP_CLIENTS)
        } else {
            Vec::new()
        };

        ClientUsageSnapshot {
            top_clients: usage,
            other_clients,
            total_clients,
            total_connections,
        }
    }

    pub fn engine_stats(&self) -> EngineStats {
        let table = self.table.stats();
        let registry = self.registry.stats();
        EngineStats {
            tracked_tools: table.tools,
            active_sessions: registry.active_sessions,
            tracked_clients: registry.tracked_clients,
            fine_slots: table.fine_slots,
            coarse_slots: table.coarse_slots,
            connection_event_slots: registry.event_slots,
            memory_bytes: table.memory_bytes + registry.memory_bytes,
        }
    }
}

/// Request-weighted aggregation of member metrics.
pub fn aggregate_group(
    group: Option<ToolGroup>,
    display_name: &str,
    description: &str,
    window: Window,
    tools: Vec<WindowedMetric>,
) -> GroupSnapshot {
    let total_requests: u64 = tools.iter().map(|m| m.requests).sum();
    let total_errors: u64 = tools.iter().map(|m| m.errors).sum();
    let total_successes: u64 = tools.iter().map(|m| m.successes).sum();

    let (avg_latency_ms, error_rate, success_rate) = if total_requests == 0 {
        (0.0, 0.0, 0.0)
    } else {
        let weighted: f64 = tools
            .iter()
            .map(|m| m.avg_latency_ms * m.requests as f64)
            .sum();
        let n = total_requests as f64;
        (weighted / n, total_errors as f64 / n, total_successes as f64 / n)
    };

    GroupSnapshot {
        group,
        display_name: display_name.to_string(),
        description: description.to_string(),
        window,
        tools,
        total_requests,
        total_errors,
        avg_latency_ms,
        error_rate,
        success_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::TrendDirection;

    fn metric(name: &str, requests: u64, errors: u64, avg: f64) -> WindowedMetric {
        WindowedMetric {
            tool_name: name.to_string(),
            display_name: display_tool_name(name),
            group: ToolGroup::for_tool(name),
            window: Window::FiveMin,
            requests,
            successes: requests - errors,
            errors,
            error_rate: 0.0,
            success_rate: 0.0,
            avg_latency_ms: avg,
            min_latency_ms: 0.0,
            max_latency_ms: 0.0,
            p95_latency_ms: 0.0,
            trend: Trend::neutral(),
            latency_status: HealthStatus::for_latency(avg),
            error_status: HealthStatus::Success,
        }
    }

    #[test]
    fn test_weighted_group_average() {
        let g = aggregate_group(
            None,
            "Custom",
            "",
            Window::FiveMin,
            vec![metric("busy", 90, 0, 10.0), metric("rare", 10, 5, 100.0)],
        );
        assert_eq!(g.total_requests, 100);
        assert_eq!(g.total_errors, 5);
        // Unweighted mean would be 55.
        assert!((g.avg_latency_ms - 19.0).abs() < 1e-9);
        assert!((g.error_rate - 0.05).abs() < 1e-12);
        assert!((g.success_rate - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_empty_group() {
        let g = aggregate_group(None, "Custom", "", Window::OneHour, vec![metric("idle", 0, 0, 0.0)]);
        assert_eq!(g.avg_latency_ms, 0.0);
        assert_eq!(g.error_rate, 0.0);
        assert_eq!(g.tools[0].trend.direction, TrendDirection::Neutral);
    }
}
